//! Client: the responder side of a connection
//!
//! Waits for the server's public key, answers with a wrapped session key and
//! from then on seals outgoing and opens incoming messages. Undecryptable or
//! out-of-place events are logged and dropped, never surfaced as messages.

use thiserror::Error;
use tracing::{info, warn};

use crate::session::{Disposition, Responder, SessionError, SessionId, SessionState};
use crate::transport::{Transport, TransportError, WireEvent};

/// Errors surfaced by the client driver
#[derive(Error, Debug)]
pub enum ClientError {
    /// The session rejected an operation
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The connection failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The connection closed before a public key arrived
    #[error("Connection closed before the handshake finished")]
    HandshakeIncomplete,
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Something worth showing to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incoming {
    /// The server confirmed it installed the session key
    HandshakeComplete,
    /// A decrypted message from the server
    Message(String),
}

/// A connection driven from the responder role
pub struct Client<T> {
    transport: T,
    responder: Responder,
}

impl<T: Transport> Client<T> {
    /// Wrap a freshly opened transport
    pub fn new(transport: T) -> Self {
        Client {
            transport,
            responder: Responder::new(SessionId::next()),
        }
    }

    /// Session state, so a UI can tell "not ready yet" from "message failed"
    pub fn state(&self) -> SessionState {
        self.responder.state()
    }

    /// The responder holding this connection's session
    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Wait for the server's public key and answer it
    ///
    /// Returns as soon as the wrapped key is sent; the local session is ready
    /// from that point on.
    pub async fn handshake(&mut self) -> ClientResult<()> {
        loop {
            let event = match self.transport.receive().await {
                Ok(event) => event,
                Err(TransportError::Disconnected) => return Err(ClientError::HandshakeIncomplete),
                Err(TransportError::InvalidData(e)) => {
                    warn!("Dropping malformed frame during handshake: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match event {
                WireEvent::PublishPublicKey { public_key, suite } => {
                    let wrapped = match self.responder.on_public_key_received(&public_key, suite) {
                        Ok(wrapped) => wrapped,
                        Err(e) => {
                            self.handle_failure(e).await?;
                            continue;
                        }
                    };
                    self.transport
                        .send(&WireEvent::SubmitEncryptedKey { key: wrapped })
                        .await?;
                    info!(
                        "Session key sent ({}); server key fingerprint {}",
                        suite,
                        self.responder.server_fingerprint().unwrap_or("unknown")
                    );
                    return Ok(());
                }
                other => warn!("Ignoring {} before the server public key", other.name()),
            }
        }
    }

    /// Encrypt and send one message
    pub async fn send_message(&mut self, text: &str) -> ClientResult<()> {
        let envelope = self.responder.seal(text)?;
        self.transport
            .send(&WireEvent::SecureMessage(envelope))
            .await?;
        Ok(())
    }

    /// Wait for the next event worth showing
    pub async fn next_incoming(&mut self) -> ClientResult<Incoming> {
        loop {
            let event = match self.transport.receive().await {
                Ok(event) => event,
                Err(TransportError::InvalidData(e)) => {
                    warn!("Dropping malformed frame: {}", e);
                    continue;
                }
                Err(e) => {
                    self.responder.close();
                    return Err(e.into());
                }
            };

            match event {
                WireEvent::HandshakeComplete => match self.responder.on_handshake_complete() {
                    Ok(()) => return Ok(Incoming::HandshakeComplete),
                    Err(e) => self.handle_failure(e).await?,
                },
                WireEvent::SecureMessage(envelope) => match self.responder.open(&envelope) {
                    Ok(text) => return Ok(Incoming::Message(text)),
                    Err(e) => self.handle_failure(e).await?,
                },
                WireEvent::PublishPublicKey { public_key, suite } => {
                    // Always a violation here; the responder refuses to re-key
                    if let Err(e) = self.responder.on_public_key_received(&public_key, suite) {
                        self.handle_failure(e).await?;
                    }
                }
                WireEvent::SubmitEncryptedKey { .. } => {
                    warn!(
                        "Protocol violation: submit-encrypted-key sent to a client in state {}",
                        self.responder.state()
                    );
                }
            }
        }
    }

    /// Drop the offending event, or tear the connection down if the session is lost
    async fn handle_failure(&mut self, err: SessionError) -> ClientResult<()> {
        match err.disposition() {
            Disposition::Drop => {
                warn!("{}", err);
                Ok(())
            }
            Disposition::Destroy => {
                self.responder.close();
                let _ = self.transport.close().await;
                Err(err.into())
            }
        }
    }

    /// Close the connection and drop the session key
    pub async fn close(&mut self) -> ClientResult<()> {
        self.responder.close();
        self.transport.close().await?;
        Ok(())
    }
}
