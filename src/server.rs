//! Server: one session per accepted connection
//!
//! For each connection the server publishes a fresh public key, installs the
//! session key the client sends back, then decrypts incoming messages and
//! (optionally) answers each with an encrypted echo. A connection that has not
//! finished the handshake before the deadline is closed. The session is
//! destroyed whenever the connection ends.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, ECHO_PREFIX};
use crate::session::{
    Disposition, Initiator, SessionError, SessionId, SessionRegistry, SessionResult, SessionState,
};
use crate::transport::{Transport, TransportError, WebSocketTransport, WireEvent};

/// Shared server state
pub struct Server {
    config: ServerConfig,
    initiator: Initiator,
}

impl Server {
    /// Create a server with an empty session registry
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let initiator = Initiator::new(registry, config.suite);
        Server { config, initiator }
    }

    /// Active configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registry of live sessions
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.initiator.registry()
    }

    /// The key-exchange initiator used for every connection
    pub fn initiator(&self) -> &Initiator {
        &self.initiator
    }

    /// Accept WebSocket connections until the listener fails
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(
            "SealChat server listening on ws://{} ({})",
            listener.local_addr()?,
            self.config.suite
        );

        loop {
            let (stream, addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                match WebSocketTransport::accept(stream).await {
                    Ok(transport) => {
                        server.serve_connection(transport, &addr.to_string()).await;
                    }
                    Err(e) => error!("WebSocket handshake failed for {}: {}", addr, e),
                }
            });
        }
    }

    /// Drive one connection from key publication to disconnect
    ///
    /// Returns the id the session was registered under.
    pub async fn serve_connection<T: Transport>(&self, mut transport: T, peer: &str) -> SessionId {
        let id = SessionId::next();
        info!("Connection {} from {}", id, peer);

        // begin_session destroys the session itself on failure
        let public_key = match self.initiator.begin_session(id).await {
            Ok(pem) => pem,
            Err(e) => {
                error!("Session {} could not start: {}", id, e);
                let _ = transport.close().await;
                return id;
            }
        };

        // Key generation time counts against the deadline
        let deadline = match self.initiator.created_at(id).await {
            Ok(created_at) => self
                .config
                .handshake_timeout()
                .map(|timeout| Instant::from_std(created_at) + timeout),
            Err(e) => {
                warn!("Session {} vanished before publishing its key: {}", id, e);
                let _ = transport.close().await;
                return id;
            }
        };

        let publish = WireEvent::PublishPublicKey {
            public_key,
            suite: self.initiator.suite(),
        };
        if let Err(e) = transport.send(&publish).await {
            warn!("Session {} could not publish its key: {}", id, e);
            self.initiator.end_session(id).await;
            return id;
        }

        let mut ready = false;
        loop {
            let handshake_deadline = async move {
                match (ready, deadline) {
                    (false, Some(at)) => tokio::time::sleep_until(at).await,
                    _ => std::future::pending::<()>().await,
                }
            };

            let received = tokio::select! {
                received = transport.receive() => received,
                _ = handshake_deadline => {
                    warn!("Session {} did not finish the handshake in time", id);
                    break;
                }
            };

            let event = match received {
                Ok(event) => event,
                Err(TransportError::Disconnected) => {
                    info!("Connection {} closed by peer", id);
                    break;
                }
                Err(TransportError::InvalidData(e)) => {
                    warn!("Session {}: dropping malformed frame: {}", id, e);
                    continue;
                }
                Err(e) => {
                    error!("Session {}: transport error: {}", id, e);
                    break;
                }
            };

            match self.dispatch(id, event).await {
                Ok(Some(reply)) => {
                    if let Err(e) = transport.send(&reply).await {
                        warn!("Session {}: failed to send {}: {}", id, reply.name(), e);
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if self.handle_failure(id, &e).await.is_break() {
                        break;
                    }
                }
            }

            if !ready {
                ready = matches!(self.initiator.state(id).await, Ok(SessionState::Ready));
            }
        }

        self.initiator.end_session(id).await;
        let _ = transport.close().await;
        id
    }

    /// Apply the disposition of a failed step on session `id`
    ///
    /// `Drop` keeps the connection; `Destroy` removes the session at once and
    /// tells the caller to close the connection.
    pub async fn handle_failure(&self, id: SessionId, err: &SessionError) -> ControlFlow<()> {
        match err.disposition() {
            Disposition::Drop => {
                warn!("Session {}: {}", id, err);
                ControlFlow::Continue(())
            }
            Disposition::Destroy => {
                error!("Session {}: {}", id, err);
                self.initiator.end_session(id).await;
                ControlFlow::Break(())
            }
        }
    }

    /// Apply one incoming event to session `id`, returning the reply to send
    pub async fn dispatch(&self, id: SessionId, event: WireEvent) -> SessionResult<Option<WireEvent>> {
        match event {
            WireEvent::SubmitEncryptedKey { key } => {
                self.initiator.receive_encrypted_key(id, &key).await?;
                Ok(Some(WireEvent::HandshakeComplete))
            }

            WireEvent::SecureMessage(envelope) => {
                let plaintext = self.initiator.open(id, &envelope).await?;
                debug!("Session {} decrypted: {}", id, plaintext);

                if !self.config.echo {
                    return Ok(None);
                }
                let reply = self
                    .initiator
                    .seal(id, &format!("{}{}", ECHO_PREFIX, plaintext))
                    .await?;
                Ok(Some(WireEvent::SecureMessage(reply)))
            }

            // Only the server publishes keys and confirms handshakes
            other @ (WireEvent::PublishPublicKey { .. } | WireEvent::HandshakeComplete) => {
                let state = self.initiator.state(id).await?;
                Err(SessionError::ProtocolViolation {
                    state,
                    event: other.name(),
                })
            }
        }
    }
}
