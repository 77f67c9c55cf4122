//! Client side of the key exchange

use super::{Role, Session, SessionError, SessionId, SessionResult, SessionState};
use crate::crypto::{CipherSuite, Envelope, ExchangePublicKey, SymmetricKey};

/// Generates the session key and wraps it for the initiator
///
/// A client holds exactly one connection, so the responder owns its session
/// outright instead of going through a registry.
#[derive(Debug)]
pub struct Responder {
    session: Session,
    server_fingerprint: Option<String>,
}

impl Responder {
    /// Start a responder session in `AWAITING_KEY`
    pub fn new(id: SessionId) -> Self {
        Responder {
            session: Session::new(id, Role::Responder, CipherSuite::default()),
            server_fingerprint: None,
        }
    }

    /// The underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current handshake state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether messages may be sealed and opened
    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Fingerprint of the public key we wrapped to (trust on first use)
    pub fn server_fingerprint(&self) -> Option<&str> {
        self.server_fingerprint.as_deref()
    }

    /// Answer a published public key with a freshly wrapped session key
    ///
    /// The session becomes ready as soon as the key is wrapped; this says
    /// nothing about whether the initiator managed to unwrap it. Only allowed
    /// once per connection.
    pub fn on_public_key_received(
        &mut self,
        public_key_pem: &str,
        suite: CipherSuite,
    ) -> SessionResult<String> {
        const EVENT: &str = "publish-public-key";

        self.session
            .transition(EVENT, SessionState::AwaitingKey, SessionState::KeyReceived)?;

        match Self::wrap_fresh_key(public_key_pem) {
            Ok((public_key, key, wrapped)) => {
                self.server_fingerprint = public_key.fingerprint().ok();
                self.session.set_suite(suite);
                self.session.install_symmetric_key(EVENT, key)?;
                Ok(wrapped)
            }
            Err(e) => {
                self.session
                    .transition(EVENT, SessionState::KeyReceived, SessionState::AwaitingKey)?;
                Err(e)
            }
        }
    }

    fn wrap_fresh_key(
        public_key_pem: &str,
    ) -> SessionResult<(ExchangePublicKey, SymmetricKey, String)> {
        let public_key =
            ExchangePublicKey::from_pem(public_key_pem).map_err(SessionError::InvalidPublicKey)?;
        let key = SymmetricKey::generate().map_err(SessionError::KeyGeneration)?;
        let wrapped = public_key.wrap_key(&key).map_err(SessionError::KeyWrap)?;
        Ok((public_key, key, wrapped))
    }

    /// Record the initiator's informational handshake-complete signal
    pub fn on_handshake_complete(&mut self) -> SessionResult<()> {
        if !self.session.is_ready() {
            return Err(SessionError::ProtocolViolation {
                state: self.session.state(),
                event: "handshake-complete",
            });
        }
        self.session.mark_peer_confirmed();
        Ok(())
    }

    /// Encrypt an outgoing message
    pub fn seal(&self, plaintext: &str) -> SessionResult<Envelope> {
        self.session.seal(plaintext)
    }

    /// Decrypt an incoming message
    pub fn open(&self, envelope: &Envelope) -> SessionResult<String> {
        self.session.open(envelope)
    }

    /// Drop all key material when the connection ends
    pub fn close(&mut self) {
        self.session.wipe();
    }
}
