//! Session management for the hybrid handshake
//!
//! A [`Session`] tracks one connection's progress through the key exchange and
//! holds its key material. State only moves through validated transitions,
//! driven by the [`Initiator`] (server role) or the [`Responder`] (client role).
//! Server-side sessions live in the [`SessionRegistry`].

mod error;
mod initiator;
mod registry;
mod responder;

pub use error::{Disposition, SessionError, SessionResult};
pub use initiator::Initiator;
pub use registry::{SessionHandle, SessionRegistry};
pub use responder::Responder;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::crypto::{Cipher, CipherSuite, Envelope, KeyPair, SymmetricKey};

/// Opaque connection identifier
///
/// Allocated from a process-wide counter, so an id is never handed out twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next unused id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an id supplied by an external transport
    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handshake progress of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Nothing exchanged yet
    AwaitingKey,
    /// Initiator has published its public key
    KeyPublished,
    /// Initiator: wrapped key arrived. Responder: public key arrived.
    KeyReceived,
    /// Symmetric key installed; messages may flow
    Ready,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::AwaitingKey => "AWAITING_KEY",
            SessionState::KeyPublished => "KEY_PUBLISHED",
            SessionState::KeyReceived => "KEY_RECEIVED",
            SessionState::Ready => "READY",
        };
        f.write_str(name)
    }
}

/// Which side of the exchange a session plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Generates the keypair and unwraps the session key (server)
    Initiator,
    /// Generates and wraps the session key (client)
    Responder,
}

/// Per-connection cryptographic state
pub struct Session {
    id: SessionId,
    role: Role,
    state: SessionState,
    suite: CipherSuite,
    keypair: Option<KeyPair>,
    symmetric_key: Option<SymmetricKey>,
    created_at: Instant,
    peer_confirmed: bool,
    destroyed: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId, role: Role, suite: CipherSuite) -> Self {
        Session {
            id,
            role,
            state: SessionState::AwaitingKey,
            suite,
            keypair: None,
            symmetric_key: None,
            created_at: Instant::now(),
            peer_confirmed: false,
            destroyed: false,
        }
    }

    /// Connection id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Role this session plays
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Cipher suite of the secure channel
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// When the session was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// True once messages may be sealed and opened
    pub fn is_ready(&self) -> bool {
        !self.destroyed && self.state == SessionState::Ready && self.symmetric_key.is_some()
    }

    /// Whether the symmetric key has been installed
    pub fn has_symmetric_key(&self) -> bool {
        self.symmetric_key.is_some()
    }

    /// Whether an RSA keypair is currently held
    pub fn has_keypair(&self) -> bool {
        self.keypair.is_some()
    }

    /// Whether the peer sent the informational handshake-complete signal
    pub fn peer_confirmed(&self) -> bool {
        self.peer_confirmed
    }

    /// Whether the registry has destroyed this session
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Encrypt an outgoing message
    pub fn seal(&self, plaintext: &str) -> SessionResult<Envelope> {
        let key = self.ready_key("secure-message")?;
        Cipher::encrypt(self.suite, key, plaintext).map_err(SessionError::MessageEncryption)
    }

    /// Decrypt an incoming message
    pub fn open(&self, envelope: &Envelope) -> SessionResult<String> {
        let key = self.ready_key("secure-message")?;
        Cipher::decrypt(self.suite, key, envelope).map_err(SessionError::MessageDecryption)
    }

    fn ready_key(&self, event: &'static str) -> SessionResult<&SymmetricKey> {
        if self.destroyed {
            return Err(SessionError::SessionNotFound(self.id));
        }
        match (self.state, &self.symmetric_key) {
            (SessionState::Ready, Some(key)) => Ok(key),
            (state, _) => Err(SessionError::ProtocolViolation { state, event }),
        }
    }

    /// Move `from -> to`, rejecting the event if the session is elsewhere
    pub(crate) fn transition(
        &mut self,
        event: &'static str,
        from: SessionState,
        to: SessionState,
    ) -> SessionResult<()> {
        if self.destroyed {
            return Err(SessionError::SessionNotFound(self.id));
        }
        if self.state != from {
            return Err(SessionError::ProtocolViolation {
                state: self.state,
                event,
            });
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn install_keypair(&mut self, keypair: KeyPair) {
        self.keypair = Some(keypair);
    }

    pub(crate) fn keypair(&self) -> Option<&KeyPair> {
        self.keypair.as_ref()
    }

    pub(crate) fn set_suite(&mut self, suite: CipherSuite) {
        self.suite = suite;
    }

    /// Install the session key and become ready. The keypair is dropped.
    pub(crate) fn install_symmetric_key(
        &mut self,
        event: &'static str,
        key: SymmetricKey,
    ) -> SessionResult<()> {
        if self.symmetric_key.is_some() {
            return Err(SessionError::ProtocolViolation {
                state: self.state,
                event,
            });
        }
        self.transition(event, SessionState::KeyReceived, SessionState::Ready)?;
        self.symmetric_key = Some(key);
        self.keypair = None;
        Ok(())
    }

    pub(crate) fn mark_peer_confirmed(&mut self) {
        self.peer_confirmed = true;
    }

    /// Drop all key material; the session can never be used again
    pub(crate) fn wipe(&mut self) {
        self.keypair = None;
        self.symmetric_key = None;
        self.destroyed = true;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("suite", &self.suite)
            .field("has_keypair", &self.keypair.is_some())
            .field("has_symmetric_key", &self.symmetric_key.is_some())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
