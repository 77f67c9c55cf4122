//! Session-level error taxonomy

use thiserror::Error;

use super::{SessionId, SessionState};
use crate::crypto::CryptoError;

/// What the connection owner should do after an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Log the event and discard it; the session lives on
    Drop,
    /// The session cannot proceed and must be destroyed
    Destroy,
}

/// Errors raised while driving a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Asymmetric or symmetric key generation failed
    #[error("Key generation failed: {0}")]
    KeyGeneration(#[source] CryptoError),

    /// The submitted session key does not decrypt under our private key
    #[error("Submitted session key rejected: {0}")]
    KeyUnwrap(#[source] CryptoError),

    /// The published public key could not be parsed or is too weak
    #[error("Peer public key rejected: {0}")]
    InvalidPublicKey(#[source] CryptoError),

    /// Wrapping the session key under the peer's public key failed
    #[error("Could not wrap session key: {0}")]
    KeyWrap(#[source] CryptoError),

    /// An envelope failed to decrypt
    #[error("Message dropped: {0}")]
    MessageDecryption(#[source] CryptoError),

    /// An outgoing message could not be encrypted
    #[error("Message not sent: {0}")]
    MessageEncryption(#[source] CryptoError),

    /// The event is not allowed in the session's current state
    #[error("Protocol violation: {event} not allowed in state {state}")]
    ProtocolViolation {
        /// State the session was in
        state: SessionState,
        /// Event that was rejected
        event: &'static str,
    },

    /// No live session with this id
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// A live session already uses this id
    #[error("Session {0} already exists")]
    DuplicateSession(SessionId),
}

impl SessionError {
    /// How the owner of the connection should react
    pub fn disposition(&self) -> Disposition {
        match self {
            SessionError::KeyGeneration(_) | SessionError::KeyWrap(_) => Disposition::Destroy,
            _ => Disposition::Drop,
        }
    }

    /// True for the "message arrived before the handshake finished" case
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            SessionError::ProtocolViolation {
                event: "secure-message",
                state,
            } if *state != SessionState::Ready
        )
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
