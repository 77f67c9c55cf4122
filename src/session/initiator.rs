//! Server side of the key exchange

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{Role, SessionError, SessionId, SessionRegistry, SessionResult, SessionState};
use crate::crypto::{CipherSuite, CryptoError, Envelope, KeyPair};

/// Generates a keypair per connection and unwraps the session key sent back
///
/// All server-side session mutation goes through here; the registry only
/// stores the sessions.
#[derive(Clone)]
pub struct Initiator {
    registry: Arc<SessionRegistry>,
    suite: CipherSuite,
}

impl Initiator {
    /// Create an initiator announcing `suite` to every responder
    pub fn new(registry: Arc<SessionRegistry>, suite: CipherSuite) -> Self {
        Initiator { registry, suite }
    }

    /// The registry this initiator writes to
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Suite announced in `publish-public-key`
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Create the session, generate its RSA keypair and return the public PEM
    ///
    /// Generation runs on a blocking thread while the session lock is held, so
    /// nothing else can happen on this session until the key is published.
    /// On failure the session is destroyed.
    pub async fn begin_session(&self, id: SessionId) -> SessionResult<String> {
        let handle = self.registry.create(id, Role::Initiator, self.suite).await?;
        let mut session = handle.lock().await;

        let generated = tokio::task::spawn_blocking(KeyPair::generate)
            .await
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))
            .and_then(|result| result)
            .and_then(|keypair| {
                let pem = keypair.public_key().to_pem()?;
                Ok((keypair, pem))
            });

        let (keypair, pem) = match generated {
            Ok(pair) => pair,
            Err(e) => {
                drop(session);
                error!("Key generation failed for session {}: {}", id, e);
                self.registry.destroy(id).await;
                return Err(SessionError::KeyGeneration(e));
            }
        };

        session.transition(
            "publish-public-key",
            SessionState::AwaitingKey,
            SessionState::KeyPublished,
        )?;
        debug!(
            "Session {} public key fingerprint {:?}",
            id,
            keypair.public_key().fingerprint().ok()
        );
        session.install_keypair(keypair);

        info!("Session {} published its public key", id);
        Ok(pem)
    }

    /// Unwrap the submitted session key and make the session ready
    ///
    /// A ciphertext that does not decrypt leaves the session in
    /// `KEY_PUBLISHED`; the responder may submit again.
    pub async fn receive_encrypted_key(&self, id: SessionId, wrapped: &str) -> SessionResult<()> {
        let handle = self.registry.require(id).await?;
        let mut session = handle.lock().await;

        session.transition(
            "submit-encrypted-key",
            SessionState::KeyPublished,
            SessionState::KeyReceived,
        )?;

        let unwrapped = match session.keypair() {
            Some(keypair) => keypair.unwrap_key(wrapped),
            None => Err(CryptoError::KeyUnwrapFailed),
        };

        match unwrapped {
            Ok(key) => {
                session.install_symmetric_key("submit-encrypted-key", key)?;
                info!("Session {} is ready ({})", id, session.suite());
                Ok(())
            }
            Err(e) => {
                session.transition(
                    "submit-encrypted-key",
                    SessionState::KeyReceived,
                    SessionState::KeyPublished,
                )?;
                warn!("Session {} rejected submitted key: {}", id, e);
                Err(SessionError::KeyUnwrap(e))
            }
        }
    }

    /// Encrypt a message for the peer of session `id`
    pub async fn seal(&self, id: SessionId, plaintext: &str) -> SessionResult<Envelope> {
        let handle = self.registry.require(id).await?;
        let session = handle.lock().await;
        session.seal(plaintext)
    }

    /// Decrypt a message from the peer of session `id`
    pub async fn open(&self, id: SessionId, envelope: &Envelope) -> SessionResult<String> {
        let handle = self.registry.require(id).await?;
        let session = handle.lock().await;
        session.open(envelope)
    }

    /// Current state of session `id`
    pub async fn state(&self, id: SessionId) -> SessionResult<SessionState> {
        let handle = self.registry.require(id).await?;
        let state = handle.lock().await.state();
        Ok(state)
    }

    /// When session `id` was registered; the handshake deadline counts from here
    pub async fn created_at(&self, id: SessionId) -> SessionResult<Instant> {
        let handle = self.registry.require(id).await?;
        let created_at = handle.lock().await.created_at();
        Ok(created_at)
    }

    /// Destroy session `id` on disconnect
    pub async fn end_session(&self, id: SessionId) -> bool {
        let removed = self.registry.destroy(id).await;
        if removed {
            info!("Session {} destroyed", id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{ExchangePublicKey, SymmetricKey};

    fn initiator() -> Initiator {
        Initiator::new(Arc::new(SessionRegistry::new()), CipherSuite::default())
    }

    #[tokio::test]
    async fn test_full_handshake() {
        let initiator = initiator();
        let id = SessionId::next();

        let before = Instant::now();
        let pem = initiator.begin_session(id).await.unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(initiator.state(id).await.unwrap(), SessionState::KeyPublished);

        // Registered before the keypair was generated
        let created_at = initiator.created_at(id).await.unwrap();
        assert!(created_at >= before && created_at <= Instant::now());

        let key = SymmetricKey::generate().unwrap();
        let wrapped = ExchangePublicKey::from_pem(&pem).unwrap().wrap_key(&key).unwrap();
        initiator.receive_encrypted_key(id, &wrapped).await.unwrap();
        assert_eq!(initiator.state(id).await.unwrap(), SessionState::Ready);

        // Private key is gone once the session key is in place
        let handle = initiator.registry().get(id).await.unwrap();
        assert!(!handle.lock().await.has_keypair());
        assert_eq!(handle.lock().await.role(), Role::Initiator);

        // A second submission is a violation, not a re-key
        let err = initiator.receive_encrypted_key(id, &wrapped).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation { state: SessionState::Ready, .. }));

        let envelope = crate::crypto::Cipher::encrypt(initiator.suite(), &key, "hello").unwrap();
        assert_eq!(initiator.open(id, &envelope).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_wrong_public_key_is_decryption_error() {
        let initiator = initiator();
        let id = SessionId::next();
        initiator.begin_session(id).await.unwrap();

        let stranger = KeyPair::generate().unwrap();
        let key = SymmetricKey::generate().unwrap();
        let wrapped = stranger.public_key().wrap_key(&key).unwrap();

        let err = initiator.receive_encrypted_key(id, &wrapped).await.unwrap_err();
        assert_eq!(err, SessionError::KeyUnwrap(CryptoError::KeyUnwrapFailed));

        let handle = initiator.registry().get(id).await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::KeyPublished);
        assert!(!session.has_symmetric_key());
    }

    #[tokio::test]
    async fn test_message_before_ready_rejected() {
        let initiator = initiator();
        let id = SessionId::next();
        initiator.begin_session(id).await.unwrap();

        let envelope = Envelope {
            iv: "AAAAAAAAAAAAAAAAAAAAAA==".to_string(),
            data: "AAAAAAAAAAAAAAAAAAAAAA==".to_string(),
        };
        let err = initiator.open(id, &envelope).await.unwrap_err();
        assert!(err.is_not_ready());
        assert!(initiator.seal(id, "hello").await.unwrap_err().is_not_ready());
    }

    #[tokio::test]
    async fn test_disconnect_during_key_published() {
        let initiator = initiator();
        let id = SessionId::next();
        initiator.begin_session(id).await.unwrap();

        assert!(initiator.end_session(id).await);
        assert!(!initiator.registry().contains(id).await);

        let err = initiator.receive_encrypted_key(id, "AAAA").await.unwrap_err();
        assert_eq!(err, SessionError::SessionNotFound(id));
    }

    #[tokio::test]
    async fn test_garbage_key_submission() {
        let initiator = initiator();
        let id = SessionId::next();
        initiator.begin_session(id).await.unwrap();

        let err = initiator
            .receive_encrypted_key(id, "definitely not base64!")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::KeyUnwrap(_)));
        assert_eq!(initiator.state(id).await.unwrap(), SessionState::KeyPublished);
    }

    #[tokio::test]
    async fn test_duplicate_begin_rejected() {
        let initiator = initiator();
        let id = SessionId::next();
        initiator.begin_session(id).await.unwrap();
        assert_eq!(
            initiator.begin_session(id).await.unwrap_err(),
            SessionError::DuplicateSession(id)
        );
    }
}
