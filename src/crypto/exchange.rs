//! RSA-OAEP key transport
//!
//! The initiator publishes an RSA-2048 public key. The responder samples a
//! 128-bit session key, wraps it under that public key with OAEP (SHA-256) and
//! sends it back. Only the initiator's private key can unwrap it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{CryptoError, CryptoResult};

/// Modulus size of every generated keypair
pub const RSA_KEY_BITS: usize = 2048;

/// Size of the symmetric session key in bytes (AES-128)
pub const SYMMETRIC_KEY_SIZE: usize = 16;

/// The 128-bit session key shared by both peers once the exchange completes
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    /// Sample a fresh key from the OS CSPRNG
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| CryptoError::RngError)?;
        Ok(SymmetricKey(bytes))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SYMMETRIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SYMMETRIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(SymmetricKey(arr))
    }

    /// Get the raw bytes (be careful with this!)
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// An RSA public key as published by the initiator
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangePublicKey(RsaPublicKey);

impl ExchangePublicKey {
    /// Parse an SPKI PEM (`-----BEGIN PUBLIC KEY-----`)
    ///
    /// Keys weaker than [`RSA_KEY_BITS`] are refused.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem.trim())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let key = ExchangePublicKey(key);
        if key.bits() < RSA_KEY_BITS {
            return Err(CryptoError::InvalidPublicKey(format!(
                "modulus of {} bits is below the {} bit minimum",
                key.bits(),
                RSA_KEY_BITS
            )));
        }
        Ok(key)
    }

    /// Encode as SPKI PEM for transmission
    pub fn to_pem(&self) -> CryptoResult<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    /// Short SHA-256 fingerprint of the DER encoding, for trust-on-first-use display
    pub fn fingerprint(&self) -> CryptoResult<String> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let digest = Sha256::digest(der.as_bytes());
        Ok(hex::encode(&digest[..16]))
    }

    /// Wrap a session key under this public key (RSA-OAEP, SHA-256)
    ///
    /// Returns the base64 ciphertext ready for the wire.
    pub fn wrap_key(&self, key: &SymmetricKey) -> CryptoResult<String> {
        let wrapped = self
            .0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|e| CryptoError::KeyWrapFailed(e.to_string()))?;
        Ok(BASE64.encode(wrapped))
    }
}

impl std::fmt::Debug for ExchangePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.fingerprint() {
            Ok(fp) => write!(f, "ExchangePublicKey({}...)", &fp[..16]),
            Err(_) => f.write_str("ExchangePublicKey(<unencodable>)"),
        }
    }
}

/// An RSA keypair held by the initiator for the lifetime of one handshake
///
/// The `rsa` crate zeroizes the private key when it is dropped.
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: ExchangePublicKey,
}

impl KeyPair {
    /// Generate a fresh RSA-2048 keypair
    ///
    /// This is CPU heavy; async callers should run it on a blocking thread.
    pub fn generate() -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        let public_key = ExchangePublicKey(RsaPublicKey::from(&private_key));
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    /// Get the public key to publish
    pub fn public_key(&self) -> &ExchangePublicKey {
        &self.public_key
    }

    /// Unwrap a base64 OAEP ciphertext back into the session key
    pub fn unwrap_key(&self, wrapped_b64: &str) -> CryptoResult<SymmetricKey> {
        let wrapped = BASE64
            .decode(wrapped_b64.trim())
            .map_err(|_| CryptoError::KeyUnwrapFailed)?;

        let mut plain = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), &wrapped)
            .map_err(|_| CryptoError::KeyUnwrapFailed)?;

        let key = SymmetricKey::from_bytes(&plain);
        plain.zeroize();
        key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
