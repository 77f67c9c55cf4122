//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The provided key has an invalid length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Asymmetric or symmetric key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The public key is not a valid PEM-encoded RSA key
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Wrapping the session key under a public key failed
    #[error("Key wrap failed: {0}")]
    KeyWrapFailed(String),

    /// The wrapped session key does not decrypt under our private key
    #[error("Key unwrap failed: ciphertext does not match the private key")]
    KeyUnwrapFailed,

    /// Encryption operation failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// An envelope could not be decoded, authenticated or depadded
    #[error("Decryption failed: envelope is corrupt or keyed differently")]
    DecryptionFailed,

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngError,
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
