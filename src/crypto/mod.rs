//! Cryptographic primitives for SealChat
//!
//! This module provides the building blocks of the hybrid protocol:
//! - `exchange`: RSA-2048 keypairs and OAEP wrapping of the session key
//! - `cipher`: per-message envelope encryption under the session key

pub mod cipher;
pub mod error;
pub mod exchange;

// Re-export commonly used types
pub use cipher::{Cipher, CipherSuite, Envelope};
pub use error::{CryptoError, CryptoResult};
pub use exchange::{ExchangePublicKey, KeyPair, SymmetricKey, RSA_KEY_BITS, SYMMETRIC_KEY_SIZE};

/// Generate cryptographically secure random bytes
pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
