//! Per-message envelope encryption
//!
//! Every message is sealed independently under the session key with a fresh
//! random 16-byte iv and travels as an [`Envelope`] of two base64 strings.
//!
//! Two suites are supported:
//! - `aes-128-gcm-committed` (default): HKDF-SHA256 expands the session key
//!   and the iv into a one-time AES-128-GCM key, a nonce and a 32-byte key
//!   commitment. `data = commitment || ciphertext || tag`.
//! - `aes-128-cbc`: AES-128-CBC with PKCS#7 padding. Confidentiality only,
//!   tampering is not detected.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::error::{CryptoError, CryptoResult};
use super::exchange::SymmetricKey;
use super::random_bytes;

/// Size of the per-message iv in bytes
pub const IV_SIZE: usize = 16;

/// Size of the key commitment prefix in bytes
pub const COMMITMENT_SIZE: usize = 32;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

const GCM_KEY_SIZE: usize = 16;
const GCM_NONCE_SIZE: usize = 12;
const DERIVED_SIZE: usize = GCM_KEY_SIZE + GCM_NONCE_SIZE + COMMITMENT_SIZE;
const ENVELOPE_INFO: &[u8] = b"sealchat-envelope-v1";

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Symmetric algorithm used by the secure channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    /// Key-committing AES-128-GCM
    #[default]
    #[serde(rename = "aes-128-gcm-committed")]
    CommittedAesGcm,
    /// AES-128-CBC with PKCS#7 padding, no integrity
    #[serde(rename = "aes-128-cbc")]
    AesCbc,
}

impl CipherSuite {
    /// Wire name of the suite
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherSuite::CommittedAesGcm => "aes-128-gcm-committed",
            CipherSuite::AesCbc => "aes-128-cbc",
        }
    }

    /// Whether tampering with an envelope is detected
    pub fn is_authenticated(&self) -> bool {
        matches!(self, CipherSuite::CommittedAesGcm)
    }
}

impl std::fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CipherSuite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-128-gcm-committed" => Ok(CipherSuite::CommittedAesGcm),
            "aes-128-cbc" => Ok(CipherSuite::AesCbc),
            other => Err(format!("unknown cipher suite: {}", other)),
        }
    }
}

/// One encrypted message on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the 16 random iv bytes
    pub iv: String,
    /// Base64 of the ciphertext
    pub data: String,
}

/// Symmetric cipher for envelopes
pub struct Cipher;

impl Cipher {
    /// Encrypt a UTF-8 message under the session key
    pub fn encrypt(
        suite: CipherSuite,
        key: &SymmetricKey,
        plaintext: &str,
    ) -> CryptoResult<Envelope> {
        let iv: [u8; IV_SIZE] = random_bytes();

        let data = match suite {
            CipherSuite::CommittedAesGcm => Self::seal_committed(key, &iv, plaintext.as_bytes())?,
            CipherSuite::AesCbc => Aes128CbcEnc::new_from_slices(key.as_bytes(), &iv)
                .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        };

        Ok(Envelope {
            iv: BASE64.encode(iv),
            data: BASE64.encode(data),
        })
    }

    /// Decrypt an envelope back to its UTF-8 message
    ///
    /// Every failure collapses into [`CryptoError::DecryptionFailed`].
    pub fn decrypt(
        suite: CipherSuite,
        key: &SymmetricKey,
        envelope: &Envelope,
    ) -> CryptoResult<String> {
        let iv = BASE64
            .decode(envelope.iv.trim())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if iv.len() != IV_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let data = BASE64
            .decode(envelope.data.trim())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let plaintext = match suite {
            CipherSuite::CommittedAesGcm => Self::open_committed(key, &iv, &data)?,
            CipherSuite::AesCbc => Aes128CbcDec::new_from_slices(key.as_bytes(), &iv)
                .map_err(|_| CryptoError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(&data)
                .map_err(|_| CryptoError::DecryptionFailed)?,
        };

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    fn seal_committed(key: &SymmetricKey, iv: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut derived = Self::derive(key, iv)?;
        let (gcm_key, rest) = derived.split_at(GCM_KEY_SIZE);
        let (nonce, commitment) = rest.split_at(GCM_NONCE_SIZE);

        let result = Aes128Gcm::new_from_slice(gcm_key)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
            .and_then(|cipher| {
                cipher
                    .encrypt(Nonce::from_slice(nonce), plaintext)
                    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
            })
            .map(|sealed| {
                let mut out = Vec::with_capacity(COMMITMENT_SIZE + sealed.len());
                out.extend_from_slice(commitment);
                out.extend_from_slice(&sealed);
                out
            });

        derived.zeroize();
        result
    }

    fn open_committed(key: &SymmetricKey, iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
        if data.len() < COMMITMENT_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let (received_commitment, sealed) = data.split_at(COMMITMENT_SIZE);

        let mut derived = Self::derive(key, iv)?;
        let (gcm_key, rest) = derived.split_at(GCM_KEY_SIZE);
        let (nonce, commitment) = rest.split_at(GCM_NONCE_SIZE);

        let result = if bool::from(commitment.ct_eq(received_commitment)) {
            Aes128Gcm::new_from_slice(gcm_key)
                .map_err(|_| CryptoError::DecryptionFailed)
                .and_then(|cipher| {
                    cipher
                        .decrypt(Nonce::from_slice(nonce), sealed)
                        .map_err(|_| CryptoError::DecryptionFailed)
                })
        } else {
            Err(CryptoError::DecryptionFailed)
        };

        derived.zeroize();
        result
    }

    /// Expand the session key and iv into gcm key || nonce || commitment
    fn derive(key: &SymmetricKey, iv: &[u8]) -> CryptoResult<[u8; DERIVED_SIZE]> {
        let hk = Hkdf::<Sha256>::new(Some(iv), key.as_bytes());
        let mut okm = [0u8; DERIVED_SIZE];
        hk.expand(ENVELOPE_INFO, &mut okm)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(okm)
    }
}
