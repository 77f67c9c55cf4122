//! # SealChat
//!
//! Confidential client/server messaging without a pre-shared secret.
//!
//! ## Features
//!
//! - **Hybrid handshake**: the server publishes an RSA-2048 key per connection,
//!   the client answers with a random 128-bit session key wrapped under OAEP
//! - **Per-message envelopes** with a fresh iv every time, key-committing
//!   AES-GCM by default, AES-CBC available for legacy peers
//! - **Explicit session state machine**: no message is sealed or opened before
//!   the session is `READY`
//! - **Pluggable transport** (WebSocket, in-memory)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sealchat::crypto::{KeyPair, SymmetricKey};
//! use sealchat::session::{Responder, SessionId};
//!
//! // Server side: publish a public key
//! let server = KeyPair::generate().unwrap();
//! let pem = server.public_key().to_pem().unwrap();
//!
//! // Client side: answer with a wrapped session key
//! let mut client = Responder::new(SessionId::next());
//! let wrapped = client.on_public_key_received(&pem, Default::default()).unwrap();
//!
//! // Server recovers the same key
//! let key: SymmetricKey = server.unwrap_key(&wrapped).unwrap();
//! let envelope = client.seal("hello").unwrap();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              APPLICATION LAYER              │
//! │        sealchat-server | sealchat-client    │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │              PROTOCOL LAYER                 │
//! │  Initiator | Responder | Session Registry   │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │               CRYPTO LAYER                  │
//! │  RSA-OAEP | AES-128-GCM (committed) | CBC   │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │             TRANSPORT LAYER                 │
//! │          WebSocket (JSON) | Memory          │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod crypto;
pub mod server;
pub mod session;
pub mod transport;

// Re-export main types at crate root
pub use client::{Client, ClientError, ClientResult, Incoming};
pub use config::{ClientConfig, ServerConfig};
pub use crypto::{CipherSuite, CryptoError, CryptoResult, Envelope};
pub use server::Server;
pub use session::{SessionError, SessionId, SessionResult, SessionState};
pub use transport::{Transport, TransportError, WireEvent};
