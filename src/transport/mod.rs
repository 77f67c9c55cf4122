//! Transport layer abstraction
//!
//! The protocol only needs a reliable, ordered, bidirectional channel of
//! [`WireEvent`]s. This module provides:
//! - In-memory channels (for testing)
//! - WebSocket connections carrying one JSON event per text frame
//!
//! # Design
//!
//! The transport moves events and nothing else. It never looks inside an
//! envelope; encryption is handled by the session layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{CipherSuite, Envelope};

pub mod websocket;
pub use websocket::WebSocketTransport;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("Connection closed")]
    Disconnected,

    /// Send failed
    #[error("Failed to send: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("Failed to receive: {0}")]
    ReceiveFailed(String),

    /// A frame arrived that is not a valid event
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Events exchanged over a connection
///
/// Serialized as `{"type": "<event>", "data": <payload>}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum WireEvent {
    /// Initiator → responder: RSA public key (SPKI PEM) and the channel suite
    PublishPublicKey {
        /// PEM text starting with `-----BEGIN PUBLIC KEY-----`
        public_key: String,
        /// Suite the secure channel will use
        #[serde(default)]
        suite: CipherSuite,
    },

    /// Responder → initiator: the session key wrapped under OAEP, base64
    SubmitEncryptedKey {
        /// Base64 OAEP ciphertext
        key: String,
    },

    /// Initiator → responder: informational, the key was installed
    HandshakeComplete,

    /// Either direction: one encrypted message
    SecureMessage(Envelope),
}

impl WireEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            WireEvent::PublishPublicKey { .. } => "publish-public-key",
            WireEvent::SubmitEncryptedKey { .. } => "submit-encrypted-key",
            WireEvent::HandshakeComplete => "handshake-complete",
            WireEvent::SecureMessage(_) => "secure-message",
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> TransportResult<String> {
        serde_json::to_string(self).map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Parse a JSON text frame
    pub fn from_json(text: &str) -> TransportResult<Self> {
        serde_json::from_str(text).map_err(|e| TransportError::InvalidData(e.to_string()))
    }
}

/// Abstract transport trait
///
/// All transports must implement this trait. Events must be delivered in
/// order; the handshake relies on it.
#[async_trait]
pub trait Transport: Send {
    /// Send an event to the peer
    async fn send(&mut self, event: &WireEvent) -> TransportResult<()>;

    /// Receive the next event from the peer
    ///
    /// Blocks until an event is available or the connection is closed.
    async fn receive(&mut self) -> TransportResult<WireEvent>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&mut self) -> TransportResult<()>;
}

/// In-memory transport for testing
///
/// Uses channels to simulate a connection between two endpoints.
pub mod memory {
    use super::*;
    use tokio::sync::mpsc;

    /// Create a pair of connected in-memory transports
    pub fn create_pair() -> (MemoryTransport, MemoryTransport) {
        let (tx1, rx1) = mpsc::channel(100);
        let (tx2, rx2) = mpsc::channel(100);

        let transport1 = MemoryTransport {
            tx: Some(tx1),
            rx: rx2,
            connected: true,
        };

        let transport2 = MemoryTransport {
            tx: Some(tx2),
            rx: rx1,
            connected: true,
        };

        (transport1, transport2)
    }

    /// In-memory transport endpoint
    pub struct MemoryTransport {
        tx: Option<mpsc::Sender<WireEvent>>,
        rx: mpsc::Receiver<WireEvent>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&mut self, event: &WireEvent) -> TransportResult<()> {
            let tx = match (&self.tx, self.connected) {
                (Some(tx), true) => tx,
                _ => return Err(TransportError::Disconnected),
            };

            tx.send(event.clone())
                .await
                .map_err(|_| TransportError::SendFailed("Channel closed".to_string()))
        }

        async fn receive(&mut self) -> TransportResult<WireEvent> {
            if !self.connected {
                return Err(TransportError::Disconnected);
            }

            match self.rx.recv().await {
                Some(event) => Ok(event),
                None => {
                    self.connected = false;
                    Err(TransportError::Disconnected)
                }
            }
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn close(&mut self) -> TransportResult<()> {
            // Dropping our sender lets the peer observe the disconnect
            self.connected = false;
            self.tx = None;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport() {
        let (mut server, mut client) = memory::create_pair();

        server.send(&WireEvent::HandshakeComplete).await.unwrap();
        assert_eq!(client.receive().await.unwrap(), WireEvent::HandshakeComplete);

        let submit = WireEvent::SubmitEncryptedKey {
            key: "a2V5".to_string(),
        };
        client.send(&submit).await.unwrap();
        assert_eq!(server.receive().await.unwrap(), submit);
    }

    #[tokio::test]
    async fn test_memory_transport_close() {
        let (mut server, mut client) = memory::create_pair();

        server.close().await.unwrap();
        assert!(!server.is_connected());
        assert!(server.send(&WireEvent::HandshakeComplete).await.is_err());

        // The peer sees the disconnect
        assert!(matches!(
            client.receive().await,
            Err(TransportError::Disconnected)
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_wire_format() {
        let event = WireEvent::SecureMessage(Envelope {
            iv: "aXY=".to_string(),
            data: "ZGF0YQ==".to_string(),
        });
        let json = event.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"secure-message","data":{"iv":"aXY=","data":"ZGF0YQ=="}}"#
        );

        let submit = WireEvent::SubmitEncryptedKey {
            key: "a2V5".to_string(),
        };
        assert_eq!(
            submit.to_json().unwrap(),
            r#"{"type":"submit-encrypted-key","data":{"key":"a2V5"}}"#
        );
    }

    #[test]
    fn test_publish_suite_defaults() {
        let json = r#"{"type":"publish-public-key","data":{"public_key":"PEM"}}"#;
        match WireEvent::from_json(json).unwrap() {
            WireEvent::PublishPublicKey { public_key, suite } => {
                assert_eq!(public_key, "PEM");
                assert_eq!(suite, CipherSuite::CommittedAesGcm);
            }
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_event_names_and_parsing() {
        let events = vec![
            WireEvent::PublishPublicKey {
                public_key: "PEM".to_string(),
                suite: CipherSuite::AesCbc,
            },
            WireEvent::SubmitEncryptedKey {
                key: "a2V5".to_string(),
            },
            WireEvent::HandshakeComplete,
            WireEvent::SecureMessage(Envelope {
                iv: "aXY=".to_string(),
                data: "ZA==".to_string(),
            }),
        ];

        for event in events {
            let json = event.to_json().unwrap();
            assert!(json.contains(event.name()));
            assert_eq!(WireEvent::from_json(&json).unwrap(), event);
        }

        assert!(matches!(
            WireEvent::from_json(r#"{"type":"launch-missiles"}"#),
            Err(TransportError::InvalidData(_))
        ));
    }
}
