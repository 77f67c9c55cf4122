//! Server and client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::CipherSuite;

/// Default listen address of the server
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3001";

/// Default server URL for the client
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3001";

/// Default handshake deadline in seconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Prefix the server puts on echoed messages
pub const ECHO_PREFIX: &str = "Echo: ";

/// Configuration for the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, `host:port`
    pub listen_addr: String,

    /// Seconds a connection may take to reach `READY`; 0 disables the deadline
    pub handshake_timeout_secs: u64,

    /// Cipher suite announced to every client
    pub suite: CipherSuite,

    /// Reply to every decrypted message with an encrypted echo
    pub echo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            suite: CipherSuite::default(),
            echo: true,
        }
    }
}

impl ServerConfig {
    /// Handshake deadline, if enabled
    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Configuration for the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket URL of the server
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}
