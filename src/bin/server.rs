//! SealChat server
//!
//! Accepts WebSocket connections, runs the key exchange for each one and
//! echoes decrypted messages back encrypted.
//!
//! Usage:
//!   sealchat-server [--listen 127.0.0.1:3001] [--handshake-timeout 30] [--suite aes-128-gcm-committed]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sealchat::config::{ServerConfig, DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR};
use sealchat::{CipherSuite, Server};
use tokio::net::TcpListener;
use tracing::warn;

/// SealChat server
#[derive(Parser)]
#[command(name = "sealchat-server")]
#[command(about = "Hybrid RSA/AES encrypted messaging server")]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "SEALCHAT_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Seconds a client gets to finish the handshake (0 = no limit)
    #[arg(long, env = "SEALCHAT_HANDSHAKE_TIMEOUT", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_SECS)]
    handshake_timeout: u64,

    /// Message cipher suite: aes-128-gcm-committed or aes-128-cbc
    #[arg(long, env = "SEALCHAT_SUITE", default_value = "aes-128-gcm-committed")]
    suite: CipherSuite,

    /// Do not echo messages back to the sender
    #[arg(long, env = "SEALCHAT_NO_ECHO")]
    no_echo: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            listen_addr: args.listen,
            handshake_timeout_secs: args.handshake_timeout,
            suite: args.suite,
            echo: !args.no_echo,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sealchat=info".parse()?),
        )
        .init();

    let server = Arc::new(Server::new(ServerConfig::from(Args::parse())));
    let config = server.config();
    if !config.suite.is_authenticated() {
        warn!("{} selected: messages are not integrity protected", config.suite);
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    server.run(listener).await?;
    Ok(())
}
