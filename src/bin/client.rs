//! SealChat terminal client
//!
//! Connects to a server, completes the handshake, then sends every stdin line
//! as an encrypted message and prints whatever comes back.
//!
//! Usage:
//!   sealchat-client [--url ws://127.0.0.1:3001]

use anyhow::Context;
use clap::Parser;
use sealchat::config::{ClientConfig, DEFAULT_SERVER_URL};
use sealchat::transport::WebSocketTransport;
use sealchat::{Client, Incoming};
use tokio::io::{AsyncBufReadExt, BufReader};

/// SealChat client
#[derive(Parser)]
#[command(name = "sealchat-client")]
#[command(about = "Terminal client for the SealChat encrypted messenger")]
struct Args {
    /// Server WebSocket URL
    #[arg(short, long, env = "SEALCHAT_URL", default_value = DEFAULT_SERVER_URL)]
    url: String,
}

enum Step {
    Line(Option<String>),
    Incoming(sealchat::ClientResult<Incoming>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sealchat=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        server_url: args.url,
    };

    let transport = WebSocketTransport::connect(&config.server_url)
        .await
        .with_context(|| format!("could not reach {}", config.server_url))?;
    let mut client = Client::new(transport);

    println!("Connected to {}, waiting for secure session...", config.server_url);
    client.handshake().await.context("handshake failed")?;

    let fingerprint = client
        .responder()
        .server_fingerprint()
        .unwrap_or("unknown")
        .to_string();
    println!("Secure session ready ({}).", client.responder().session().suite());
    println!("Server key fingerprint: {}", fingerprint);
    println!("Type a message and press enter. Ctrl-D quits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Line(line?),
            incoming = client.next_incoming() => Step::Incoming(incoming),
        };

        match step {
            Step::Line(None) => break,
            Step::Line(Some(line)) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = client.send_message(text).await {
                    eprintln!("Not sent: {}", e);
                    continue;
                }
                println!("You: {}", text);
            }
            Step::Incoming(Ok(Incoming::HandshakeComplete)) => {
                println!("(server confirmed the session key)");
            }
            Step::Incoming(Ok(Incoming::Message(text))) => {
                println!("Server: {}", text);
            }
            Step::Incoming(Err(e)) => {
                eprintln!("Connection lost: {}", e);
                return Ok(());
            }
        }
    }

    client.close().await?;
    Ok(())
}
