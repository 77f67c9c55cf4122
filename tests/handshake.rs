//! End-to-end handshake and messaging scenarios.

use std::sync::Arc;
use std::time::Duration;

use sealchat::crypto::{Cipher, CipherSuite, Envelope, KeyPair, SymmetricKey, SYMMETRIC_KEY_SIZE};
use sealchat::session::SessionState;
use sealchat::transport::{memory, Transport, TransportError, WebSocketTransport};
use sealchat::{Client, Incoming, Server, ServerConfig, SessionError, WireEvent};
use tokio::net::TcpListener;

async fn start_server(config: ServerConfig) -> (Arc<Server>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = Arc::new(Server::new(config));

    let running = server.clone();
    tokio::spawn(async move {
        let _ = running.run(listener).await;
    });

    (server, url)
}

#[tokio::test]
async fn test_websocket_hello_roundtrip() {
    for suite in [CipherSuite::CommittedAesGcm, CipherSuite::AesCbc] {
        let (server, url) = start_server(ServerConfig {
            suite,
            ..ServerConfig::default()
        })
        .await;

        let transport = WebSocketTransport::connect(&url).await.unwrap();
        let mut client = Client::new(transport);
        client.handshake().await.unwrap();
        assert_eq!(client.state(), SessionState::Ready);
        assert_eq!(client.responder().session().suite(), suite);

        assert_eq!(client.next_incoming().await.unwrap(), Incoming::HandshakeComplete);

        client.send_message("hello").await.unwrap();
        assert_eq!(
            client.next_incoming().await.unwrap(),
            Incoming::Message("Echo: hello".to_string())
        );
        assert_eq!(server.registry().len().await, 1);

        client.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_raw_protocol_scenario() {
    let server = Arc::new(Server::new(ServerConfig::default()));
    let (server_end, mut peer) = memory::create_pair();

    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_connection(server_end, "memory").await })
    };

    // Client receives a PEM public key
    let pem = match peer.receive().await.unwrap() {
        WireEvent::PublishPublicKey { public_key, suite } => {
            assert_eq!(suite, CipherSuite::CommittedAesGcm);
            public_key
        }
        other => panic!("Unexpected event: {:?}", other),
    };
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

    // A message before the key exchange is dropped, no reply is produced
    peer.send(&WireEvent::SecureMessage(Envelope {
        iv: "AAAAAAAAAAAAAAAAAAAAAA==".to_string(),
        data: "AAAAAAAAAAAAAAAAAAAAAA==".to_string(),
    }))
    .await
    .unwrap();

    // 16-byte key, wrapped and submitted
    let key = SymmetricKey::generate().unwrap();
    assert_eq!(key.as_bytes().len(), SYMMETRIC_KEY_SIZE);
    let wrapped = sealchat::crypto::ExchangePublicKey::from_pem(&pem)
        .unwrap()
        .wrap_key(&key)
        .unwrap();
    peer.send(&WireEvent::SubmitEncryptedKey { key: wrapped })
        .await
        .unwrap();

    // The first reply is the handshake confirmation, not an echo of the early message
    assert_eq!(peer.receive().await.unwrap(), WireEvent::HandshakeComplete);

    let envelope = Cipher::encrypt(CipherSuite::CommittedAesGcm, &key, "hello").unwrap();
    peer.send(&WireEvent::SecureMessage(envelope)).await.unwrap();
    match peer.receive().await.unwrap() {
        WireEvent::SecureMessage(reply) => {
            let text = Cipher::decrypt(CipherSuite::CommittedAesGcm, &key, &reply).unwrap();
            assert_eq!(text, "Echo: hello");
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    peer.close().await.unwrap();
    let id = task.await.unwrap();
    assert!(server.registry().is_empty().await);
    assert_eq!(
        server
            .dispatch(id, WireEvent::HandshakeComplete)
            .await
            .unwrap_err(),
        SessionError::SessionNotFound(id)
    );
}

#[tokio::test]
async fn test_key_wrapped_for_someone_else() {
    let server = Arc::new(Server::new(ServerConfig::default()));
    let (server_end, mut peer) = memory::create_pair();

    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_connection(server_end, "memory").await })
    };
    assert!(matches!(
        peer.receive().await.unwrap(),
        WireEvent::PublishPublicKey { .. }
    ));

    // Wrapped under a stranger's key: rejected, session stays unkeyed
    let stranger = KeyPair::generate().unwrap();
    let key = SymmetricKey::generate().unwrap();
    let wrapped = stranger.public_key().wrap_key(&key).unwrap();
    peer.send(&WireEvent::SubmitEncryptedKey { key: wrapped })
        .await
        .unwrap();

    // Messages under that key never produce a reply
    let envelope = Cipher::encrypt(CipherSuite::CommittedAesGcm, &key, "hello").unwrap();
    peer.send(&WireEvent::SecureMessage(envelope)).await.unwrap();

    // No confirmation and no echo come back
    let silence = tokio::time::timeout(Duration::from_millis(300), peer.receive()).await;
    assert!(silence.is_err());

    let ids = server.registry().ids().await;
    assert_eq!(ids.len(), 1);
    let handle = server.registry().get(ids[0]).await.unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::KeyPublished);
        assert!(!session.has_symmetric_key());
    }

    peer.close().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_connections_are_independent() {
    let (server, url) = start_server(ServerConfig::default()).await;

    let mut first = Client::new(WebSocketTransport::connect(&url).await.unwrap());
    let mut second = Client::new(WebSocketTransport::connect(&url).await.unwrap());
    first.handshake().await.unwrap();
    second.handshake().await.unwrap();
    assert_eq!(first.next_incoming().await.unwrap(), Incoming::HandshakeComplete);
    assert_eq!(second.next_incoming().await.unwrap(), Incoming::HandshakeComplete);
    assert_eq!(server.registry().len().await, 2);

    first.send_message("one").await.unwrap();
    second.send_message("two").await.unwrap();
    assert_eq!(
        first.next_incoming().await.unwrap(),
        Incoming::Message("Echo: one".to_string())
    );
    assert_eq!(
        second.next_incoming().await.unwrap(),
        Incoming::Message("Echo: two".to_string())
    );

    first.close().await.unwrap();
    assert!(matches!(
        first.send_message("gone").await,
        Err(sealchat::ClientError::Session(_))
    ));
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_client_sees_disconnect() {
    let (server_end, client_end) = memory::create_pair();
    let mut client = Client::new(client_end);
    drop(server_end);

    assert!(matches!(
        client.handshake().await,
        Err(sealchat::ClientError::HandshakeIncomplete)
    ));
    assert!(matches!(
        client.next_incoming().await,
        Err(sealchat::ClientError::Transport(TransportError::Disconnected))
    ));
}
