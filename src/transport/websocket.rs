//! WebSocket transport
//!
//! Each [`WireEvent`] travels as one JSON text frame. The same type serves
//! both ends: clients [`connect`](WebSocketTransport::connect) to a URL, the
//! server [`accept`](WebSocketTransport::accept)s an incoming TCP stream.

use super::{Transport, TransportError, TransportResult, WireEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    accept_async, connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

/// WebSocket connection carrying wire events
pub struct WebSocketTransport<S> {
    ws: WebSocketStream<S>,
    connected: bool,
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
    /// Connect to a server, e.g. `ws://127.0.0.1:3001`
    pub async fn connect(url: &str) -> TransportResult<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(WebSocketTransport {
            ws,
            connected: true,
        })
    }
}

impl WebSocketTransport<TcpStream> {
    /// Complete the WebSocket handshake on an accepted TCP connection
    pub async fn accept(stream: TcpStream) -> TransportResult<Self> {
        let ws = accept_async(stream)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(WebSocketTransport {
            ws,
            connected: true,
        })
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, event: &WireEvent) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        let json = event.to_json()?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&mut self) -> TransportResult<WireEvent> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return WireEvent::from_json(&text);
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.connected = false;
                    return Err(TransportError::Disconnected);
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(TransportError::InvalidData(
                        "binary frames are not part of the protocol".to_string(),
                    ));
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                // tungstenite queues the pong for pings itself
                _ => continue,
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.ws
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Envelope;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_websocket_event_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = WebSocketTransport::accept(stream).await.unwrap();

            let event = transport.receive().await.unwrap();
            transport.send(&event).await.unwrap();

            // Client hangs up
            assert!(matches!(
                transport.receive().await,
                Err(TransportError::Disconnected)
            ));
        });

        let mut client = WebSocketTransport::connect(&format!("ws://{}", addr))
            .await
            .unwrap();
        let event = WireEvent::SecureMessage(Envelope {
            iv: "aXY=".to_string(),
            data: "ZA==".to_string(),
        });
        client.send(&event).await.unwrap();
        assert_eq!(client.receive().await.unwrap(), event);

        client.close().await.unwrap();
        assert!(!client.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_frame_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = WebSocketTransport::accept(stream).await.unwrap();
            transport.receive().await
        });

        let (mut raw, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        raw.send(Message::Text("{not json".to_string())).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(TransportError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_ping_answered_and_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = WebSocketTransport::accept(stream).await.unwrap();
            let event = transport.receive().await.unwrap();
            transport.send(&event).await.unwrap();
            event
        });

        let (mut raw, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        raw.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
        raw.send(Message::Text(WireEvent::HandshakeComplete.to_json().unwrap()))
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), WireEvent::HandshakeComplete);

        let mut saw_pong = false;
        loop {
            match raw.next().await.unwrap().unwrap() {
                Message::Pong(data) => {
                    assert_eq!(data, vec![1, 2, 3]);
                    saw_pong = true;
                }
                Message::Text(text) => {
                    assert_eq!(WireEvent::from_json(&text).unwrap(), WireEvent::HandshakeComplete);
                    break;
                }
                other => panic!("Unexpected frame: {:?}", other),
            }
        }
        assert!(saw_pong);
    }
}
