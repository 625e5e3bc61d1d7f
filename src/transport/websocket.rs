//! WebSocket transport.
//!
//! Splits a tokio-tungstenite [`WebSocketStream`] into the two transport
//! halves. Text and binary frames become relay messages; ping/pong are
//! answered by tungstenite and never reach the hub.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage, Utf8Bytes};
use tracing::debug;

use crate::error::Result;
use crate::message::{Message, MessageKind};

use super::{MessageSink, MessageSource};

// ============================================================================
// Split
// ============================================================================

/// Splits a WebSocket stream into relay transport halves.
pub fn split<S>(ws_stream: WebSocketStream<S>) -> (WsSink<S>, WsSource<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws_stream.split();
    (WsSink { sink }, WsSource { stream })
}

// ============================================================================
// WsSource
// ============================================================================

/// Inbound half of a WebSocket connection.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> MessageSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<Option<Message>> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(Some(Message::from_utf8(text.into())));
                }

                Some(Ok(WsMessage::Binary(data))) => {
                    return Ok(Some(Message::binary(data)));
                }

                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return Ok(None);
                }

                // Ping, Pong, raw frames
                Some(Ok(_)) => {}

                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Ok(None);
                }

                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

// ============================================================================
// WsSink
// ============================================================================

/// Outbound half of a WebSocket connection.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S> MessageSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: Message) -> Result<()> {
        self.sink.send(to_ws_message(message)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Re-emits a relay message with the frame type it arrived with.
fn to_ws_message(message: Message) -> WsMessage {
    let kind = message.kind();
    let payload = message.into_payload();

    match kind {
        MessageKind::Text => Utf8Bytes::try_from(payload.clone())
            .map(WsMessage::Text)
            .unwrap_or_else(|_| WsMessage::Binary(payload)),
        MessageKind::Binary => WsMessage::Binary(payload),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_stays_text() {
        let ws = to_ws_message(Message::text("hello"));
        assert!(matches!(ws, WsMessage::Text(ref t) if t.as_str() == "hello"));
    }

    #[test]
    fn test_binary_stays_binary() {
        let ws = to_ws_message(Message::binary(vec![0xde, 0xad]));
        assert!(matches!(ws, WsMessage::Binary(ref b) if b[..] == [0xde, 0xad]));
    }

    #[tokio::test]
    async fn test_duplex_roundtrip() {
        use tokio_tungstenite::tungstenite::protocol::Role;

        let (client_io, server_io) = tokio::io::duplex(4096);
        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let mut client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let (mut sink, mut source) = split(server_ws);

        client_ws
            .send(WsMessage::Binary(vec![1u8, 2, 3].into()))
            .await
            .unwrap();
        let received = source.receive().await.unwrap().expect("message");
        assert_eq!(received, Message::binary(vec![1u8, 2, 3]));

        client_ws.send(WsMessage::Text("hi".into())).await.unwrap();
        let received = source.receive().await.unwrap().expect("message");
        assert_eq!(received.kind(), MessageKind::Text);
        assert_eq!(received.as_text(), Some("hi"));

        sink.send(Message::text("back")).await.unwrap();
        let echoed = client_ws.next().await.expect("frame").unwrap();
        assert_eq!(echoed, WsMessage::Text("back".into()));

        client_ws.close(None).await.unwrap();
        assert!(source.receive().await.unwrap().is_none());
    }
}
