use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tracing::debug;

use crate::config::ServiceEndpoint;
use crate::error::TransportError;
use crate::transport::{Frame, Link, Transport};

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, endpoint: &ServiceEndpoint) -> Result<Link, TransportError> {
        let (socket, response) = tokio_tungstenite::connect_async(endpoint.address.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(
            service = %endpoint.name,
            status = response.status().as_u16(),
            "websocket handshake complete"
        );

        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(send_error)
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_message(frame))));
        let stream = stream.map(|msg| msg.map(from_message).map_err(TransportError::from));

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn send_error(error: tungstenite::Error) -> TransportError {
    TransportError::Send(error.to_string())
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
            code: CloseCode::from(code),
            reason: Utf8Bytes::from_static(""),
        })),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(frame) => Frame::Close(frame.map(|f| u16::from(f.code))),
        Message::Frame(_) => Frame::Binary(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_failures_are_send_errors() {
        let err = send_error(tungstenite::Error::AlreadyClosed);
        assert_eq!(err.kind(), "send");
        assert!(err.to_string().starts_with("send failed:"));
    }

    #[test]
    fn close_frame_carries_code() {
        let Message::Close(Some(frame)) = to_message(Frame::Close(Some(1000))) else {
            panic!("expected close frame");
        };
        assert_eq!(u16::from(frame.code), 1000);
        assert_eq!(from_message(Message::Close(Some(frame))), Frame::Close(Some(1000)));
    }

    #[test]
    fn text_frames_map_both_ways() {
        let msg = to_message(Frame::Text(r#"{"type":"ping"}"#.into()));
        assert_eq!(msg.to_text().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(from_message(msg), Frame::Text(r#"{"type":"ping"}"#.into()));
    }

    #[test]
    fn bare_close_has_no_code() {
        assert_eq!(from_message(Message::Close(None)), Frame::Close(None));
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = ServiceEndpoint::new("claude", format!("ws://127.0.0.1:{port}/ws/realtime"));
        let err = WsTransport.connect(&endpoint).await.err().unwrap();
        assert_eq!(err.kind(), "connect");
    }
}
