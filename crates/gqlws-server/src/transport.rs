//! Socket halves consumed by the connection actor.
//!
//! The actor only sees text going out and [`Frame`]s coming in, so it can run
//! over an axum WebSocket in production and over in-memory channels in tests.

use std::pin::Pin;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{future, Sink, SinkExt, Stream, StreamExt};

/// An inbound frame, reduced to what the protocol cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping or pong, answered by the socket layer itself.
    Control,
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Socket(String),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("transport closed")]
    Closed,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Split an upgraded axum socket into the halves the actor drives.
pub fn split_websocket(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (tx, rx) = socket.split();

    let sink = tx
        .sink_map_err(|err| TransportError::Socket(err.to_string()))
        .with(|text: String| future::ready(Ok::<_, TransportError>(WsMessage::Text(text.into()))));

    let stream = rx.map(|message| match message {
        Ok(WsMessage::Text(text)) => Ok(Frame::Text(text.as_str().to_owned())),
        Ok(WsMessage::Binary(bytes)) => Ok(Frame::Binary(bytes.to_vec())),
        Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => Ok(Frame::Control),
        Ok(WsMessage::Close(_)) => Ok(Frame::Close),
        Err(err) => Err(TransportError::Socket(err.to_string())),
    });

    (Box::pin(sink), Box::pin(stream))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::task::{Context, Poll};

    use futures::channel::mpsc;

    use super::*;

    /// Client side of an in-memory transport.
    pub struct Peer {
        pub to_server: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        pub from_server: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        pub fn send_text(&self, text: &str) {
            let _ = self.to_server.unbounded_send(Ok(Frame::Text(text.to_string())));
        }

        pub fn send_json(&self, value: serde_json::Value) {
            self.send_text(&value.to_string());
        }

        /// Next frame written by the server, or `None` once the sink is gone.
        pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
            let text = self.from_server.next().await?;
            serde_json::from_str(&text).ok()
        }
    }

    pub fn memory_transport() -> (FrameSink, FrameStream, Peer) {
        let (out_tx, out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Frame, TransportError>>();
        let sink = out_tx.sink_map_err(|_| TransportError::Closed);
        let peer = Peer {
            to_server: in_tx,
            from_server: out_rx,
        };
        (Box::pin(sink), Box::pin(in_rx), peer)
    }

    /// A sink whose writes never complete.
    pub struct StalledSink;

    impl Sink<String> for StalledSink {
        type Error = TransportError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: String) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }
}
