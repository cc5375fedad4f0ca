//! Event socket transport.
//!
//! The supervisor only sees the [`SocketConnector`], [`SocketWriter`] and
//! [`SocketReader`] traits; [`TungsteniteConnector`] is the production
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{Five9Error, Five9Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close frame received from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsCloseFrame {
    /// Close code.
    pub code: u16,
    /// Close reason.
    pub reason: String,
}

impl WsCloseFrame {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Something that happened on the read half of a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Text(String),
    /// The socket is gone. `frame` is `None` when no close frame was
    /// received (transport error or abrupt end of stream).
    Closed {
        frame: Option<WsCloseFrame>,
        detail: String,
    },
}

/// Write half of a socket.
#[async_trait]
pub trait SocketWriter: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: &str) -> Five9Result<()>;

    /// Close the socket.
    async fn close(&mut self) -> Five9Result<()>;
}

/// Read half of a socket.
#[async_trait]
pub trait SocketReader: Send {
    /// Wait for the next event. After a [`SocketEvent::Closed`] the reader
    /// must not be polled again.
    async fn next_event(&mut self) -> SocketEvent;
}

/// Both halves of an open socket.
pub struct SocketPair {
    pub writer: Box<dyn SocketWriter>,
    pub reader: Box<dyn SocketReader>,
}

/// Opens sockets.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Open a socket to `url` and complete the handshake.
    async fn connect(&self, url: &str) -> Five9Result<SocketPair>;
}

/// [`SocketConnector`] over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    #[instrument(skip(self))]
    async fn connect(&self, url: &str) -> Five9Result<SocketPair> {
        let url = Url::parse(url).map_err(|e| Five9Error::Socket(format!("invalid URL: {e}")))?;

        let Ok(connect_result) =
            tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await
        else {
            return Err(Five9Error::Socket(format!(
                "connect timed out after {:?}",
                self.connect_timeout
            )));
        };

        let (ws_stream, _response) =
            connect_result.map_err(|e| Five9Error::Socket(format!("Failed to connect WS: {e}")))?;
        info!(url = %url, "Socket open");

        let (write, read) = ws_stream.split();
        Ok(SocketPair {
            writer: Box::new(TungsteniteWriter { inner: write }),
            reader: Box::new(TungsteniteReader { inner: read }),
        })
    }
}

struct TungsteniteWriter {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl SocketWriter for TungsteniteWriter {
    async fn send_text(&mut self, text: &str) -> Five9Result<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Five9Error::Socket(format!("send failed: {e}")))
    }

    async fn close(&mut self) -> Five9Result<()> {
        self.inner
            .close()
            .await
            .map_err(|e| Five9Error::Socket(format!("close failed: {e}")))
    }
}

struct TungsteniteReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl SocketReader for TungsteniteReader {
    async fn next_event(&mut self) -> SocketEvent {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Text(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return SocketEvent::Text(text),
                    Err(_) => debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let frame = frame.map(|f| WsCloseFrame::new(f.code.into(), f.reason.to_string()));
                    return SocketEvent::Closed {
                        frame,
                        detail: "close frame received".into(),
                    };
                }
                Some(Ok(_)) => {
                    // Ignore other message types (ping, pong, raw frames)
                }
                Some(Err(e)) => {
                    return SocketEvent::Closed {
                        frame: None,
                        detail: format!("WebSocket error: {e}"),
                    };
                }
                None => {
                    return SocketEvent::Closed {
                        frame: None,
                        detail: "stream ended".into(),
                    };
                }
            }
        }
    }
}
