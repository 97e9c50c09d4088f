//! `cm_client::Transport` implementation over `tokio-tungstenite`.
//!
//! The core crate never depends on a concrete WebSocket framing library
//! (spec.md §1 "Out of scope ... the concrete WebSocket framing library");
//! this is the adapter a real caller supplies.

use std::time::Duration;

use cm_client::{transport_err, Frame, Result, Transport, TransportRead, TransportWrite};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Initial read deadline before the keepalive loop resets it on the first
/// inbound control frame.
const INITIAL_READ_WINDOW: Duration = Duration::from_secs(10);

/// Dials a CM WebSocket URL, e.g. `wss://cm.example.com/v1/ws/events`.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Transport for WsTransport {
    type Read = WsRead;
    type Write = WsWrite;

    async fn connect(&self) -> Result<(Self::Read, Self::Write)> {
        let (stream, _response) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| transport_err(format!("connect to {} failed: {e}", self.url)))?;
        let (write, read) = stream.split();
        Ok((WsRead::new(read), WsWrite(write)))
    }
}

/// Read half. Owned exclusively by the core's read loop.
pub struct WsRead {
    stream: SplitStream<WsStream>,
    deadline: tokio::time::Instant,
}

impl WsRead {
    fn new(stream: SplitStream<WsStream>) -> Self {
        Self { stream, deadline: tokio::time::Instant::now() + INITIAL_READ_WINDOW }
    }
}

impl TransportRead for WsRead {
    async fn read(&mut self) -> Result<Frame> {
        loop {
            let remaining = self.deadline.saturating_duration_since(tokio::time::Instant::now());
            let next = tokio::time::timeout(remaining, self.stream.next())
                .await
                .map_err(|_| transport_err("read deadline exceeded"))?;
            match next {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Ping(_))) => return Ok(Frame::Ping),
                Some(Ok(Message::Pong(_))) => return Ok(Frame::Pong),
                // Binary/raw frames carry no protocol meaning here; keep reading.
                Some(Ok(Message::Binary(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(transport_err("connection closed by peer"));
                }
                Some(Err(e)) => return Err(transport_err(format!("read failed: {e}"))),
            }
        }
    }

    fn set_read_deadline(&mut self, window: Duration) {
        self.deadline = tokio::time::Instant::now() + window;
    }
}

/// Write half. Always driven behind `cm_client::WriteHalf`'s serializing
/// mutex — never called concurrently with itself.
pub struct WsWrite(SplitSink<WsStream, Message>);

impl TransportWrite for WsWrite {
    async fn write_text(&mut self, text: String) -> Result<()> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| transport_err(format!("write failed: {e}")))
    }

    async fn write_ping(&mut self) -> Result<()> {
        self.0
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| transport_err(format!("ping write failed: {e}")))
    }

    async fn write_pong(&mut self) -> Result<()> {
        self.0
            .send(Message::Pong(Vec::new().into()))
            .await
            .map_err(|e| transport_err(format!("pong write failed: {e}")))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}
