//! Transport Adapter and Write Serializer (spec §4.1, §4.2).
//!
//! The core depends only on these traits, never on a concrete WebSocket
//! framing crate — `demos/basic-call` supplies the `tokio-tungstenite`
//! implementation. [`Connection`](crate::connection::Connection) is generic
//! over `T: Transport` rather than boxing a trait object, so the hot path
//! never pays for dynamic dispatch and the traits can use plain `async fn`
//! (no `async-trait`, matching the teacher's dependency set).

use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{ClientError, Result};

/// One complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete text message.
    Text(String),
    /// An inbound ping control frame; the read loop replies with a pong.
    Ping,
    /// An inbound pong control frame (keepalive response).
    Pong,
}

/// The read half of a duplex transport. Owned exclusively by the read loop —
/// never shared, never locked.
pub trait TransportRead: Send + 'static {
    /// Block until one complete frame arrives, the read deadline elapses, or
    /// the connection errors.
    fn read(&mut self) -> impl std::future::Future<Output = Result<Frame>> + Send;

    /// Reset the rolling read deadline to `now + window`. Called by the read
    /// loop on every inbound control frame (spec §4.7 keepalive).
    fn set_read_deadline(&mut self, window: Duration);
}

/// The write half of a duplex transport. Shared across command issuers and
/// the ping loop, always behind [`WriteHalf`]'s serializing mutex.
pub trait TransportWrite: Send + 'static {
    /// Write a single text message. Never called concurrently with another
    /// write on the same transport — [`WriteHalf`] enforces this.
    fn write_text(
        &mut self,
        text: String,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a ping control frame.
    fn write_ping(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a pong control frame (echoing an inbound ping).
    fn write_pong(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Close the transport. Idempotent from the caller's perspective.
    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

/// A duplex text-frame channel with ping/pong control frames, splittable
/// into independently-owned read/write halves the way
/// `tokio_tungstenite::WebSocketStream::split` works.
pub trait Transport: Send + 'static {
    type Read: TransportRead;
    type Write: TransportWrite;

    /// Dial the transport and split it into a read half and a write half.
    fn connect(&self) -> impl std::future::Future<Output = Result<(Self::Read, Self::Write)>> + Send;
}

/// Write Serializer (spec §4.2): a single mutual-exclusion lock wrapping
/// every write to the transport. Held only across one write call — never
/// while a handler runs, never nested with `pendingMu` or `registryMu`.
///
/// This is a hard contract: most duplex-frame transports (including
/// `tokio-tungstenite`'s) corrupt framing under concurrent writers.
pub struct WriteHalf<W: TransportWrite> {
    inner: Mutex<W>,
}

impl<W: TransportWrite> WriteHalf<W> {
    pub fn new(write: W) -> Self {
        Self { inner: Mutex::new(write) }
    }

    pub async fn write_text(&self, text: String) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_text(text).await
    }

    pub async fn write_ping(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_ping().await
    }

    pub async fn write_pong(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_pong().await
    }

    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        guard.close().await
    }
}

/// Convenience constructor for transport errors, used by concrete adapters.
pub fn transport_err(msg: impl Into<String>) -> ClientError {
    ClientError::Transport(msg.into())
}
