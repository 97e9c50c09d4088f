//! In-memory duplex transport standing in for a live CM server, so the
//! black-box scenarios in spec.md §8 run deterministically without a
//! network (SPEC_FULL.md §8 "Test tooling").

use std::time::Duration;

use cm_client::{transport_err, Frame, Result, Transport, TransportRead, TransportWrite};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

/// A client-side frame captured on the server side of the fake transport.
pub enum ClientFrame {
    Json(Value),
    Ping,
    Pong,
}

const PING_SENTINEL: &str = "__fake_transport_ping__";
const PONG_SENTINEL: &str = "__fake_transport_pong__";

/// The server end of one connection attempt. Dropping this (or calling
/// [`Self::disconnect`]) ends the client's read loop the way a dropped TCP
/// connection would.
pub struct FakeServer {
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl FakeServer {
    pub fn send_json(&self, value: Value) {
        let _ = self.to_client.send(Frame::Text(value.to_string()));
    }

    pub async fn recv_client_frame(&self) -> Option<ClientFrame> {
        let text = self.from_client.lock().await.recv().await?;
        Some(match text.as_str() {
            PING_SENTINEL => ClientFrame::Ping,
            PONG_SENTINEL => ClientFrame::Pong,
            _ => ClientFrame::Json(serde_json::from_str(&text).unwrap_or(Value::Null)),
        })
    }

    /// Wait for the next client frame that is a JSON command, skipping any
    /// ping/pong control frames interleaved with it.
    pub async fn recv_client_json(&self) -> Option<Value> {
        loop {
            match self.recv_client_frame().await? {
                ClientFrame::Json(v) => return Some(v),
                ClientFrame::Ping | ClientFrame::Pong => continue,
            }
        }
    }

    /// Run the handshake server side (spec.md §4.7, §6): server-hello,
    /// then read the registration frame, then reply registered. Returns the
    /// registration frame so the test can assert on it.
    pub async fn handshake(&self, session_id: &str) -> Option<Value> {
        self.send_json(serde_json::json!({"status": "connected", "session_id": session_id}));
        let register = self.recv_client_json().await?;
        self.send_json(serde_json::json!({"status": "registered"}));
        Some(register)
    }

    /// Simulate the upstream connection dying.
    pub fn disconnect(self) {
        drop(self);
    }
}

/// A [`Transport`] backed by in-process channels. Each call to `connect`
/// creates a fresh client/server channel pair and hands the server half to
/// `servers` — tests drive the fake CM server from there, including across
/// reconnects (spec.md §4.7 "Reconnect loop": each attempt repeats the full
/// handshake over a fresh transport).
pub struct InMemoryTransport {
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl InMemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { servers: tx }, rx)
    }
}

impl Transport for InMemoryTransport {
    type Read = FakeRead;
    type Write = FakeWrite;

    async fn connect(&self) -> Result<(Self::Read, Self::Write)> {
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();

        let server = FakeServer { to_client: to_client_tx, from_client: Mutex::new(from_client_rx) };
        self.servers.send(server).map_err(|_| transport_err("no test harness listening"))?;

        Ok((FakeRead { rx: to_client_rx }, FakeWrite { tx: from_client_tx }))
    }
}

pub struct FakeRead {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl TransportRead for FakeRead {
    async fn read(&mut self) -> Result<Frame> {
        self.rx.recv().await.ok_or_else(|| transport_err("fake server disconnected"))
    }

    fn set_read_deadline(&mut self, _window: Duration) {}
}

pub struct FakeWrite {
    tx: mpsc::UnboundedSender<String>,
}

impl TransportWrite for FakeWrite {
    async fn write_text(&mut self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| transport_err("fake server disconnected"))
    }

    async fn write_ping(&mut self) -> Result<()> {
        self.tx
            .send(PING_SENTINEL.to_owned())
            .map_err(|_| transport_err("fake server disconnected"))
    }

    async fn write_pong(&mut self) -> Result<()> {
        self.tx
            .send(PONG_SENTINEL.to_owned())
            .map_err(|_| transport_err("fake server disconnected"))
    }

    async fn close(&mut self) {}
}
