//! Connection Manager (spec §4.7): handshake, keepalive, read loop, and
//! reconnect with exponential backoff.
//!
//! Grounded in the teacher's `upstream/bridge.rs::run_loop` (reconnect with
//! capped exponential backoff, full re-handshake per attempt, orphaned state
//! carried across reconnects) and `upstream/health.rs::spawn_health_checker`
//! (`tokio::time::interval` with `MissedTickBehavior::Skip` driving a
//! periodic background task).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::events;
use crate::handler::{guarded, EventHandler};
use crate::pending::ReplyFrame;
use crate::transport::{Frame, Transport, TransportRead, TransportWrite, WriteHalf};

/// Rolling read deadline, reset on every inbound control frame. Not spec'd
/// as an injectable knob (spec §8 only names the timeout/backoff/ping
/// trio), so this stays a plain constant.
const READ_DEADLINE_WINDOW: Duration = Duration::from_secs(10);

/// Read one complete JSON frame off `read`, skipping control frames —
/// the handshake has no pending write half wired up yet to answer them with
/// a pong, and a ping/pong this early is not meaningful.
async fn read_handshake_frame<R: TransportRead>(read: &mut R) -> Result<Value> {
    loop {
        match read.read().await? {
            Frame::Text(text) => {
                return serde_json::from_str(&text)
                    .map_err(|e| ClientError::Handshake(format!("malformed frame: {e}")));
            }
            Frame::Ping | Frame::Pong => continue,
        }
    }
}

impl<T: Transport, H: EventHandler> Client<T, H> {
    /// Run the handshake to completion over a freshly dialed transport (spec
    /// §4.7, steps 1-4): server-hello, then registration, then the
    /// registration reply. Any deviation is a fatal handshake failure for
    /// this attempt.
    pub(crate) async fn handshake(&self) -> Result<(T::Read, T::Write, String)> {
        let (mut read, mut write) = self.transport.connect().await?;

        let hello = read_handshake_frame(&mut read).await?;
        if hello.get("status").and_then(Value::as_str) != Some("connected") {
            return Err(ClientError::Handshake(format!(
                "expected server-hello with status \"connected\", got {hello}"
            )));
        }
        let session_id = hello
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Handshake("server-hello missing session_id".into()))?
            .to_owned();
        tracing::debug!(session_id = %session_id, "received server-hello");

        let subscribe_numbers = self.subscribed.read().await.clone();
        let mut register = json!({
            "action": "register",
            "auth_token": self.config.auth_token,
            "client_id": self.config.client_id,
            "appid": self.config.appid,
        });
        if !subscribe_numbers.is_empty() {
            register["subscribe_numbers"] = json!(subscribe_numbers);
        }
        write.write_text(register.to_string()).await?;

        let reply = read_handshake_frame(&mut read).await?;
        if reply.get("error").is_some()
            || reply.get("status").and_then(Value::as_str) != Some("registered")
        {
            return Err(ClientError::Handshake(format!("registration refused: {reply}")));
        }

        tracing::debug!(session_id = %session_id, "registered with call manager");
        Ok((read, write, session_id))
    }

    /// Reads frames until the transport errors (spec §4.7 "Read loop").
    /// Tagged frames resolve a pending command; untagged frames are events.
    /// Unparseable frames are silently skipped (spec §7).
    pub(crate) async fn read_loop(self: Arc<Self>, mut read: T::Read) {
        loop {
            match read.read().await {
                Ok(Frame::Text(text)) => {
                    let value: Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(_) => continue,
                    };
                    self.route_frame(value).await;
                }
                Ok(Frame::Ping) => {
                    read.set_read_deadline(READ_DEADLINE_WINDOW);
                    if let Some(write) = self.current_write().await {
                        if write.write_pong().await.is_err() {
                            self.handle_disconnect(ClientError::Transport(
                                "pong write failed".into(),
                            ))
                            .await;
                            return;
                        }
                    }
                }
                Ok(Frame::Pong) => {
                    read.set_read_deadline(READ_DEADLINE_WINDOW);
                }
                Err(err) => {
                    tracing::debug!(err = %err, "read loop ending");
                    self.handle_disconnect(err).await;
                    return;
                }
            }
        }
    }

    /// Dispatch one parsed frame: deliver it to the pending table if it
    /// carries a `request_id`, otherwise hand it to the event dispatcher
    /// (spec §4.3 "Frames lacking `request_id` are events").
    async fn route_frame(&self, value: Value) {
        let request_id = value.get("request_id").and_then(Value::as_str).map(str::to_owned);

        let Some(request_id) = request_id else {
            events::dispatch(&self.registry, self.handler.as_ref(), value).await;
            return;
        };

        let reply = ReplyFrame {
            data: value.get("data").cloned(),
            error: value.get("error").and_then(Value::as_str).map(str::to_owned),
        };
        self.pending.deliver(&request_id, reply);
    }

    /// Ping every [`crate::ClientConfig::ping_interval`] while connected
    /// (spec §4.7 "Keepalive").
    ///
    /// Terminates the first time it observes a disconnect rather than
    /// idling through it — `reconnect_loop` spawns a fresh `ping_loop` on
    /// every successful reconnect, so a ping loop that lingered across a
    /// disconnect/reconnect cycle would leave two (and after N cycles, N)
    /// ping loops ticking concurrently, breaking the one-ping-per-5s cadence
    /// (spec §8).
    pub(crate) async fn ping_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.done.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if !self.is_connected() {
                return;
            }

            let Some(write) = self.current_write().await else { return };
            if write.write_ping().await.is_err() {
                self.handle_disconnect(ClientError::Transport("ping write failed".into())).await;
                return;
            }
        }
    }

    /// Reconnect with exponential backoff after a disconnect (spec §4.7
    /// "Reconnect loop"). Call records survive in the registry; pending
    /// command slots do not (already swept by [`Client::handle_disconnect`]).
    pub(crate) async fn reconnect_loop(self: Arc<Self>) {
        let mut backoff = self.config.initial_backoff;

        loop {
            if self.done.is_cancelled() {
                return;
            }

            match self.handshake().await {
                Ok((read, write, session_id)) => {
                    *self.write.write().await = Some(Arc::new(WriteHalf::new(write)));
                    *self.session_id.write().await = Some(session_id.clone());
                    self.connected.store(true, Ordering::SeqCst);

                    tracing::debug!(session_id = %session_id, "reconnected");
                    guarded("on_connected", self.handler.on_connected(&session_id), ()).await;

                    tokio::spawn(Arc::clone(&self).read_loop(read));
                    self.spawn_ping_loop();
                    return;
                }
                Err(err) => {
                    tracing::warn!(err = %err, backoff_secs = backoff.as_secs(), "reconnect attempt failed");
                    guarded("on_disconnected", self.handler.on_disconnected(&err), ()).await;
                }
            }

            tokio::select! {
                _ = self.done.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }
}
