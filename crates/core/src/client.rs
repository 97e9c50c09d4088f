//! Public client type tying the eight components together (spec §2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::handler::{guarded, EventHandler};
use crate::pending::{await_reply, PendingTable, ReplyFrame};
use crate::registry::CallRegistry;
use crate::transport::{Transport, TransportRead, TransportWrite, WriteHalf};

/// A connected (or reconnecting) session against a CM server.
///
/// Generic over the concrete [`Transport`] and the application's
/// [`EventHandler`] rather than boxed trait objects, so both can use plain
/// `async fn` without `async-trait`. Cloning is via `Arc<Client<T, H>>` —
/// construct with [`Client::connect`], which hands back an `Arc` already.
pub struct Client<T: Transport, H: EventHandler> {
    pub(crate) config: ClientConfig,
    pub(crate) transport: T,
    pub(crate) handler: Arc<H>,
    pub(crate) registry: CallRegistry,
    pub(crate) pending: PendingTable,
    pub(crate) request_ids: crate::pending::RequestIdGen,
    pub(crate) write: RwLock<Option<Arc<WriteHalf<T::Write>>>>,
    pub(crate) connected: AtomicBool,
    pub(crate) session_id: RwLock<Option<String>>,
    pub(crate) subscribed: RwLock<Vec<String>>,
    pub(crate) done: CancellationToken,
    /// Abort handle for the currently live `ping_loop` task, so a reconnect
    /// can kill the previous one before spawning its replacement instead of
    /// relying solely on the old loop noticing a disconnect on its own next
    /// tick (spec §8 "one ping every 5 seconds").
    pub(crate) ping_task: Mutex<Option<AbortHandle>>,
}

impl<T: Transport, H: EventHandler> Client<T, H> {
    /// Connect and run the handshake to completion, then start the read and
    /// ping loops in the background (spec §4.7).
    pub async fn connect(config: ClientConfig, transport: T, handler: H) -> Result<Arc<Self>> {
        let subscribed = config.subscribe_numbers.clone();
        let client = Arc::new(Self {
            config,
            transport,
            handler: Arc::new(handler),
            registry: CallRegistry::new(),
            pending: PendingTable::new(),
            request_ids: crate::pending::RequestIdGen::new(),
            write: RwLock::new(None),
            connected: AtomicBool::new(false),
            session_id: RwLock::new(None),
            subscribed: RwLock::new(subscribed),
            done: CancellationToken::new(),
            ping_task: Mutex::new(None),
        });

        let (read, write, session_id) = client.handshake().await?;
        client.connected.store(true, Ordering::SeqCst);
        *client.write.write().await = Some(Arc::new(WriteHalf::new(write)));
        *client.session_id.write().await = Some(session_id.clone());

        guarded("on_connected", client.handler.on_connected(&session_id), ()).await;

        tokio::spawn(Arc::clone(&client).read_loop(read));
        client.spawn_ping_loop();

        Ok(client)
    }

    /// Abort the previous `ping_loop` task, if any, and spawn its
    /// replacement — called on initial connect and on every successful
    /// reconnect so at most one ping loop is ever live (spec §8).
    pub(crate) fn spawn_ping_loop(self: &Arc<Self>) {
        let handle = tokio::spawn(Arc::clone(self).ping_loop());
        let mut slot = self.ping_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle.abort_handle()) {
            previous.abort();
        }
    }

    /// Whether the client currently believes it has a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The session id from the most recent successful handshake, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// The event handler supplied to [`Client::connect`]. Exposed so a
    /// handler that needs a back-reference to the client (e.g. to spawn
    /// `accept` from `on_call_incoming`) can be wired up after `connect`
    /// returns (spec §9 "Handler reentrancy").
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Close the session (spec §4.7 "Close"). Idempotent: repeated calls
    /// after the first are no-ops save for re-running already-harmless
    /// cleanup (cancelling an already-cancelled token, sweeping an empty
    /// pending table, closing an already-closed transport).
    pub async fn close(&self) {
        self.done.cancel();
        self.connected.store(false, Ordering::SeqCst);
        self.pending.sweep();
        if let Some(write) = self.current_write().await {
            write.close().await;
        }
    }

    pub(crate) async fn current_write(&self) -> Option<Arc<WriteHalf<T::Write>>> {
        self.write.read().await.clone()
    }

    /// Build a command frame, install a pending slot, write, and await the
    /// reply — the shared shape of every Command Surface operation (spec
    /// §4.3 steps 1-5).
    pub(crate) async fn issue(
        &self,
        action: &str,
        mut frame: Value,
        cancel: &CancellationToken,
    ) -> Result<ReplyFrame> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let request_id = self.request_ids.next(action);
        frame["action"] = json!(action);
        frame["request_id"] = json!(request_id);

        let rx = self.pending.install(&request_id);

        let write = match self.current_write().await {
            Some(write) => write,
            None => {
                self.pending.remove(&request_id);
                return Err(ClientError::NotConnected);
            }
        };

        if let Err(err) = write.write_text(frame.to_string()).await {
            self.pending.remove(&request_id);
            return Err(err);
        }

        await_reply(&self.pending, &request_id, rx, cancel, self.config.command_timeout).await
    }

    /// First transition from connected to disconnected wins and drives the
    /// sweep/callback/reconnect sequence; a losing concurrent caller (the
    /// read loop and the ping loop can both observe the same broken
    /// transport) returns immediately (spec §4.7 "Connection-lost sweep").
    pub(crate) async fn handle_disconnect(self: &Arc<Self>, err: ClientError) {
        if self
            .connected
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        tracing::debug!(err = %err, "connection lost, sweeping pending commands");
        self.pending.sweep();
        guarded("on_disconnected", self.handler.on_disconnected(&err), ()).await;

        if self.done.is_cancelled() {
            return;
        }

        tokio::spawn(Arc::clone(self).reconnect_loop());
    }
}
