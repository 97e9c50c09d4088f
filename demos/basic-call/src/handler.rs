//! Event sink for the demo CLI.
//!
//! Logs every lifecycle callback and, in `listen` mode, auto-accepts inbound
//! calls from a spawned task — calling `accept` directly from
//! `on_call_incoming` would stall the read loop for the duration of that
//! command (spec.md §9 "Handler reentrancy").

use std::sync::{Arc, Weak};

use cm_client::{AcceptParams, CallRecord, Client, ClientError, EventHandler};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::transport::WsTransport;

/// Accept parameters applied to every inbound call when running `listen`.
#[derive(Clone)]
pub struct AutoAccept {
    pub channel: String,
    pub uid: String,
    pub token: String,
}

pub struct DemoHandler {
    // Set once `Client::connect` returns — the handler can't hold this at
    // construction time since the client doesn't exist yet.
    client: OnceCell<Weak<Client<WsTransport, DemoHandler>>>,
    auto_accept: Option<AutoAccept>,
    /// Cancelled once a call this process is following hangs up, so `main`
    /// knows it's safe to close and exit.
    pub done: CancellationToken,
}

impl DemoHandler {
    pub fn new(auto_accept: Option<AutoAccept>) -> Self {
        Self { client: OnceCell::new(), auto_accept, done: CancellationToken::new() }
    }

    pub fn bind(&self, client: &Arc<Client<WsTransport, DemoHandler>>) {
        let _ = self.client.set(Arc::downgrade(client));
    }

    fn client(&self) -> Option<Arc<Client<WsTransport, DemoHandler>>> {
        self.client.get()?.upgrade()
    }
}

impl EventHandler for DemoHandler {
    async fn on_connected(&self, session_id: &str) {
        info!(session_id, "connected to call manager");
    }

    async fn on_disconnected(&self, err: &ClientError) {
        warn!(%err, "disconnected from call manager");
    }

    async fn on_call_incoming(&self, call: &CallRecord) -> bool {
        info!(call_id = %call.call_id, from = %call.from, to = %call.to, "inbound call");

        let Some(accept) = self.auto_accept.clone() else {
            info!(call_id = %call.call_id, "not in listen mode, ignoring");
            return false;
        };
        let Some(client) = self.client() else { return false };
        let call_id = call.call_id.clone();

        tokio::spawn(async move {
            let params = AcceptParams {
                call_id,
                channel: accept.channel,
                uid: accept.uid,
                token: accept.token,
                appid: None,
            };
            if let Err(e) = client.accept(params, &CancellationToken::new()).await {
                warn!(%e, "accept failed");
            }
        });
        true
    }

    async fn on_call_ringing(&self, call: &CallRecord) {
        info!(call_id = %call.call_id, "ringing");
    }

    async fn on_call_answered(&self, call: &CallRecord) {
        info!(call_id = %call.call_id, "answered");
    }

    async fn on_bridge_start(&self, call: &CallRecord) {
        info!(call_id = %call.call_id, channel = %call.channel, "bridged into Agora channel");
    }

    async fn on_bridge_end(&self, call: &CallRecord) {
        info!(call_id = %call.call_id, "unbridged");
    }

    async fn on_hangup(&self, call: &CallRecord) {
        info!(call_id = %call.call_id, "hangup");
        self.done.cancel();
    }

    async fn on_dtmf(&self, call: &CallRecord, digits: &str) {
        info!(call_id = %call.call_id, digits, "dtmf received");
    }
}
