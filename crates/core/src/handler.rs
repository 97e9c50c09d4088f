//! Event sink supplied by the application (spec §2, §4.5, §9 "Handler
//! reentrancy").
//!
//! Callbacks run outside every internal lock, from the read loop, serially.
//! A handler that issues a blocking command (e.g. `accept` from
//! `on_call_incoming`) must spawn a task to do so — calling back in would
//! stall event delivery for the lifetime of that command (spec §9).

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::error::ClientError;
use crate::registry::CallRecord;

/// Runs a handler callback behind a panic barrier (spec §9 "Exception/panic
/// policy"): a panicking callback is logged and the caller gets `default`
/// back instead of the panic unwinding into the read loop or reconnect
/// loop and ending it. Callback failures otherwise never touch registry
/// state (spec §4.5).
pub(crate) async fn guarded<F, T>(what: &'static str, fut: F, default: T) -> T
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(callback = what, "event handler callback panicked; continuing");
            default
        }
    }
}

/// Application callbacks for connection lifecycle and call events.
///
/// Every method has a no-op default except [`Self::on_call_incoming`], whose
/// return value decides whether the call is claimed (spec §4.5 "Policy for
/// `call_incoming`").
pub trait EventHandler: Send + Sync + 'static {
    /// The handshake completed; `session_id` is the server-assigned id for
    /// this connection (spec §4.7).
    fn on_connected(&self, session_id: &str) -> impl Future<Output = ()> + Send {
        let _ = session_id;
        async {}
    }

    /// The connection was lost, or a reconnect attempt's handshake failed
    /// (spec §7 "the handler's error callback fires once" / "surfaced
    /// through the handler's error callback, then retried after backoff").
    fn on_disconnected(&self, err: &ClientError) -> impl Future<Output = ()> + Send {
        let _ = err;
        async {}
    }

    /// An inbound call arrived. Return `true` to claim it — the caller is
    /// then expected to invoke `accept` or `reject` asynchronously — or
    /// `false` to let the registry discard it immediately.
    fn on_call_incoming(&self, call: &CallRecord) -> impl Future<Output = bool> + Send;

    fn on_call_ringing(&self, call: &CallRecord) -> impl Future<Output = ()> + Send {
        let _ = call;
        async {}
    }

    fn on_call_answered(&self, call: &CallRecord) -> impl Future<Output = ()> + Send {
        let _ = call;
        async {}
    }

    fn on_bridge_start(&self, call: &CallRecord) -> impl Future<Output = ()> + Send {
        let _ = call;
        async {}
    }

    fn on_bridge_end(&self, call: &CallRecord) -> impl Future<Output = ()> + Send {
        let _ = call;
        async {}
    }

    /// Fires once per hangup, after the record has already been removed
    /// from the registry — `call` is the last snapshot before removal.
    fn on_hangup(&self, call: &CallRecord) -> impl Future<Output = ()> + Send {
        let _ = call;
        async {}
    }

    fn on_dtmf(&self, call: &CallRecord, digits: &str) -> impl Future<Output = ()> + Send {
        let _ = (call, digits);
        async {}
    }
}
