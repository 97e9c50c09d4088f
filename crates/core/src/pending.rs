//! Pending Table and request correlation (spec §4.3).
//!
//! Grounded in the teacher's `HashMap<String, PendingRequest>` correlation
//! map (`upstream/bridge.rs`) and in the `Mutex<HashMap<String,
//! oneshot::Sender<Response>>>` + `tokio::time::timeout` pattern used by
//! SIP-client request/response correlation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Default upper bound on server responsiveness for any issued command
/// (spec §4.3). [`crate::ClientConfig::command_timeout`] is the injectable
/// knob callers (and tests) actually use; this is only its default value.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed server reply frame, handed to the waiting issuer.
#[derive(Debug, Clone)]
pub struct ReplyFrame {
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Generates request ids unique per client session, formed as
/// `<action>_<monotonic-counter>` (spec §4.3). The counter starts at 1.
#[derive(Debug, Default)]
pub struct RequestIdGen {
    counter: AtomicU64,
}

impl RequestIdGen {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0) }
    }

    pub fn next(&self, action: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{action}_{n}")
    }
}

/// Single-use delivery slot indexed by request id.
///
/// Installed by a command issuer before the write; resolved by a matching
/// reply, a local timeout, the caller's cancellation, or a connection-lost
/// sweep delivering `None` (spec §3).
pub struct PendingTable {
    slots: Mutex<HashMap<String, oneshot::Sender<Option<ReplyFrame>>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// Install a slot for `request_id`, returning the receiver half.
    ///
    /// Must be called, and the frame written, before the caller awaits the
    /// receiver — the read loop may deliver a reply before `install`
    /// returns control to the caller otherwise racing against a write that
    /// hasn't happened yet. Callers follow the sequence: install, write,
    /// await.
    pub fn install(&self, request_id: &str) -> oneshot::Receiver<Option<ReplyFrame>> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).insert(request_id.to_owned(), tx);
        rx
    }

    /// Remove a slot without resolving it (write failed, timeout, or
    /// cancellation already consumed the receiver).
    pub fn remove(&self, request_id: &str) {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).remove(request_id);
    }

    /// Deliver a reply to the slot for `request_id`, if still installed.
    /// Removes the slot at the moment of delivery (spec §8: "every reply
    /// delivered ... is removed ... at the moment of delivery").
    ///
    /// Returns `true` if a waiting slot received the reply.
    pub fn deliver(&self, request_id: &str, reply: ReplyFrame) -> bool {
        let sender = self.slots.lock().unwrap_or_else(|e| e.into_inner()).remove(request_id);
        match sender {
            Some(tx) => tx.send(Some(reply)).is_ok(),
            None => false,
        }
    }

    /// Connection-lost sweep: drain every outstanding entry, resolving each
    /// with the null sentinel so awaiting commands return `connection-lost`
    /// deterministically (spec §4.7, §8).
    pub fn sweep(&self) {
        let drained: Vec<_> =
            self.slots.lock().unwrap_or_else(|e| e.into_inner()).drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(None);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait on an installed slot with the three terminations spec'd in §4.3:
/// a resolution arrives, the caller's cancellation fires, or `timeout`
/// elapses. `timeout` is the upper bound regardless of caller cancellation
/// having a shorter effective deadline — callers pass
/// [`crate::ClientConfig::command_timeout`] (30s by default, injectable so
/// tests don't have to wait out the real default).
pub async fn await_reply(
    table: &PendingTable,
    request_id: &str,
    rx: oneshot::Receiver<Option<ReplyFrame>>,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<ReplyFrame> {
    tokio::select! {
        result = rx => {
            match result {
                Ok(Some(reply)) => Ok(reply),
                Ok(None) => Err(ClientError::ConnectionLost),
                Err(_) => {
                    // Sender dropped without sending — treat as connection lost.
                    table.remove(request_id);
                    Err(ClientError::ConnectionLost)
                }
            }
        }
        _ = cancel.cancelled() => {
            table.remove(request_id);
            Err(ClientError::Cancelled)
        }
        _ = tokio::time::sleep(timeout) => {
            table.remove(request_id);
            Err(ClientError::Timeout)
        }
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
