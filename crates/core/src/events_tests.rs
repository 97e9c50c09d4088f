use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tokio::sync::Mutex;

use super::*;
use crate::registry::CallRegistry;

#[derive(Default)]
struct RecordingHandler {
    claim: AtomicBool,
    calls: Mutex<Vec<String>>,
    last_digits: Mutex<Option<String>>,
}

impl RecordingHandler {
    fn claiming() -> Self {
        Self { claim: AtomicBool::new(true), ..Default::default() }
    }

    async fn log(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

impl EventHandler for RecordingHandler {
    async fn on_call_incoming(&self, _call: &CallRecord) -> bool {
        self.calls.lock().await.push("incoming".to_owned());
        self.claim.load(Ordering::SeqCst)
    }

    async fn on_call_ringing(&self, _call: &CallRecord) {
        self.calls.lock().await.push("ringing".to_owned());
    }

    async fn on_call_answered(&self, _call: &CallRecord) {
        self.calls.lock().await.push("answered".to_owned());
    }

    async fn on_bridge_start(&self, _call: &CallRecord) {
        self.calls.lock().await.push("bridge_start".to_owned());
    }

    async fn on_bridge_end(&self, _call: &CallRecord) {
        self.calls.lock().await.push("bridge_end".to_owned());
    }

    async fn on_hangup(&self, _call: &CallRecord) {
        self.calls.lock().await.push("hangup".to_owned());
    }

    async fn on_dtmf(&self, _call: &CallRecord, digits: &str) {
        self.calls.lock().await.push("dtmf".to_owned());
        *self.last_digits.lock().await = Some(digits.to_owned());
    }
}

#[tokio::test]
async fn call_incoming_claimed_creates_inbound_record_and_retains_it() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::claiming();

    dispatch(
        &registry,
        &handler,
        json!({"event": "call_incoming", "callid": "C1", "from": "+1", "to": "+2"}),
    )
    .await;

    let record = registry.get_by_call_id("C1").await.unwrap();
    assert_eq!(record.direction, CallDirection::Inbound);
    assert_eq!(record.state, CallState::Incoming);
    assert_eq!(record.from, "+1");
    assert_eq!(handler.log().await, vec!["incoming"]);
}

#[tokio::test]
async fn call_incoming_declined_removes_record() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::default(); // claim = false

    dispatch(&registry, &handler, json!({"event": "call_incoming", "callid": "C2"})).await;

    assert!(registry.get_by_call_id("C2").await.is_none());
}

#[tokio::test]
async fn call_hangup_removes_record_before_handler_observes_it_in_registry() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::claiming();

    dispatch(&registry, &handler, json!({"event": "call_incoming", "callid": "C3"})).await;
    dispatch(&registry, &handler, json!({"event": "call_hangup", "callid": "C3"})).await;

    assert!(registry.get_by_call_id("C3").await.is_none());
    assert_eq!(handler.log().await, vec!["incoming", "hangup"]);
}

#[tokio::test]
async fn call_hangup_for_unknown_call_is_noop_and_does_not_invoke_handler() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::claiming();

    dispatch(&registry, &handler, json!({"event": "call_hangup", "callid": "ghost"})).await;

    assert!(handler.log().await.is_empty());
}

#[tokio::test]
async fn dtmf_received_leaves_state_unchanged_and_passes_digits() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::claiming();

    dispatch(&registry, &handler, json!({"event": "call_incoming", "callid": "C4"})).await;
    dispatch(
        &registry,
        &handler,
        json!({"event": "call_answered", "callid": "C4"}),
    )
    .await;
    dispatch(
        &registry,
        &handler,
        json!({"event": "dtmf_received", "callid": "C4", "digits": "5"}),
    )
    .await;

    let record = registry.get_by_call_id("C4").await.unwrap();
    assert_eq!(record.state, CallState::Answered); // unchanged by the dtmf event
    assert_eq!(*handler.last_digits.lock().await, Some("5".to_owned()));
}

#[tokio::test]
async fn malformed_event_is_dropped_silently() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::claiming();

    dispatch(&registry, &handler, json!({"event": "not_a_real_event", "callid": "C5"})).await;
    dispatch(&registry, &handler, json!({"event": "call_ringing"})).await; // missing callid

    assert!(handler.log().await.is_empty());
    assert!(registry.get_by_call_id("C5").await.is_none());
}

#[tokio::test]
async fn happy_path_handler_order_matches_event_sequence() {
    let registry = CallRegistry::new();
    let handler = RecordingHandler::claiming();

    for event in [
        json!({"event": "call_answered", "callid": "C1"}),
        json!({"event": "agora_bridge_start", "callid": "C1"}),
        json!({"event": "dtmf_received", "callid": "C1", "digits": "5"}),
        json!({"event": "call_hangup", "callid": "C1"}),
    ] {
        dispatch(&registry, &handler, event).await;
    }

    assert_eq!(handler.log().await, vec!["answered", "bridge_start", "dtmf", "hangup"]);
    assert!(registry.get_by_call_id("C1").await.is_none());
}
