//! Event Dispatcher and Call State Machine (spec §4.5).
//!
//! Mirrors the teacher's tagged-enum wire event type (`MuxEvent`): one
//! internally-tagged variant per event name, dispatched by the read loop
//! after a frame fails to resolve against the pending table.

use serde::Deserialize;
use serde_json::Value;

use crate::handler::{guarded, EventHandler};
use crate::registry::{CallDirection, CallRegistry, CallState, EventFieldMerge};

#[derive(Debug, Clone, Deserialize)]
pub struct EventFields {
    pub callid: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub appid: Option<String>,
    #[serde(default)]
    pub digits: Option<String>,
}

/// One wire event, tagged by its top-level `event` field (spec §4.5, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireEvent {
    CallIncoming(EventFields),
    CallRinging(EventFields),
    CallAnswered(EventFields),
    AgoraBridgeStart(EventFields),
    AgoraBridgeEnd(EventFields),
    CallHangup(EventFields),
    DtmfReceived(EventFields),
}

impl WireEvent {
    fn fields(&self) -> &EventFields {
        match self {
            WireEvent::CallIncoming(f)
            | WireEvent::CallRinging(f)
            | WireEvent::CallAnswered(f)
            | WireEvent::AgoraBridgeStart(f)
            | WireEvent::AgoraBridgeEnd(f)
            | WireEvent::CallHangup(f)
            | WireEvent::DtmfReceived(f) => f,
        }
    }

    /// The state a successful dispatch transitions the record to, per the
    /// spec §4.5 table. `dtmf_received` leaves state unchanged.
    fn terminal_state(&self) -> Option<CallState> {
        match self {
            WireEvent::CallIncoming(_) => Some(CallState::Incoming),
            WireEvent::CallRinging(_) => Some(CallState::Ringing),
            WireEvent::CallAnswered(_) => Some(CallState::Answered),
            WireEvent::AgoraBridgeStart(_) => Some(CallState::Bridged),
            WireEvent::AgoraBridgeEnd(_) => Some(CallState::Unbridged),
            WireEvent::CallHangup(_) => Some(CallState::Hangup),
            WireEvent::DtmfReceived(_) => None,
        }
    }
}

fn parse_direction(raw: &str) -> Option<CallDirection> {
    match raw {
        "outbound" => Some(CallDirection::Outbound),
        "inbound" => Some(CallDirection::Inbound),
        "outbound_sip" => Some(CallDirection::OutboundSip),
        _ => None,
    }
}

/// Whether `call_id` (or its `channel:uid` composite, if carried on the
/// frame) already addresses a record, without creating one.
async fn is_known(
    registry: &CallRegistry,
    call_id: &str,
    channel: Option<&str>,
    uid: Option<&str>,
) -> bool {
    if registry.get_by_call_id(call_id).await.is_some() {
        return true;
    }
    match (channel, uid) {
        (Some(channel), Some(uid)) => registry.get_by_composite(channel, uid).await.is_some(),
        _ => false,
    }
}

/// Parse one inbound frame as a wire event and dispatch it to the registry
/// and handler. Frames that are not one of the seven known event shapes, or
/// that are missing `callid`, are dropped silently (spec §7: "event parse
/// failures are silently dropped").
pub async fn dispatch<H: EventHandler>(registry: &CallRegistry, handler: &H, value: Value) {
    let event: WireEvent = match serde_json::from_value(value) {
        Ok(event) => event,
        Err(_) => return,
    };

    let fields = event.fields().clone();
    let call_id = fields.callid.clone();

    // A `call_hangup` for a call the registry has never heard of is a true
    // no-op (spec §8): it must not create a phantom record, merge fields
    // into it, or fire `on_hangup`. Every other event is fine to
    // create-or-update, since the registry is the only source of truth for
    // "does this call exist yet."
    if matches!(&event, WireEvent::CallHangup(_))
        && !is_known(registry, &call_id, fields.channel.as_deref(), fields.uid.as_deref()).await
    {
        return;
    }

    registry.upsert_for_event(&call_id, fields.channel.as_deref(), fields.uid.as_deref()).await;

    let direction = if matches!(&event, WireEvent::CallIncoming(_)) {
        Some(CallDirection::Inbound)
    } else {
        fields.direction.as_deref().and_then(parse_direction)
    };

    let merge = EventFieldMerge {
        state: event.terminal_state(),
        from: fields.from.clone(),
        to: fields.to.clone(),
        direction,
        appid: fields.appid.clone(),
        channel: fields.channel.clone(),
        uid: fields.uid.clone(),
    };

    let record = match registry.apply_event_fields(&call_id, merge).await {
        Some(record) => record,
        None => return,
    };

    // Removed before the handler fires: no handler ever observes a durable
    // `hangup` entry (spec §8: "registry never contains an entry in state
    // hangup").
    if matches!(&event, WireEvent::CallHangup(_)) {
        registry.remove_terminal(&call_id).await;
    }

    match event {
        WireEvent::CallIncoming(_) => {
            let claimed =
                guarded("on_call_incoming", handler.on_call_incoming(&record), false).await;
            if !claimed {
                registry.remove_unclaimed(&call_id).await;
            }
        }
        WireEvent::CallRinging(_) => {
            guarded("on_call_ringing", handler.on_call_ringing(&record), ()).await
        }
        WireEvent::CallAnswered(_) => {
            guarded("on_call_answered", handler.on_call_answered(&record), ()).await
        }
        WireEvent::AgoraBridgeStart(_) => {
            guarded("on_bridge_start", handler.on_bridge_start(&record), ()).await
        }
        WireEvent::AgoraBridgeEnd(_) => {
            guarded("on_bridge_end", handler.on_bridge_end(&record), ()).await
        }
        WireEvent::CallHangup(_) => guarded("on_hangup", handler.on_hangup(&record), ()).await,
        WireEvent::DtmfReceived(_) => {
            if let Some(digits) = &fields.digits {
                guarded("on_dtmf", handler.on_dtmf(&record, digits), ()).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
