//! Call Registry (spec §3, §4.4).
//!
//! Keyed by both a durable call id and a provisional `channel:uid` composite
//! key, with the dual-keying rules spec'd in §4.4 and §9 ("Dual keying of
//! the registry"). Guarded by a single reader-writer lock, grounded in the
//! teacher's `RwLock<HashMap<ClientId, ClientSlot>>` client table
//! (`upstream/bridge.rs`) and `RwLock<HashMap<String, Arc<SessionEntry>>>`
//! session table (`state.rs`) — generalized here to the dual-key shape this
//! protocol needs.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Lifecycle state of a call (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallState {
    Incoming,
    Ringing,
    Answered,
    Bridged,
    Unbridged,
    Hangup,
}

/// Who originated the call. Set at record creation, never changes (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallDirection {
    Outbound,
    Inbound,
    OutboundSip,
}

/// A call record (spec §3). Registry accessors hand out clones — callers
/// never hold a reference into the locked map.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: String,
    pub state: CallState,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
    pub channel: String,
    pub uid: String,
    pub appid: Option<String>,
}

impl CallRecord {
    fn provisional(channel: &str, uid: &str, appid: Option<String>) -> Self {
        Self {
            call_id: String::new(),
            state: CallState::Ringing,
            direction: CallDirection::Outbound,
            from: String::new(),
            to: String::new(),
            channel: channel.to_owned(),
            uid: uid.to_owned(),
            appid,
        }
    }
}

fn composite_key(channel: &str, uid: &str) -> String {
    format!("{channel}:{uid}")
}

/// An entry in the durable-id table: the record plus the composite alias
/// key currently pointing at it, if any (so terminal removal can drop both
/// keys in one pass without scanning).
struct Entry {
    record: CallRecord,
    alias: Option<String>,
}

struct RegistryState {
    /// Outbound dials awaiting their call id, keyed by `channel:uid`.
    provisional: HashMap<String, CallRecord>,
    /// Calls addressable by their durable call id.
    by_id: HashMap<String, Entry>,
    /// `channel:uid` -> call id, populated once a composite key is attached
    /// to an already-durable record (e.g. by `accept`).
    aliases: HashMap<String, String>,
}

/// The call registry (spec §4.4). One reader-writer lock guards all three
/// internal maps together so a lookup during event dispatch always sees a
/// consistent view across the provisional/durable/alias tables.
pub struct CallRegistry {
    state: RwLock<RegistryState>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                provisional: HashMap::new(),
                by_id: HashMap::new(),
                aliases: HashMap::new(),
            }),
        }
    }

    /// Insert a provisional outbound-dial entry, keyed by `channel:uid`
    /// (spec §4.4 "Insert provisional").
    pub async fn insert_provisional(
        &self,
        channel: &str,
        uid: &str,
        appid: Option<String>,
    ) -> CallRecord {
        let record = CallRecord::provisional(channel, uid, appid);
        let mut state = self.state.write().await;
        state.provisional.insert(composite_key(channel, uid), record.clone());
        record
    }

    /// Promote a provisional entry to its durable call id once the dial
    /// reply names one (spec §4.4 "Promote to durable key"). Returns the
    /// promoted record, or `None` if the provisional entry was already
    /// removed (a race with failure cleanup).
    pub async fn promote(&self, channel: &str, uid: &str, call_id: &str) -> Option<CallRecord> {
        let mut state = self.state.write().await;
        let mut record = state.provisional.remove(&composite_key(channel, uid))?;
        record.call_id = call_id.to_owned();
        state.by_id.insert(call_id.to_owned(), Entry { record: record.clone(), alias: None });
        Some(record)
    }

    /// Remove a provisional entry on dial failure or a reply missing a call
    /// id (spec §4.4 "Failure cleanup").
    pub async fn fail_cleanup(&self, channel: &str, uid: &str) {
        let mut state = self.state.write().await;
        state.provisional.remove(&composite_key(channel, uid));
    }

    /// Attach a composite `channel:uid` alias to an existing durable entry,
    /// and optionally stamp its `appid` — the effect of a successful
    /// `accept` (spec §4.6: "on success, record appid onto call"; see
    /// `DESIGN.md` for why `accept` also attaches the alias).
    pub async fn attach_alias_and_appid(
        &self,
        call_id: &str,
        channel: &str,
        uid: &str,
        appid: Option<String>,
    ) -> Option<CallRecord> {
        let mut state = self.state.write().await;
        let entry = state.by_id.get_mut(call_id)?;
        entry.record.channel = channel.to_owned();
        entry.record.uid = uid.to_owned();
        if appid.is_some() {
            entry.record.appid = appid;
        }
        entry.alias = Some(composite_key(channel, uid));
        let record = entry.record.clone();
        state.aliases.insert(composite_key(channel, uid), call_id.to_owned());
        Some(record)
    }

    /// Look up a record by call id only.
    pub async fn get_by_call_id(&self, call_id: &str) -> Option<CallRecord> {
        let state = self.state.read().await;
        state.by_id.get(call_id).map(|e| e.record.clone())
    }

    /// Look up a record by its `channel:uid` composite, checking the
    /// provisional table first, then the alias table (spec §4.4 "Lookup
    /// during event dispatch": call id first, then the provisional
    /// composite key — callers needing that full order should try
    /// `get_by_call_id` first).
    pub async fn get_by_composite(&self, channel: &str, uid: &str) -> Option<CallRecord> {
        let key = composite_key(channel, uid);
        let state = self.state.read().await;
        if let Some(record) = state.provisional.get(&key) {
            return Some(record.clone());
        }
        let call_id = state.aliases.get(&key)?;
        state.by_id.get(call_id).map(|e| e.record.clone())
    }

    /// Event-driven lookup-or-insert (spec §4.4 "Event-driven insert" +
    /// "Lookup during event dispatch" + §9 "Pre-response events"):
    ///
    /// 1. If `call_id` names an existing durable entry, return it.
    /// 2. Else if `channel`+`uid` name an existing provisional entry,
    ///    promote it in place to `call_id` (handles the server racing a
    ///    `call_answered` ahead of the dial reply) and return it.
    /// 3. Else create a fresh entry under `call_id`.
    ///
    /// Returns the record as it exists *before* the caller's field merge —
    /// callers apply merged fields via [`Self::apply_event_fields`].
    pub async fn upsert_for_event(
        &self,
        call_id: &str,
        channel: Option<&str>,
        uid: Option<&str>,
    ) -> CallRecord {
        let mut state = self.state.write().await;

        if let Some(entry) = state.by_id.get(call_id) {
            return entry.record.clone();
        }

        if let (Some(channel), Some(uid)) = (channel, uid) {
            let key = composite_key(channel, uid);
            if let Some(mut record) = state.provisional.remove(&key) {
                record.call_id = call_id.to_owned();
                state
                    .by_id
                    .insert(call_id.to_owned(), Entry { record: record.clone(), alias: None });
                return record;
            }
        }

        let record = CallRecord {
            call_id: call_id.to_owned(),
            state: CallState::Incoming,
            direction: CallDirection::Inbound,
            from: String::new(),
            to: String::new(),
            channel: channel.unwrap_or_default().to_owned(),
            uid: uid.unwrap_or_default().to_owned(),
            appid: None,
        };
        state.by_id.insert(call_id.to_owned(), Entry { record: record.clone(), alias: None });
        record
    }

    /// Apply a field merge + state transition to an existing durable entry
    /// under the write lock (spec §4.5: "the dispatcher updates all
    /// non-empty fields ... before any handler fires").
    pub async fn apply_event_fields(
        &self,
        call_id: &str,
        fields: EventFieldMerge,
    ) -> Option<CallRecord> {
        let mut state = self.state.write().await;
        let entry = state.by_id.get_mut(call_id)?;
        fields.merge_into(&mut entry.record);
        Some(entry.record.clone())
    }

    /// Terminal removal (spec §4.4 "Terminal removal", §8 "registry never
    /// contains a `hangup` entry"): remove the durable entry and its alias
    /// key, if any, atomically. A call id not present is a no-op (spec §8
    /// "`call_hangup` for a call not in the registry is a no-op").
    pub async fn remove_terminal(&self, call_id: &str) -> Option<CallRecord> {
        let mut state = self.state.write().await;
        let entry = state.by_id.remove(call_id)?;
        if let Some(alias) = entry.alias {
            state.aliases.remove(&alias);
        }
        Some(entry.record)
    }

    /// Unclaimed incoming (spec §4.4 "Unclaimed incoming"): remove the
    /// durable entry created for a `call_incoming` whose handler declined
    /// it. Idempotent — a second removal for the same id is a no-op.
    pub async fn remove_unclaimed(&self, call_id: &str) -> Option<CallRecord> {
        self.remove_terminal(call_id).await
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-empty field overrides merged into a record before any handler fires
/// (spec §4.5 table: "Additional fields merged into record").
#[derive(Debug, Clone, Default)]
pub struct EventFieldMerge {
    pub state: Option<CallState>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<CallDirection>,
    pub appid: Option<String>,
    pub channel: Option<String>,
    pub uid: Option<String>,
}

impl EventFieldMerge {
    fn merge_into(self, record: &mut CallRecord) {
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(from) = self.from {
            if !from.is_empty() {
                record.from = from;
            }
        }
        if let Some(to) = self.to {
            if !to.is_empty() {
                record.to = to;
            }
        }
        if let Some(direction) = self.direction {
            record.direction = direction;
        }
        if self.appid.is_some() {
            record.appid = self.appid;
        }
        if let Some(channel) = self.channel {
            if !channel.is_empty() {
                record.channel = channel;
            }
        }
        if let Some(uid) = self.uid {
            if !uid.is_empty() {
                record.uid = uid;
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
