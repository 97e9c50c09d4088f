//! Command Surface (spec §4.6): the public call-control API.
//!
//! Every operation builds a command frame, lets [`Client::issue`] install the
//! pending slot, write it, and await the reply, then applies whatever
//! registry side effect the spec's §4.6 table names for that action.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::handler::EventHandler;
use crate::registry::CallDirection;
use crate::transport::Transport;

/// Parameters for [`Client::dial`].
#[derive(Debug, Clone)]
pub struct DialParams {
    pub from: String,
    pub to: String,
    pub channel: String,
    pub uid: String,
    pub token: String,
    /// Agora region hint, passed through verbatim if set.
    pub region: Option<String>,
    /// Required in MULTI mode (spec §4.6); ignored otherwise.
    pub appid: Option<String>,
}

/// Result of a `dial` command (spec §4.6 table: "reply carries `data.success`
/// and `data.callid`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialResult {
    pub success: bool,
    pub call_id: Option<String>,
}

/// Parameters for [`Client::accept`].
#[derive(Debug, Clone)]
pub struct AcceptParams {
    pub call_id: String,
    pub channel: String,
    pub uid: String,
    pub token: String,
    /// Required in MULTI mode; captured onto the call record on success.
    pub appid: Option<String>,
}

/// Parameters for [`Client::reject`].
#[derive(Debug, Clone)]
pub struct RejectParams {
    pub call_id: String,
    pub reason: Option<String>,
}

/// Parameters for [`Client::bridge`].
#[derive(Debug, Clone)]
pub struct BridgeParams {
    pub call_id: String,
    pub channel: String,
    pub uid: String,
}

/// Parameters for [`Client::unbridge`].
#[derive(Debug, Clone)]
pub struct UnbridgeParams {
    pub call_id: String,
}

/// Parameters for [`Client::hangup`].
#[derive(Debug, Clone)]
pub struct HangupParams {
    pub call_id: String,
}

/// Parameters for [`Client::transfer`].
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub call_id: String,
    pub target: String,
    /// Optional leg selector (spec §4.6 table: "optional `leg` field").
    pub leg: Option<String>,
}

/// Parameters for [`Client::send_dtmf`].
#[derive(Debug, Clone)]
pub struct SendDtmfParams {
    pub call_id: String,
    pub digits: String,
}

/// Parameters for [`Client::subscribe`].
#[derive(Debug, Clone)]
pub struct SubscribeParams {
    pub numbers: Vec<String>,
}

/// Turn a reply's `error` field into a [`ClientError::Command`], if present.
fn check_error(error: Option<String>) -> Result<()> {
    match error {
        Some(msg) => Err(ClientError::Command(msg)),
        None => Ok(()),
    }
}

impl<T: Transport, H: EventHandler> Client<T, H> {
    /// Look up the appid cached on a call record so later operations on that
    /// call (everything but `dial` and `accept`) can carry it in MULTI mode
    /// without the caller having to re-supply it (spec §4.6 "for later
    /// operations it is read from the call record's `appid` field").
    async fn cached_appid(&self, call_id: &str) -> Option<String> {
        if !self.config.is_multi_tenant() {
            return None;
        }
        self.registry.get_by_call_id(call_id).await.and_then(|r| r.appid)
    }

    /// Dial out (spec §4.6 `dial`). Pre-inserts a provisional registry entry
    /// keyed by `channel:uid` before writing the frame, promotes it to the
    /// durable call id on success, and removes it on any failure (spec §4.4
    /// "Insert provisional" / "Promote to durable key" / "Failure cleanup").
    pub async fn dial(
        &self,
        params: DialParams,
        cancel: &CancellationToken,
    ) -> Result<DialResult> {
        self.registry
            .insert_provisional(&params.channel, &params.uid, params.appid.clone())
            .await;

        let mut frame = json!({
            "from": params.from,
            "to": params.to,
            "channel": params.channel,
            "uid": params.uid,
            "token": params.token,
        });
        if let Some(region) = &params.region {
            frame["region"] = json!(region);
        }
        if self.config.is_multi_tenant() {
            if let Some(appid) = &params.appid {
                frame["appid"] = json!(appid);
            }
        }

        let reply = match self.issue("outbound", frame, cancel).await {
            Ok(reply) => reply,
            Err(err) => {
                self.registry.fail_cleanup(&params.channel, &params.uid).await;
                return Err(err);
            }
        };

        if let Some(msg) = reply.error {
            self.registry.fail_cleanup(&params.channel, &params.uid).await;
            return Err(ClientError::Command(msg));
        }

        let data = reply.data.unwrap_or(Value::Null);
        let success = data.get("success").and_then(Value::as_bool).unwrap_or(false);
        let call_id = data.get("callid").and_then(Value::as_str).map(str::to_owned);

        match (&success, &call_id) {
            (true, Some(call_id)) => {
                self.registry.promote(&params.channel, &params.uid, call_id).await;
            }
            _ => {
                self.registry.fail_cleanup(&params.channel, &params.uid).await;
            }
        }

        Ok(DialResult { success, call_id })
    }

    /// Accept an inbound call (spec §4.6 `accept`). On success, attaches the
    /// `channel:uid` alias and the appid onto the existing durable record
    /// (spec §4.6 "on success, record appid onto call").
    pub async fn accept(&self, params: AcceptParams, cancel: &CancellationToken) -> Result<()> {
        let mut frame = json!({
            "callid": params.call_id,
            "channel": params.channel,
            "uid": params.uid,
            "token": params.token,
        });
        if self.config.is_multi_tenant() {
            if let Some(appid) = &params.appid {
                frame["appid"] = json!(appid);
            }
        }

        let reply = self.issue("accept", frame, cancel).await?;
        check_error(reply.error)?;

        self.registry
            .attach_alias_and_appid(&params.call_id, &params.channel, &params.uid, params.appid)
            .await;
        Ok(())
    }

    /// Decline an inbound call (spec §4.6 `reject`). No registry side effect.
    pub async fn reject(&self, params: RejectParams, cancel: &CancellationToken) -> Result<()> {
        let mut frame = json!({"callid": params.call_id});
        if let Some(reason) = &params.reason {
            frame["reason"] = json!(reason);
        }
        let reply = self.issue("reject", frame, cancel).await?;
        check_error(reply.error)
    }

    /// Bridge the call into its Agora channel (spec §4.6 `bridge`). No
    /// registry side effect, and — unlike `unbridge`/`transfer`/`send_dtmf`
    /// — no cached-appid injection either: the table lists bridge's side
    /// effect as "none", the same as `reject`.
    pub async fn bridge(&self, params: BridgeParams, cancel: &CancellationToken) -> Result<()> {
        let frame = json!({
            "callid": params.call_id,
            "channel": params.channel,
            "uid": params.uid,
        });
        let reply = self.issue("bridge", frame, cancel).await?;
        check_error(reply.error)
    }

    /// Unbridge the call from its Agora channel (spec §4.6 `unbridge`).
    /// Injects the cached appid (spec §4.6 table).
    pub async fn unbridge(
        &self,
        params: UnbridgeParams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut frame = json!({"callid": params.call_id});
        if let Some(appid) = self.cached_appid(&params.call_id).await {
            frame["appid"] = json!(appid);
        }
        let reply = self.issue("unbridge", frame, cancel).await?;
        check_error(reply.error)
    }

    /// Hang up (spec §4.6 `hangup`): action is `endcall` for a call this
    /// client originated (`direction == Outbound`), `hangup` otherwise — the
    /// record is deleted regardless of the reply (the call is gone from this
    /// client's perspective either way the server is the source of truth on
    /// whether it was already down).
    pub async fn hangup(&self, params: HangupParams, cancel: &CancellationToken) -> Result<()> {
        let record = self.registry.get_by_call_id(&params.call_id).await;
        let action = match record.as_ref().map(|r| r.direction) {
            Some(CallDirection::Outbound) => "endcall",
            _ => "hangup",
        };
        let mut frame = json!({"callid": params.call_id});
        if self.config.is_multi_tenant() {
            if let Some(appid) = record.and_then(|r| r.appid) {
                frame["appid"] = json!(appid);
            }
        }

        let result = self.issue(action, frame, cancel).await;
        self.registry.remove_terminal(&params.call_id).await;

        let reply = result?;
        check_error(reply.error)
    }

    /// Transfer the call to another leg (spec §4.6 `transfer`). Injects the
    /// cached appid; `leg` is carried only when set.
    pub async fn transfer(
        &self,
        params: TransferParams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut frame = json!({
            "callid": params.call_id,
            "target": params.target,
        });
        if let Some(leg) = &params.leg {
            frame["leg"] = json!(leg);
        }
        if let Some(appid) = self.cached_appid(&params.call_id).await {
            frame["appid"] = json!(appid);
        }
        let reply = self.issue("transfer", frame, cancel).await?;
        check_error(reply.error)
    }

    /// Send DTMF digits (spec §4.6 `send-DTMF`). Injects the cached appid.
    pub async fn send_dtmf(
        &self,
        params: SendDtmfParams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut frame = json!({
            "callid": params.call_id,
            "digits": params.digits,
        });
        if let Some(appid) = self.cached_appid(&params.call_id).await {
            frame["appid"] = json!(appid);
        }
        let reply = self.issue("send_dtmf", frame, cancel).await?;
        check_error(reply.error)
    }

    /// Replace the subscribed DID list (spec §4.6 `subscribe`, §9
    /// "Subscription semantics"). On success, overwrites the retained list
    /// so a later reconnect resends it during registration.
    pub async fn subscribe(
        &self,
        params: SubscribeParams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let frame = json!({"numbers": params.numbers});
        let reply = self.issue("subscribe", frame, cancel).await?;
        check_error(reply.error)?;

        *self.subscribed.write().await = params.numbers;
        Ok(())
    }
}
