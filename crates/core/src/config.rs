//! Client configuration.
//!
//! Unlike the teacher's `MuxConfig`, this is a plain struct rather than a
//! `clap::Args` — the core has no CLI dependency (the demo binary owns
//! argument/env parsing and builds one of these).

use std::time::Duration;

use crate::pending::DEFAULT_COMMAND_TIMEOUT;

/// Sentinel appid enabling multi-tenant mode (spec §3, §4.6).
pub const MULTI_APPID: &str = "MULTI";

/// Default ping cadence (spec §4.7 "Keepalive").
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);
/// Default reconnect backoff starting point; doubles each failed attempt up
/// to [`DEFAULT_MAX_BACKOFF`] (spec §4.7, §8 "Reconnect backoff sequence is
/// exactly 1, 2, 4, 8, 16, 30, 30, ...").
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for a single [`crate::Client`] session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// CM WebSocket URL, e.g. `wss://cm.example.com/v1/ws/events`.
    pub url: String,
    /// Bearer auth token presented in the registration frame.
    pub auth_token: String,
    /// Stable identifier for this client, presented in the registration frame.
    pub client_id: String,
    /// Application id, or the [`MULTI_APPID`] sentinel for multi-tenant mode.
    pub appid: String,
    /// DIDs to subscribe to at handshake. Updatable live via `Client::subscribe`.
    pub subscribe_numbers: Vec<String>,
    /// Upper bound on server responsiveness for any issued command (spec
    /// §4.3). Defaults to [`DEFAULT_COMMAND_TIMEOUT`]; overridable so tests
    /// don't have to wait out the real default.
    pub command_timeout: Duration,
    /// Keepalive ping cadence (spec §4.7). Defaults to [`DEFAULT_PING_INTERVAL`].
    pub ping_interval: Duration,
    /// Reconnect backoff starting point (spec §4.7). Defaults to
    /// [`DEFAULT_INITIAL_BACKOFF`].
    pub initial_backoff: Duration,
    /// Reconnect backoff ceiling (spec §4.7). Defaults to [`DEFAULT_MAX_BACKOFF`].
    pub max_backoff: Duration,
}

impl ClientConfig {
    pub fn new(
        url: impl Into<String>,
        auth_token: impl Into<String>,
        client_id: impl Into<String>,
        appid: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            client_id: client_id.into(),
            appid: appid.into(),
            subscribe_numbers: Vec::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_subscribe_numbers(mut self, numbers: Vec<String>) -> Self {
        self.subscribe_numbers = numbers;
        self
    }

    /// Override the four timer-dependent knobs at once — the injectable
    /// seam tests use to exercise timeout/backoff/ping-cadence behavior
    /// under `tokio::time::pause()` without waiting out the real durations
    /// (spec §8).
    pub fn with_timing(
        mut self,
        command_timeout: Duration,
        ping_interval: Duration,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        self.command_timeout = command_timeout;
        self.ping_interval = ping_interval;
        self.initial_backoff = initial_backoff;
        self.max_backoff = max_backoff;
        self
    }

    /// True when this client was constructed with the [`MULTI_APPID`] sentinel.
    ///
    /// In MULTI mode every outbound command must carry an explicit appid
    /// (spec §4.6). The core does not block commands locally when this is
    /// true — see `DESIGN.md` for the open-question resolution.
    pub fn is_multi_tenant(&self) -> bool {
        self.appid == MULTI_APPID
    }
}
