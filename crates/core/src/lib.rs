//! Client-side protocol engine for a call-manager (CM) WebSocket interface
//! that controls SIP/PSTN calls bridged into Agora RTC channels.
//!
//! [`Client::connect`] runs the handshake, then starts a read loop and a
//! ping loop in the background. The returned `Arc<Client<T, H>>` exposes the
//! command surface (`dial`, `accept`, `reject`, `bridge`, `unbridge`,
//! `hangup`, `transfer`, `send_dtmf`, `subscribe`) plus connection
//! lifecycle queries. Call-lifecycle events arrive asynchronously through
//! the [`EventHandler`] supplied at construction.
//!
//! The core has no concrete transport dependency — it is generic over
//! [`Transport`], a small trait a caller implements over whatever duplex
//! text-frame connection it has (see `demos/basic-call` for a
//! `tokio-tungstenite` implementation).

mod client;
mod commands;
mod config;
mod connection;
mod error;
mod events;
mod handler;
mod pending;
mod registry;
mod transport;

pub use client::Client;
pub use commands::{
    AcceptParams, BridgeParams, DialParams, DialResult, HangupParams, RejectParams,
    SendDtmfParams, SubscribeParams, TransferParams, UnbridgeParams,
};
pub use config::{ClientConfig, MULTI_APPID};
pub use error::{ClientError, Result};
pub use handler::EventHandler;
pub use registry::{CallDirection, CallRecord, CallState};
pub use transport::{transport_err, Frame, Transport, TransportRead, TransportWrite, WriteHalf};
