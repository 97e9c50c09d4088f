//! Error kinds surfaced by the command surface and connection manager.

use std::fmt;

/// Errors returned by [`crate::Client`] operations.
///
/// Variants are distinct failure *kinds*, not wrappers around a concrete
/// transport error type — the core has no transport dependency to wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientError {
    /// The underlying transport failed to dial, read, or write.
    Transport(String),
    /// The connect handshake (server-hello or registration) was rejected or malformed.
    Handshake(String),
    /// The server replied with an `error` field for an issued command.
    Command(String),
    /// No reply arrived within the 30s command timeout.
    Timeout,
    /// The caller's cancellation signal fired before a reply arrived.
    Cancelled,
    /// The connection was torn down while the command was outstanding.
    ConnectionLost,
    /// A command was issued while the client was disconnected (or reconnecting).
    NotConnected,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake failed: {msg}"),
            Self::Command(msg) => write!(f, "command failed: {msg}"),
            Self::Timeout => f.write_str("command timed out waiting for a reply"),
            Self::Cancelled => f.write_str("command was cancelled by the caller"),
            Self::ConnectionLost => f.write_str("connection lost while command was outstanding"),
            Self::NotConnected => f.write_str("client is not connected"),
        }
    }
}

impl std::error::Error for ClientError {}

pub type Result<T> = std::result::Result<T, ClientError>;
