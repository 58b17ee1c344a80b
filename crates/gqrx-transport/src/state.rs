//! Connection lifecycle

use std::fmt;

/// State of the single connection owned by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// TCP handshake in progress, visible through `ChannelBuilder::watch_state`
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected { peer: String },
    Disconnected { reason: String },
    Error { detail: String },
}
