//! Channel error types

use std::time::Duration;

use gqrx_protocol::{ProtocolError, ReportCode};
use thiserror::Error;

/// Ways a submitted command can fail.
///
/// Connection errors are delivered to every pending command at once, the
/// other variants only to the command they concern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Command {command:?} failed with code {code}")]
    Command { command: String, code: ReportCode },

    #[error("Command {command:?} got no reply within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Command {command:?} was cancelled before being sent")]
    Cancelled { command: String },
}

impl ChannelError {
    pub fn is_connection(&self) -> bool {
        matches!(self, ChannelError::Connection(_))
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
