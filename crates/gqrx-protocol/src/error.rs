//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Reply exceeds maximum frame size: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Reply line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed report line: {0:?}")]
    MalformedReport(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
