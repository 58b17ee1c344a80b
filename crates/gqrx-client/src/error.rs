//! Error types for the client facade

use std::path::PathBuf;

use gqrx_protocol::ProtocolError;
use gqrx_transport::ChannelError;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Unexpected reply to {command:?}: {value:?}")]
    InvalidValue { command: String, value: String },

    #[error("Scanner needs at least one channel")]
    NoChannels,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;
