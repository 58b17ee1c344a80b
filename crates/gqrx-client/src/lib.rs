//! Gqrx Client - typed remote control of a Gqrx receiver
//!
//! This crate provides the convenience layer over the command channel:
//! - Unit conversion and argument formatting for each protocol verb
//! - Parsing of raw replies into typed values
//! - A channel scanner driven by squelch and signal strength

pub mod client;
pub mod config;
pub mod error;
pub mod scanner;
#[cfg(test)]
mod test_support;

pub use client::{Demodulator, GqrxClient, RadioStatus};
pub use config::{ClientConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{ClientError, ClientResult, ConfigError};
pub use scanner::{Channel, ScanOptions, ScanStep, Scanner};

pub use gqrx_protocol::{Command, Frame, Mode, ReportCode};
pub use gqrx_transport::{
    ChannelBuilder, ChannelError, ChannelEvent, CommandChannel, CommandHandle, ConnectionState,
};
