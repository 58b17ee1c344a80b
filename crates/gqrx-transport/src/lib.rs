//! Gqrx command/response channel
//!
//! Provides the connection layer for the Gqrx remote control protocol:
//! - Transport: owns the socket and forwards raw inbound bytes
//! - Dispatcher: one task owning the FIFO queue, the in-flight command and its timer
//! - CommandChannel: cloneable handle to submit, cancel and close
//!
//! The protocol has no request identifiers, so exactly one command is on the
//! wire at a time and replies are matched to commands by arrival order.

pub mod channel;
mod dispatcher;
pub mod error;
pub mod state;
pub mod transport;

pub use channel::{ChannelBuilder, CommandChannel, CommandHandle, DEFAULT_CONNECT_TIMEOUT};
pub use error::{ChannelError, ChannelResult};
pub use state::{ChannelEvent, ConnectionState};
pub use transport::{Transport, TransportEvent};
