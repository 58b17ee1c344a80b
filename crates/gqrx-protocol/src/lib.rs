//! Gqrx remote control protocol
//!
//! A line-oriented ASCII protocol spoken by the Gqrx receiver on TCP port 7356.
//!
//! ## Command Format
//! ```text
//! F <hz>                   # set frequency
//! f                        # get frequency
//! M <mode> [passband]      # set demodulator
//! m                        # get demodulator (two lines)
//! L SQL <dbfs> / l SQL     # squelch level
//! U RECORD <0|1>           # toggle recording
//! ```
//!
//! ## Reply Format
//! ```text
//! RPRT <code>              # status of a set-style command, 0 = success
//! <value>                  # raw value of a get-style command
//! ```
//!
//! Replies carry no request identifier: they are matched to commands by
//! arrival order alone.

pub mod command;
pub mod error;
pub mod reassembler;
pub mod response;

pub use command::{hz_to_mhz, mhz_to_hz, parse_hz, Command, Mode, ReplyKind, ReplyShape};
pub use error::{ProtocolError, ProtocolResult};
pub use reassembler::{FrameReassembler, MAX_FRAME_SIZE};
pub use response::{classify, Frame, Outcome, ReportCode};
