//! Reply frame reassembly

use bytes::BytesMut;
use tracing::trace;

use crate::command::ReplyShape;
use crate::error::{ProtocolError, ProtocolResult};
use crate::response::{is_report_line, Frame};

/// Maximum amount of unframed data kept in the buffer (64KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Turns an arbitrarily chunked byte stream into reply frames.
///
/// Nothing on the wire says how many lines a reply has, so the caller
/// passes the expected [`ReplyShape`] of the command currently in flight.
/// A multi-line reply that starts with a `RPRT` line ends at that line:
/// the daemon reports errors with a single status line whatever the query.
pub struct FrameReassembler {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_frame_size,
        }
    }

    /// Add received bytes to the buffer.
    ///
    /// On overflow the buffered data is discarded, since no frame boundary
    /// inside it can be trusted any more.
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let size = self.buffer.len() + data.len();
        if size > self.max_frame_size {
            self.buffer.clear();
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to take one complete frame of the given shape from the buffer.
    ///
    /// Returns `Ok(None)` until enough lines have arrived. A frame whose
    /// bytes are not valid UTF-8 is consumed and reported as an error.
    pub fn next_frame(&mut self, shape: ReplyShape) -> ProtocolResult<Option<Frame>> {
        let wanted = shape.line_count();
        let mut ends = Vec::with_capacity(wanted);
        let mut start = 0;

        while ends.len() < wanted {
            let end = match self.buffer[start..].iter().position(|&b| b == b'\n') {
                Some(offset) => start + offset,
                None => return Ok(None),
            };
            ends.push(end);
            if ends.len() == 1 && wanted > 1 && is_report_line(trim_cr(&self.buffer[..end])) {
                break;
            }
            start = end + 1;
        }

        let consumed = match ends.last() {
            Some(&end) => end + 1,
            None => return Ok(None),
        };
        let raw = self.buffer.split_to(consumed);
        trace!(bytes = consumed, lines = ends.len(), "Reassembled reply frame");

        let mut lines = Vec::with_capacity(ends.len());
        let mut line_start = 0;
        for end in ends {
            let line = std::str::from_utf8(trim_cr(&raw[line_start..end]))
                .map_err(|_| ProtocolError::InvalidUtf8)?;
            lines.push(line.to_string());
            line_start = end + 1;
        }

        Ok(Some(Frame::from_lines(lines)))
    }

    /// Number of bytes received but not yet framed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}
