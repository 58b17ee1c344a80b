//! Reply frames and their interpretation

use std::fmt;

use crate::command::ReplyKind;
use crate::error::{ProtocolError, ProtocolResult};

/// Leading token of a status reply
pub const REPORT_PREFIX: &str = "RPRT";

/// One complete reply, as reassembled from the byte stream.
///
/// Multi-line replies keep their lines joined with `\n`; line terminators
/// and carriage returns are not part of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    text: String,
}

impl Frame {
    pub fn new(text: impl Into<String>) -> Self {
        Frame { text: text.into() }
    }

    pub(crate) fn from_lines(lines: Vec<String>) -> Self {
        Frame {
            text: lines.join("\n"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Whether the payload is a `RPRT <code>` status line
    pub fn is_report(&self) -> bool {
        is_report_line(self.text.as_bytes())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub(crate) fn is_report_line(line: &[u8]) -> bool {
    let prefix = REPORT_PREFIX.as_bytes();
    line.starts_with(prefix)
        && line[prefix.len()..]
            .first()
            .map_or(true, |b| b.is_ascii_whitespace())
}

/// Status code carried by a `RPRT` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCode(pub i32);

impl ReportCode {
    pub const SUCCESS: ReportCode = ReportCode(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Parse `RPRT <code>`
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(REPORT_PREFIX), Some(code), None) => code
                .parse()
                .map(ReportCode)
                .map_err(|_| ProtocolError::MalformedReport(line.to_string())),
            _ => Err(ProtocolError::MalformedReport(line.to_string())),
        }
    }
}

impl fmt::Display for ReportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a reply frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Report with the success code
    Success,
    /// Report with any other code
    Failure(ReportCode),
    /// Raw value, to be handed back unmodified
    Value,
}

/// Judge a frame according to the reply kind of the command that produced it.
pub fn classify(frame: &Frame, kind: ReplyKind) -> ProtocolResult<Outcome> {
    match kind {
        ReplyKind::Value => Ok(Outcome::Value),
        ReplyKind::Report => {
            let code = ReportCode::parse(frame.as_str())?;
            if code.is_success() {
                Ok(Outcome::Success)
            } else {
                Ok(Outcome::Failure(code))
            }
        }
    }
}
