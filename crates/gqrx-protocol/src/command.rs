//! Gqrx command types

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, ProtocolResult};

/// Number of lines a command's reply occupies on the wire.
///
/// The protocol carries no length prefix or multi-line sentinel, so the
/// reassembler relies on this to know where a reply ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// One newline-terminated line
    SingleLine,
    /// A fixed number of newline-terminated lines
    MultiLine(usize),
}

impl ReplyShape {
    pub fn line_count(self) -> usize {
        match self {
            ReplyShape::SingleLine => 1,
            ReplyShape::MultiLine(n) => n.max(1),
        }
    }
}

/// How a reply is judged once it has been framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// `RPRT <code>` where code 0 means success
    Report,
    /// Raw value handed back verbatim
    Value,
}

/// Demodulator modes understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Off,
    Raw,
    Am,
    AmSync,
    Lsb,
    Usb,
    CwLower,
    CwUpper,
    Cw,
    Fm,
    Wfm,
    WfmStereo,
    WfmStereoOirt,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Off => "OFF",
            Mode::Raw => "RAW",
            Mode::Am => "AM",
            Mode::AmSync => "AMS",
            Mode::Lsb => "LSB",
            Mode::Usb => "USB",
            Mode::CwLower => "CWL",
            Mode::CwUpper => "CWU",
            Mode::Cw => "CW",
            Mode::Fm => "FM",
            Mode::Wfm => "WFM",
            Mode::WfmStereo => "WFM_ST",
            Mode::WfmStereoOirt => "WFM_ST_OIRT",
        }
    }

    /// Passband used when a mode is selected without an explicit width.
    pub fn preset_passband(&self) -> Option<u32> {
        match self {
            Mode::Am | Mode::Fm => Some(10_000),
            Mode::Wfm | Mode::WfmStereo => Some(160_000),
            Mode::Lsb | Mode::Usb => Some(2_700),
            Mode::Cw => Some(500),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OFF" => Ok(Mode::Off),
            "RAW" => Ok(Mode::Raw),
            "AM" => Ok(Mode::Am),
            "AMS" => Ok(Mode::AmSync),
            "LSB" => Ok(Mode::Lsb),
            "USB" => Ok(Mode::Usb),
            "CWL" => Ok(Mode::CwLower),
            "CWU" => Ok(Mode::CwUpper),
            "CW" => Ok(Mode::Cw),
            "FM" => Ok(Mode::Fm),
            "WFM" => Ok(Mode::Wfm),
            "WFM_ST" => Ok(Mode::WfmStereo),
            "WFM_ST_OIRT" => Ok(Mode::WfmStereoOirt),
            _ => Err(ProtocolError::InvalidArgument(format!("Unknown mode: {}", s))),
        }
    }
}

/// A command ready to be written to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    shape: ReplyShape,
    kind: ReplyKind,
}

impl Command {
    /// Build a command from literal text. The text must not contain a newline.
    pub fn raw(text: impl Into<String>, shape: ReplyShape, kind: ReplyKind) -> Self {
        Command {
            text: text.into(),
            shape,
            kind,
        }
    }

    fn report(text: impl Into<String>) -> Self {
        Self::raw(text, ReplyShape::SingleLine, ReplyKind::Report)
    }

    fn value(text: impl Into<String>) -> Self {
        Self::raw(text, ReplyShape::SingleLine, ReplyKind::Value)
    }

    /// F <hz>
    pub fn set_frequency(hz: u64) -> Self {
        Self::report(format!("F {}", hz))
    }

    /// f
    pub fn frequency() -> Self {
        Self::value("f")
    }

    /// M <mode> [passband]
    pub fn set_mode(mode: Mode, passband: Option<u32>) -> Self {
        match passband {
            Some(hz) => Self::report(format!("M {} {}", mode, hz)),
            None => Self::report(format!("M {}", mode)),
        }
    }

    /// m, answered with the mode and the passband on two lines
    pub fn mode_and_passband() -> Self {
        Self::raw("m", ReplyShape::MultiLine(2), ReplyKind::Value)
    }

    /// M ?
    pub fn available_modes() -> Self {
        Self::value("M ?")
    }

    /// L <name> <value>
    pub fn set_level(name: &str, value: f64) -> Self {
        Self::report(format!("L {} {}", name, value))
    }

    /// l <name>
    pub fn level(name: &str) -> Self {
        Self::value(format!("l {}", name))
    }

    /// U <name> <0|1>
    pub fn set_function(name: &str, enabled: bool) -> Self {
        Self::report(format!("U {} {}", name, u8::from(enabled)))
    }

    /// u <name>
    pub fn function(name: &str) -> Self {
        Self::value(format!("u {}", name))
    }

    pub fn aos() -> Self {
        Self::report("AOS")
    }

    pub fn los() -> Self {
        Self::report("LOS")
    }

    /// _
    pub fn version() -> Self {
        Self::value("_")
    }

    pub fn lnb_lo() -> Self {
        Self::value("LNB_LO")
    }

    pub fn set_lnb_lo(hz: u64) -> Self {
        Self::report(format!("LNB_LO {}", hz))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn shape(&self) -> ReplyShape {
        self.shape
    }

    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// Bytes written to the socket for this command
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.text.len() + 1);
        buf.extend_from_slice(self.text.as_bytes());
        buf.push(b'\n');
        buf
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Map a typed protocol line to a command with the right reply expectations.
///
/// Unknown verbs are passed through as single-line values. `q` is refused:
/// terminating the session goes through the channel's `close()`.
impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(line: &str) -> ProtocolResult<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::InvalidCommand("Empty command".into()));
        }
        if line.contains('\n') {
            return Err(ProtocolError::InvalidCommand("Command spans several lines".into()));
        }

        let mut tokens = line.split_whitespace();
        let verb = tokens
            .next()
            .ok_or_else(|| ProtocolError::InvalidCommand("Empty command".into()))?;
        let args: Vec<&str> = tokens.collect();

        match (verb, args.as_slice()) {
            ("F", [hz]) => Ok(Command::set_frequency(parse_hz(hz)?)),
            ("F", []) => Err(ProtocolError::MissingArgument("frequency".into())),
            ("f", []) => Ok(Command::frequency()),
            ("M", ["?"]) => Ok(Command::available_modes()),
            ("M", [mode]) => Ok(Command::set_mode(mode.parse()?, None)),
            ("M", [mode, passband]) => {
                let passband = passband.parse().map_err(|_| {
                    ProtocolError::InvalidArgument(format!("Invalid passband: {}", passband))
                })?;
                Ok(Command::set_mode(mode.parse()?, Some(passband)))
            }
            ("M", []) => Err(ProtocolError::MissingArgument("mode".into())),
            ("m", []) => Ok(Command::mode_and_passband()),
            ("L", [name, value]) => {
                let value = value.parse().map_err(|_| {
                    ProtocolError::InvalidArgument(format!("Invalid level: {}", value))
                })?;
                Ok(Command::set_level(name, value))
            }
            ("L", _) => Err(ProtocolError::MissingArgument("level name and value".into())),
            ("l", [name]) => Ok(Command::level(name)),
            ("U", [name, flag]) => match *flag {
                "0" => Ok(Command::set_function(name, false)),
                "1" => Ok(Command::set_function(name, true)),
                _ => Err(ProtocolError::InvalidArgument(format!("Expected 0 or 1, got {}", flag))),
            },
            ("U", _) => Err(ProtocolError::MissingArgument("function name and state".into())),
            ("u", [name]) => Ok(Command::function(name)),
            ("AOS", []) => Ok(Command::aos()),
            ("LOS", []) => Ok(Command::los()),
            ("_", []) => Ok(Command::version()),
            ("LNB_LO", []) => Ok(Command::lnb_lo()),
            ("LNB_LO", [hz]) => Ok(Command::set_lnb_lo(parse_hz(hz)?)),
            ("q" | "Q", _) => Err(ProtocolError::InvalidCommand(
                "q terminates the session; close the connection instead".into(),
            )),
            _ => Ok(Command::value(line)),
        }
    }
}

/// Parse a frequency in Hz; fractional values are rounded.
pub fn parse_hz(s: &str) -> ProtocolResult<u64> {
    if let Ok(hz) = s.parse::<u64>() {
        return Ok(hz);
    }
    match s.parse::<f64>() {
        Ok(hz) if hz.is_finite() && hz >= 0.0 => Ok(hz.round() as u64),
        _ => Err(ProtocolError::InvalidArgument(format!("Invalid frequency: {}", s))),
    }
}

/// Convert MHz to Hz, rounding to the nearest Hz.
pub fn mhz_to_hz(mhz: f64) -> u64 {
    (mhz * 1_000_000.0).round().max(0.0) as u64
}

pub fn hz_to_mhz(hz: u64) -> f64 {
    hz as f64 / 1_000_000.0
}
