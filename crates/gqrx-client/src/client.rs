//! Typed convenience calls on top of the command channel

use std::str::FromStr;
use std::time::Duration;

use gqrx_protocol::{hz_to_mhz, mhz_to_hz, parse_hz, Command, Frame, Mode};
use gqrx_transport::{ChannelBuilder, CommandChannel};
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const SQUELCH: &str = "SQL";
const STRENGTH: &str = "STRENGTH";
const RECORD: &str = "RECORD";

/// Demodulator settings as reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demodulator {
    pub mode: Mode,
    pub passband_hz: u32,
}

/// Snapshot of the receiver's main settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioStatus {
    pub frequency_hz: u64,
    pub mode: String,
    pub passband_hz: u32,
    pub squelch_dbfs: f64,
    pub signal_strength_dbfs: f64,
    pub recording: bool,
}

/// Remote control client for a Gqrx receiver
#[derive(Clone)]
pub struct GqrxClient {
    channel: CommandChannel,
    timeout: Duration,
}

impl GqrxClient {
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let channel = ChannelBuilder::new()
            .connect_timeout(config.connect_timeout())
            .connect(&config.host, config.port)
            .await?;
        Ok(Self::new(channel, config.command_timeout()))
    }

    /// Wrap an open channel; `timeout` applies to every command.
    pub fn new(channel: CommandChannel, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run any command and return its reply frame.
    pub async fn execute(&self, command: Command) -> ClientResult<Frame> {
        Ok(self.channel.execute(command, self.timeout).await?)
    }

    async fn set(&self, command: Command) -> ClientResult<()> {
        self.execute(command).await.map(|_| ())
    }

    async fn get<T: FromStr>(&self, command: Command) -> ClientResult<T> {
        let text = command.text().to_string();
        let frame = self.execute(command).await?;
        parse_value(&text, frame.as_str())
    }

    pub async fn set_frequency(&self, hz: u64) -> ClientResult<()> {
        self.set(Command::set_frequency(hz)).await
    }

    pub async fn frequency(&self) -> ClientResult<u64> {
        let frame = self.execute(Command::frequency()).await?;
        parse_hz(frame.as_str().trim()).map_err(|_| invalid("f", frame.as_str()))
    }

    pub async fn set_frequency_mhz(&self, mhz: f64) -> ClientResult<()> {
        self.set_frequency(mhz_to_hz(mhz)).await
    }

    pub async fn frequency_mhz(&self) -> ClientResult<f64> {
        Ok(hz_to_mhz(self.frequency().await?))
    }

    /// Select a mode with its preset passband, or the daemon's default for
    /// modes without one.
    pub async fn set_mode(&self, mode: Mode) -> ClientResult<()> {
        self.set(Command::set_mode(mode, mode.preset_passband())).await
    }

    pub async fn set_mode_and_passband(&self, mode: Mode, passband_hz: u32) -> ClientResult<()> {
        self.set(Command::set_mode(mode, Some(passband_hz))).await
    }

    pub async fn mode_and_passband(&self) -> ClientResult<Demodulator> {
        let frame = self.execute(Command::mode_and_passband()).await?;
        parse_demodulator(&frame)
    }

    pub async fn available_modes(&self) -> ClientResult<Vec<String>> {
        let frame = self.execute(Command::available_modes()).await?;
        Ok(frame.as_str().split_whitespace().map(str::to_string).collect())
    }

    /// Signal strength in dBFS
    pub async fn signal_strength(&self) -> ClientResult<f64> {
        self.get(Command::level(STRENGTH)).await
    }

    /// Squelch threshold in dBFS
    pub async fn squelch(&self) -> ClientResult<f64> {
        self.get(Command::level(SQUELCH)).await
    }

    pub async fn set_squelch(&self, dbfs: f64) -> ClientResult<()> {
        self.set(Command::set_level(SQUELCH, dbfs)).await
    }

    pub async fn recording_status(&self) -> ClientResult<bool> {
        let frame = self.execute(Command::function(RECORD)).await?;
        parse_flag("u RECORD", frame.as_str())
    }

    pub async fn set_recording(&self, enabled: bool) -> ClientResult<()> {
        self.set(Command::set_function(RECORD, enabled)).await
    }

    pub async fn start_recording(&self) -> ClientResult<()> {
        self.set_recording(true).await
    }

    pub async fn stop_recording(&self) -> ClientResult<()> {
        self.set_recording(false).await
    }

    /// Acquisition of signal: starts recording if the daemon is set up for it
    pub async fn trigger_aos(&self) -> ClientResult<()> {
        self.set(Command::aos()).await
    }

    /// Loss of signal
    pub async fn trigger_los(&self) -> ClientResult<()> {
        self.set(Command::los()).await
    }

    pub async fn version(&self) -> ClientResult<String> {
        Ok(self.execute(Command::version()).await?.into_string())
    }

    /// LNB local oscillator frequency in Hz
    pub async fn lnb_lo(&self) -> ClientResult<u64> {
        let frame = self.execute(Command::lnb_lo()).await?;
        parse_hz(frame.as_str().trim()).map_err(|_| invalid("LNB_LO", frame.as_str()))
    }

    pub async fn set_lnb_lo(&self, hz: u64) -> ClientResult<()> {
        self.set(Command::set_lnb_lo(hz)).await
    }

    /// Read the main settings in one go.
    ///
    /// All queries are queued up front; the channel still sends them one
    /// at a time.
    pub async fn status(&self) -> ClientResult<RadioStatus> {
        let frequency = self.channel.submit(Command::frequency(), self.timeout)?;
        let demodulator = self.channel.submit(Command::mode_and_passband(), self.timeout)?;
        let squelch = self.channel.submit(Command::level(SQUELCH), self.timeout)?;
        let strength = self.channel.submit(Command::level(STRENGTH), self.timeout)?;
        let recording = self.channel.submit(Command::function(RECORD), self.timeout)?;

        let frequency = frequency.await?;
        let demodulator = parse_demodulator(&demodulator.await?)?;
        let squelch = squelch.await?;
        let strength = strength.await?;
        let recording = recording.await?;

        let status = RadioStatus {
            frequency_hz: parse_hz(frequency.as_str().trim())
                .map_err(|_| invalid("f", frequency.as_str()))?,
            mode: demodulator.mode.to_string(),
            passband_hz: demodulator.passband_hz,
            squelch_dbfs: parse_value("l SQL", squelch.as_str())?,
            signal_strength_dbfs: parse_value("l STRENGTH", strength.as_str())?,
            recording: parse_flag("u RECORD", recording.as_str())?,
        };
        debug!(?status, "Read receiver status");
        Ok(status)
    }

    /// Ask the daemon to end the session and close the connection.
    pub async fn quit(&self) {
        self.channel.close().await;
    }
}

fn invalid(command: &str, value: &str) -> ClientError {
    ClientError::InvalidValue {
        command: command.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(command: &str, value: &str) -> ClientResult<T> {
    value.trim().parse().map_err(|_| invalid(command, value))
}

fn parse_flag(command: &str, value: &str) -> ClientResult<bool> {
    match value.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(invalid(command, value)),
    }
}

fn parse_demodulator(frame: &Frame) -> ClientResult<Demodulator> {
    let mut lines = frame.lines();
    match (lines.next(), lines.next()) {
        (Some(mode), Some(passband)) => Ok(Demodulator {
            mode: mode.trim().parse().map_err(|_| invalid("m", frame.as_str()))?,
            passband_hz: parse_value("m", passband)?,
        }),
        _ => Err(invalid("m", frame.as_str())),
    }
}
