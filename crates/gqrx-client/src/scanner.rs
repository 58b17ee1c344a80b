//! Channel scanner: hop between channels until one opens the squelch

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use gqrx_protocol::{hz_to_mhz, mhz_to_hz, Mode, ProtocolError};
use tracing::{debug, info};

use crate::client::GqrxClient;
use crate::error::{ClientError, ClientResult};

/// A frequency and demodulator pair to monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub frequency_hz: u64,
    pub mode: Mode,
}

/// Parses `<MHz>:<mode>`, e.g. `851.872:FM`
impl FromStr for Channel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (freq, mode) = s
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidArgument(format!("Expected <MHz>:<mode>, got {}", s)))?;
        let mhz: f64 = freq
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidArgument(format!("Invalid frequency: {}", freq)))?;
        if !mhz.is_finite() || mhz <= 0.0 {
            return Err(ProtocolError::InvalidArgument(format!("Invalid frequency: {}", freq)));
        }

        Ok(Channel {
            frequency_hz: mhz_to_hz(mhz),
            mode: mode.trim().parse()?,
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} MHz {}", hz_to_mhz(self.frequency_hz), self.mode)
    }
}

/// What a scan step did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanStep {
    /// Signal above squelch: stay on the channel
    Dwell { channel: usize, strength: f64, squelch: f64 },
    /// Quiet channel: tuned to the next one
    Hop { from: usize, to: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Time to stay on an active channel before checking again
    pub dwell: Duration,
    /// Pause after hopping, to let the receiver settle
    pub settle: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            dwell: Duration::from_secs(15),
            settle: Duration::from_millis(250),
        }
    }
}

pub struct Scanner<'a> {
    client: &'a GqrxClient,
    channels: Vec<Channel>,
    current: usize,
    options: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(client: &'a GqrxClient, channels: Vec<Channel>, options: ScanOptions) -> ClientResult<Self> {
        if channels.is_empty() {
            return Err(ClientError::NoChannels);
        }
        Ok(Self {
            client,
            channels,
            current: 0,
            options,
        })
    }

    pub fn current(&self) -> Channel {
        self.channels[self.current]
    }

    /// Tune the receiver to the current channel.
    pub async fn tune(&self) -> ClientResult<()> {
        let channel = self.current();
        self.client.set_frequency(channel.frequency_hz).await?;
        self.client.set_mode(channel.mode).await?;
        debug!(channel = %channel, "Tuned");
        Ok(())
    }

    /// Compare signal strength with squelch and hop on if the channel is quiet.
    pub async fn step(&mut self) -> ClientResult<ScanStep> {
        let squelch = self.client.squelch().await?;
        let strength = self.client.signal_strength().await?;

        if squelch < strength {
            return Ok(ScanStep::Dwell {
                channel: self.current,
                strength,
                squelch,
            });
        }

        let from = self.current;
        self.current = (self.current + 1) % self.channels.len();
        self.tune().await?;
        Ok(ScanStep::Hop {
            from,
            to: self.current,
        })
    }

    /// Scan until a command fails.
    pub async fn run(&mut self) -> ClientResult<()> {
        info!(channels = self.channels.len(), "Starting scan");
        self.tune().await?;

        loop {
            match self.step().await? {
                ScanStep::Dwell { strength, squelch, .. } => {
                    info!(channel = %self.current(), strength, squelch, "Signal");
                    tokio::time::sleep(self.options.dwell).await;
                }
                ScanStep::Hop { .. } => {
                    tokio::time::sleep(self.options.settle).await;
                }
            }
        }
    }
}
