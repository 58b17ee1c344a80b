//! Gqrx CLI Client
//!
//! Interactive command-line remote control for a Gqrx receiver.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local receiver
//! gqrx
//!
//! # Connect to a remote receiver
//! gqrx --host 192.168.1.20 --port 7356
//!
//! # Execute single command
//! gqrx -c "F 145288000"
//!
//! # Print a status snapshot as JSON
//! gqrx status --json
//!
//! # Scan channels
//! gqrx scan 851.872:FM 852.022:FM 145.288:FM
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gqrx_client::{
    Channel, ChannelError, ClientConfig, ClientError, Command, ConnectionState, Frame, GqrxClient,
    ReportCode, ScanOptions, Scanner,
};

/// Gqrx Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "gqrx")]
#[command(author, version, about = "Gqrx CLI - remote control for the Gqrx SDR receiver")]
struct Args {
    /// Receiver hostname
    #[arg(short = 'H', long, env = "GQRX_HOST")]
    host: Option<String>,

    /// Remote control port
    #[arg(short, long, env = "GQRX_PORT")]
    port: Option<u16>,

    /// Configuration file path (TOML)
    #[arg(long, env = "GQRX_CONFIG")]
    config: Option<PathBuf>,

    /// Per-command timeout in milliseconds
    #[arg(short, long, env = "GQRX_TIMEOUT_MS")]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GQRX_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Execute command and exit
    #[arg(short, long)]
    command: Option<String>,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print frequency, demodulator, levels and recording state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cycle through channels, staying on those with signal above squelch
    Scan {
        /// Channels as <MHz>:<mode>, e.g. 851.872:FM
        #[arg(required = true)]
        channels: Vec<Channel>,

        /// Seconds to stay on an active channel
        #[arg(long, default_value = "15")]
        dwell: u64,

        /// Milliseconds to wait after hopping to the next channel
        #[arg(long, default_value = "250")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config = load_config(&args)?;
    let addr = format!("{}:{}", config.host, config.port);

    let client = GqrxClient::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    info!(addr = %addr, "Connected");

    let result = match args.action {
        Some(Action::Status { json }) => print_status(&client, json).await,
        Some(Action::Scan {
            channels,
            dwell,
            interval,
        }) => {
            let options = ScanOptions {
                dwell: Duration::from_secs(dwell),
                settle: Duration::from_millis(interval),
            };
            run_scan(&client, channels, options).await
        }
        None => match args.command {
            Some(ref line) => execute_line(&client, line).await,
            None => repl(client.clone(), &config, args.quiet).await,
        },
    };

    client.quit().await;
    result
}

fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// File values first, then flags and environment on top.
fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if let Some(ref host) = args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.command_timeout_ms = timeout;
    }
    Ok(config)
}

async fn repl(mut client: GqrxClient, config: &ClientConfig, quiet: bool) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    if !quiet {
        let version = client.version().await.unwrap_or_else(|_| "unknown".into());
        println!(
            "{}",
            format!(
                r#"
  Gqrx remote CLI
  Connected to {} (Gqrx {})
  Type 'help' for commands, 'quit' to exit
"#,
                addr, version
            )
            .cyan()
        );
    }

    let mut rl = DefaultEditor::new()?;
    let history_path = home::dir()
        .map(|p| p.join(".gqrx_history"))
        .unwrap_or_default();

    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("{}> ", "gqrx".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Handle local commands
                match line.to_lowercase().as_str() {
                    "quit" | "exit" | "q" => break,
                    "help" => {
                        print_help();
                        continue;
                    }
                    "clear" => {
                        print!("\x1B[2J\x1B[1;1H");
                        continue;
                    }
                    _ => {}
                }

                if let Err(e) = execute_line(&client, line).await {
                    eprintln!("{} {}", "Error:".red(), e);
                }

                if client.channel().state() != ConnectionState::Connected {
                    // Try to reconnect once
                    match GqrxClient::connect(config).await {
                        Ok(new_client) => {
                            client = new_client;
                            println!("{}", "Reconnected.".yellow());
                        }
                        Err(_) => {
                            eprintln!("{}", "Connection lost.".red());
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    client.quit().await;
    Ok(())
}

/// Send one raw protocol line and print the reply.
async fn execute_line(client: &GqrxClient, line: &str) -> Result<()> {
    let command: Command = line.parse()?;

    match client.execute(command).await {
        Ok(frame) => print_reply(&frame),
        Err(ClientError::Channel(ChannelError::Command { code, .. })) => {
            println!("{}", format!("RPRT {}", code).red());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_reply(frame: &Frame) {
    if frame.is_report() {
        let succeeded = ReportCode::parse(frame.as_str()).map_or(false, |code| code.is_success());
        if succeeded {
            println!("{}", frame.as_str().green());
        } else {
            println!("{}", frame.as_str().red());
        }
    } else {
        for line in frame.lines() {
            println!("{}", line.yellow());
        }
    }
}

async fn print_status(client: &GqrxClient, json: bool) -> Result<()> {
    let status = client.status().await.context("Failed to read status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{:<12} {:.6} MHz", "Frequency".cyan(), status.frequency_hz as f64 / 1e6);
    println!("{:<12} {} ({} Hz)", "Mode".cyan(), status.mode, status.passband_hz);
    println!("{:<12} {:.1} dBFS", "Squelch".cyan(), status.squelch_dbfs);
    println!("{:<12} {:.1} dBFS", "Signal".cyan(), status.signal_strength_dbfs);
    let recording = if status.recording { "on".red() } else { "off".dimmed() };
    println!("{:<12} {}", "Recording".cyan(), recording);
    Ok(())
}

async fn run_scan(client: &GqrxClient, channels: Vec<Channel>, options: ScanOptions) -> Result<()> {
    let mut scanner = Scanner::new(client, channels, options)?;

    tokio::select! {
        result = scanner.run() => result.context("Scan stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("Scan interrupted");
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"
{}

{}
  F <hz>                                 Set frequency
  f                                      Get frequency
  LNB_LO [hz]                            Get/set LNB local oscillator

{}
  M <mode> [passband]                    Set mode and passband
  m                                      Get mode and passband
  M ?                                    List available modes

{}
  L SQL <dbfs>                           Set squelch level
  l SQL                                  Get squelch level
  l STRENGTH                             Get signal strength

{}
  U RECORD <0|1>                         Start/stop recording
  u RECORD                               Get recording status
  AOS / LOS                              Acquisition / loss of signal

{}
  _                                      Daemon version

{}
  help                                   Show this help
  clear                                  Clear screen
  quit/exit                              Close the session and exit

{}
  OFF RAW AM AMS LSB USB CWL CWU CW FM WFM WFM_ST WFM_ST_OIRT
"#,
        "Gqrx Remote Commands".cyan().bold(),
        "Frequency".yellow().bold(),
        "Demodulator".yellow().bold(),
        "Levels".yellow().bold(),
        "Recording".yellow().bold(),
        "Daemon".yellow().bold(),
        "Local".yellow().bold(),
        "Modes".yellow().bold(),
    );
}

// Minimal home directory lookup for the history file
mod home {
    use std::path::PathBuf;

    pub fn dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from(["gqrx", "--host", "sdr.local", "-t", "250"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.host, "sdr.local");
        assert_eq!(config.port, 7356);
        assert_eq!(config.command_timeout_ms, 250);
    }

    #[test]
    fn test_scan_arguments() {
        let args = Args::parse_from(["gqrx", "scan", "851.872:FM", "145.288:WFM", "--dwell", "5"]);
        match args.action {
            Some(Action::Scan { channels, dwell, .. }) => {
                assert_eq!(channels.len(), 2);
                assert_eq!(channels[0].frequency_hz, 851_872_000);
                assert_eq!(dwell, 5);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_scan_requires_channels() {
        assert!(Args::try_parse_from(["gqrx", "scan"]).is_err());
    }
}
