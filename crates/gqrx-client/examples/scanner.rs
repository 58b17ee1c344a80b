//! Scanner Example
//!
//! Cycles through a list of channels and stays on any channel whose
//! signal opens the squelch.
//!
//! Run with: cargo run -p gqrx-client --example scanner -- 851.872:FM 852.022:FM

use gqrx_client::{Channel, ClientConfig, GqrxClient, ScanOptions, Scanner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let channels = std::env::args()
        .skip(1)
        .map(|arg| arg.parse::<Channel>())
        .collect::<Result<Vec<_>, _>>()?;

    let client = GqrxClient::connect(&ClientConfig::default()).await?;
    let mut scanner = Scanner::new(&client, channels, ScanOptions::default())?;

    let finished = tokio::select! {
        result = scanner.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    match finished {
        Some(result) => result?,
        None => println!("Stopped on {}", scanner.current()),
    }

    client.quit().await;
    Ok(())
}
