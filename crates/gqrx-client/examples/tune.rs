//! Tune Example
//!
//! Connects to a running Gqrx, watches channel events, tunes to a
//! frequency and pipelines a few queries on one connection.
//!
//! Run with: cargo run -p gqrx-client --example tune -- 145.288 FM

use std::time::Duration;

use gqrx_client::{ChannelBuilder, ChannelEvent, Command, GqrxClient, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let mhz: f64 = args.next().as_deref().unwrap_or("145.288").parse()?;
    let mode: Mode = args.next().as_deref().unwrap_or("FM").parse()?;

    // Subscribe before connecting so the Connected event is not missed
    let builder = ChannelBuilder::new();
    let mut events = builder.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ChannelEvent::Connected { peer } => println!("* connected to {}", peer),
                ChannelEvent::Disconnected { reason } => println!("* disconnected: {}", reason),
                ChannelEvent::Error { detail } => println!("* error: {}", detail),
            }
        }
    });

    let channel = builder.connect("127.0.0.1", 7356).await?;
    let client = GqrxClient::new(channel.clone(), Duration::from_secs(1));

    println!("Gqrx {}", client.version().await?);

    client.set_frequency_mhz(mhz).await?;
    client.set_mode(mode).await?;

    // Submit several queries up front; replies come back in submission order
    let timeout = client.timeout();
    let freq = channel.submit(Command::frequency(), timeout)?;
    let demod = channel.submit(Command::mode_and_passband(), timeout)?;
    let strength = channel.submit(Command::level("STRENGTH"), timeout)?;

    println!("Frequency: {} Hz", freq.await?);
    println!("Demodulator: {}", demod.await?.lines().collect::<Vec<_>>().join(" / "));
    println!("Signal: {} dBFS", strength.await?);

    client.quit().await;
    Ok(())
}
