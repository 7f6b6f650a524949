//! WiCAN Logger - discover a WiCAN adapter and log its live data to CSV

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wican_logger::display;
use wican_logger::{
    DeviceLocator, DiscoveryEngine, DiscoveryPlan, HttpClient, InteractiveFallback, Locator,
    LoggerConfig, LoopEnd, PollSettings, PollSummary, PollingLoop, Recorder, StdinPrompt,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wican_logger=info")),
        )
        .init();

    let config = LoggerConfig::load()
        .await
        .context("Failed to load configuration")?;

    println!();
    println!("🚗 ======================================");
    println!("   WICAN DATA LOGGER - AUTO DISCOVERY");
    println!("🚗 ======================================");
    println!();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => cancel.cancel(),
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }

    let client = Arc::new(
        HttpClient::new(config.device.endpoint_path.clone())
            .context("Failed to build HTTP client")?,
    );
    let engine = DiscoveryEngine::new(
        client.clone(),
        DiscoveryPlan::from_config(&config)?,
        cancel.clone(),
    );
    let fallback = InteractiveFallback::new(
        client.clone(),
        config.device.port,
        config.manual_timeout(),
        cancel.clone(),
    );
    let locator = Arc::new(DeviceLocator::new(
        engine,
        fallback,
        Box::new(StdinPrompt::new()),
    ));

    let address = match config.target_address()? {
        Some(address) => {
            info!("Using configured address {}", address);
            address
        }
        None => match locator.locate().await {
            Some(address) => address,
            None => {
                println!("Exiting.");
                return Ok(());
            }
        },
    };

    let recorder = Recorder::new(
        &config.output.directory,
        &config.output.file_prefix,
        Local::now(),
    );
    let settings = PollSettings::from_config(&config);

    println!();
    println!("{}", display::section("📡", "Logging session"));
    println!("🌐 WiCAN: {}", address);
    println!("📁 Output file: {}", recorder.path().display());
    println!(
        "⏱️  Interval: {:?} | Display: {:?}",
        settings.interval, settings.display
    );
    println!();
    println!("Press Ctrl+C to stop logging");
    println!();

    let poller = PollingLoop::new(client, locator, recorder, address, settings, cancel);
    let summary = poller
        .run()
        .await
        .context("Logging aborted: the CSV store could not be written")?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &PollSummary) {
    println!();
    println!("{}", display::section("📊", "Session summary"));
    match summary.end {
        LoopEnd::Interrupted => println!("🛑 Logging stopped."),
        LoopEnd::Abandoned => println!("❌ WiCAN lost and no new address given. Exiting."),
    }
    println!("Total rows: {}", summary.rows);
    println!("Total fields: {}", summary.columns.len());
    if summary.rediscoveries > 0 {
        println!("Re-discoveries: {}", summary.rediscoveries);
    }

    if summary.rows > 0 {
        println!("💾 Data saved to: {}", summary.path.display());
        println!("\nAll fields captured:");
        for (i, field) in summary.columns.iter().enumerate() {
            println!("  {:3}. {}", i + 1, field);
        }
    }
}
