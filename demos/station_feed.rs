//! Bikeshare station feed pipeline
//!
//! Polls a station feed on the consumer's cadence: each demand pulse travels
//! upstream, triggers exactly one HTTP fetch, and the decoded, filtered
//! result flows back down to the console.
//!
//! Usage: cargo run --example station_feed [config.json]
//!        (Without an argument the canonical feed configuration is used)

use demand_pipeline::{feed_pipeline, FeedConfig, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => FeedConfig::from_file(path)?,
        None => FeedConfig::default(),
    };

    println!("Polling {} every {}ms", config.url, config.pulse_interval_ms);
    println!(
        "Keeping entries where {} == {:?}",
        config.filter_field, config.filter_value
    );
    println!();

    let pipeline = feed_pipeline(config, |batch| {
        for item in batch {
            println!("{item}");
        }
        Ok(())
    })?;

    // The supervisor parks here while the stages run; a stage fault is the
    // only way out
    pipeline.start()?.wait()
}
