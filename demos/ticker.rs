//! Network-free tour of the demand-driven core
//!
//! A counting producer, a running-sum transformer, and a printing consumer
//! pulsing twice a second. Runs for ten seconds, prints the per-stage
//! metrics, and shuts the chain down.
//!
//! Usage: cargo run --example ticker

use demand_pipeline::{
    MaxDemand, PipelineBuilder, Result, ScanTransformer, SinkConsumer, UnfoldProducer,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let pipeline = PipelineBuilder::new()
        .producer(UnfoldProducer::new(
            "count",
            0u64,
            |amount: usize, mut next: u64| {
                let events: Vec<u64> = (0..amount as u64).map(|i| next + i).collect();
                next += amount as u64;
                Ok((events, next))
            },
        ))
        .transformer(
            MaxDemand::Limit(1),
            ScanTransformer::new("running_sum", 0u64, |events: Vec<u64>, mut total: u64| {
                let sums: Vec<u64> = events
                    .into_iter()
                    .map(|event| {
                        total += event;
                        total
                    })
                    .collect();
                Ok((sums, total))
            }),
        )
        .consumer(
            MaxDemand::Unbounded,
            1,
            SinkConsumer::new("print", Duration::from_millis(500), |batch: Vec<u64>| {
                for sum in batch {
                    println!("running sum: {sum}");
                }
                Ok(())
            }),
        )
        .build()?;

    let running = pipeline.start()?;
    std::thread::sleep(Duration::from_secs(10));
    println!("\n{}", running.metrics_summary());
    running.shutdown()
}
