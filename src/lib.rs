//! A demand-driven staged pipeline for pull-based data flow.
//!
//! This crate provides a linear chain of concurrently-running stages where
//! data moves downstream only in response to explicit, bounded demand signals
//! issued by the downstream stages. The terminal consumer is the pipeline's
//! heartbeat: it pulses demand on a fixed cadence, the demand propagates
//! upstream edge by edge, and event batches flow back down, never exceeding
//! the demand outstanding on each edge.
//!
//! # Features
//!
//! - Three stage roles: Producer, Transformer, Consumer, dispatched at wiring
//!   time
//! - Per-edge subscriptions with a negotiable maximum outstanding demand
//! - One thread per stage; edges are the only shared resource
//! - Per-stage metrics: demand, throughput, latency percentiles
//! - Builder pattern for pipeline construction, with a supervisor that joins
//!   on the running chain and a shutdown handle
//!
//! # Example
//!
//! ```ignore
//! use demand_pipeline::{MaxDemand, PipelineBuilder, ReplicateProducer,
//!     PassthroughTransformer, SinkConsumer};
//! use std::time::Duration;
//!
//! let pipeline = PipelineBuilder::new()
//!     .producer(ReplicateProducer::new(42u32))
//!     .transformer(MaxDemand::Limit(1), PassthroughTransformer)
//!     .consumer(
//!         MaxDemand::Unbounded,
//!         1,
//!         SinkConsumer::new("print", Duration::from_secs(5), |batch| {
//!             println!("{batch:?}");
//!             Ok(())
//!         }),
//!     )
//!     .build()?;
//!
//! pipeline.start()?.wait()?;
//! ```

pub mod error;
pub mod feed;
pub mod json;
pub mod metrics;
pub mod pipeline;
pub mod stage;
pub mod subscription;

// Re-exports for convenience
pub use error::{PipelineError, Result};
pub use feed::{decode_body, feed_pipeline, fetch_body, FeedConfig};
pub use json::{FieldEqualsFilter, PluckTransformer};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, RunningPipeline, ShutdownHandle};
pub use stage::{
    Consumer, FilterTransformer, MapTransformer, PassthroughTransformer, Producer,
    ReplicateProducer, ScanTransformer, SinkConsumer, Transformer, UnfoldProducer,
};
pub use subscription::{EventBatch, MaxDemand};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
