use crate::error::{PipelineError, Result};
use crate::json::{FieldEqualsFilter, PluckTransformer};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::stage::{MapTransformer, ReplicateProducer, SinkConsumer};
use crate::subscription::MaxDemand;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Perform a blocking fetch of `url` and return the raw response body.
/// A transport fault or non-success status is a hard failure.
pub fn fetch_body(url: &str) -> Result<String> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    Ok(response.text()?)
}

/// Decode a raw response body into a generic key/value tree.
/// A parse fault is a hard failure.
pub fn decode_body(body: &str) -> Result<Value> {
    Ok(serde_json::from_str(body)?)
}

/// Configuration for the station feed pipeline, fixed at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Producer seed value: the feed URL replicated into the chain
    pub url: String,
    /// Key extracted from each decoded feed document
    pub pluck_key: String,
    /// Field the final filter matches on
    pub filter_field: String,
    /// Value the final filter expects
    pub filter_value: String,
    /// Consumer inter-pulse delay in milliseconds
    pub pulse_interval_ms: u64,
    /// Max outstanding demand on the fetch edge. Capped at 1 by default so
    /// demand never races ahead of the network fetch.
    pub fetch_max_demand: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://feeds.citibikenyc.com/stations/stations.json".to_string(),
            pluck_key: "stationBeanList".to_string(),
            filter_field: "stationName".to_string(),
            filter_value: "W 14 St & The High Line".to_string(),
            pulse_interval_ms: 5000,
            fetch_max_demand: 1,
        }
    }
}

impl FeedConfig {
    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Assemble the canonical feed chain:
/// replicate(url) -> fetch -> decode -> pluck(key) -> field filter -> sink.
///
/// The sink receives each final batch; the pipeline is returned unstarted.
pub fn feed_pipeline<F>(config: FeedConfig, sink: F) -> Result<Pipeline<Value>>
where
    F: FnMut(Vec<Value>) -> Result<()> + Send + 'static,
{
    let delay = Duration::from_millis(config.pulse_interval_ms);
    PipelineBuilder::new()
        .producer(ReplicateProducer::new(Value::String(config.url)))
        .transformer(
            MaxDemand::Limit(config.fetch_max_demand),
            MapTransformer::new("fetch", |event: Value| {
                let url = event.as_str().ok_or_else(|| {
                    PipelineError::StageError("fetch expects a URL string event".to_string())
                })?;
                Ok(Value::String(fetch_body(url)?))
            }),
        )
        .transformer(
            MaxDemand::Unbounded,
            MapTransformer::new("decode", |event: Value| {
                let body = event.as_str().ok_or_else(|| {
                    PipelineError::StageError("decode expects a raw body string event".to_string())
                })?;
                decode_body(body)
            }),
        )
        .transformer(MaxDemand::Unbounded, PluckTransformer::new(config.pluck_key))
        .transformer(
            MaxDemand::Unbounded,
            FieldEqualsFilter::new(config.filter_field, Value::String(config.filter_value)),
        )
        .consumer(
            MaxDemand::Unbounded,
            1,
            SinkConsumer::new("sink", delay, sink),
        )
        .build()
}
