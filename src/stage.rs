use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::subscription::{ConsumerEnd, EventBatch, ProducerEnd};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::debug;

/// A stage with no upstream; emits items only in response to demand
pub trait Producer<T>: Send {
    /// Produce a batch answering `amount` units of demand.
    /// Invoked only when `amount > 0`; must return exactly `amount` items.
    fn on_demand(&mut self, amount: usize) -> Result<Vec<T>>;

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "producer"
    }
}

/// A stage with both upstream and downstream; relays demand upward and
/// transformed events downward
pub trait Transformer<T>: Send {
    /// Transform a batch. Cardinality need not be preserved; element order
    /// must be. Returning an empty batch is valid.
    fn on_events(&mut self, events: Vec<T>) -> Result<Vec<T>>;

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "transformer"
    }
}

/// A terminal stage with no downstream; originates demand on its own cadence
pub trait Consumer<T>: Send {
    /// Handle a delivered batch. The returned duration replaces the
    /// consumer's inter-pulse delay state: the runner waits that long before
    /// issuing the next demand pulse.
    fn on_events(&mut self, events: Vec<T>) -> Result<Duration>;

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "consumer"
    }
}

/// Runs a producer stage: waits for demand on its downstream edge, produces,
/// and delivers.
///
/// Exits cleanly when the downstream end disappears; a stage fault is
/// returned to the supervisor.
pub struct ProducerRunner<T> {
    downstream: ProducerEnd<T>,
    metrics: StageMetrics,
}

impl<T> ProducerRunner<T> {
    pub fn new(downstream: ProducerEnd<T>, metrics: StageMetrics) -> Self {
        Self {
            downstream,
            metrics,
        }
    }

    /// Run the stage loop; blocks until the edge closes or the stage faults
    pub fn run(self, mut stage: Box<dyn Producer<T>>) -> Result<()> {
        debug!(stage = stage.name(), "producer started");
        loop {
            let amount = match self.downstream.await_demand() {
                Ok(amount) => amount,
                Err(_) => break,
            };
            if amount == 0 {
                continue;
            }
            self.metrics.record_demand(amount as u64);

            let start = Instant::now();
            let events = stage.on_demand(amount)?;
            self.metrics.record_latency(start.elapsed().as_nanos() as u64);
            self.metrics.record_batch();
            self.metrics.record_events(events.len() as u64);

            let batch = EventBatch {
                items: events,
                fulfilled: amount,
            };
            if self.downstream.deliver(batch).is_err() {
                break;
            }
        }
        debug!(stage = stage.name(), "producer stopped");
        Ok(())
    }
}

/// Runs a transformer stage: waits for downstream demand, relays it upstream
/// 1:1 (clamped by the upstream edge's max outstanding demand), transforms
/// the batch that arrives, and forwards it downstream.
pub struct TransformerRunner<T> {
    upstream: ConsumerEnd<T>,
    downstream: ProducerEnd<T>,
    metrics: StageMetrics,
}

impl<T> TransformerRunner<T> {
    pub fn new(
        upstream: ConsumerEnd<T>,
        downstream: ProducerEnd<T>,
        metrics: StageMetrics,
    ) -> Self {
        Self {
            upstream,
            downstream,
            metrics,
        }
    }

    /// Run the stage loop; blocks until an edge closes or the stage faults
    pub fn run(mut self, mut stage: Box<dyn Transformer<T>>) -> Result<()> {
        debug!(stage = stage.name(), "transformer started");
        loop {
            let amount = match self.downstream.await_demand() {
                Ok(amount) => amount,
                Err(_) => break,
            };
            if amount == 0 {
                continue;
            }
            self.metrics.record_demand(amount as u64);

            // Demand pass-through happens before any production
            if self.upstream.request(amount).is_err() {
                break;
            }
            let batch = if self.upstream.outstanding() > 0 {
                match self.upstream.await_events() {
                    Ok(batch) => batch,
                    Err(_) => break,
                }
            } else {
                EventBatch {
                    items: Vec::new(),
                    fulfilled: 0,
                }
            };

            let start = Instant::now();
            let events = stage.on_events(batch.items)?;
            self.metrics.record_latency(start.elapsed().as_nanos() as u64);
            self.metrics.record_batch();
            self.metrics.record_events(events.len() as u64);

            let out = EventBatch {
                items: events,
                fulfilled: amount,
            };
            if self.downstream.deliver(out).is_err() {
                break;
            }
        }
        debug!(stage = stage.name(), "transformer stopped");
        Ok(())
    }
}

/// Runs a consumer stage: the pipeline's heartbeat. Each cycle it requests a
/// fixed quantity from its upstream, processes whatever batch arrives, then
/// waits the delay the stage returned before pulsing again.
///
/// The inter-pulse wait doubles as the shutdown wait: a signal on the
/// shutdown channel ends the loop, and dropping the consumer's edge end then
/// starves the rest of the chain into clean exit.
pub struct ConsumerRunner<T> {
    upstream: ConsumerEnd<T>,
    demand_per_pulse: usize,
    shutdown: Receiver<()>,
    metrics: StageMetrics,
}

impl<T> ConsumerRunner<T> {
    pub fn new(
        upstream: ConsumerEnd<T>,
        demand_per_pulse: usize,
        shutdown: Receiver<()>,
        metrics: StageMetrics,
    ) -> Self {
        Self {
            upstream,
            demand_per_pulse,
            shutdown,
            metrics,
        }
    }

    /// Run the stage loop; blocks until shutdown is signaled, an edge closes,
    /// or the stage faults
    pub fn run(mut self, mut stage: Box<dyn Consumer<T>>) -> Result<()> {
        debug!(stage = stage.name(), "consumer started");
        loop {
            let granted = match self.upstream.request(self.demand_per_pulse) {
                Ok(granted) => granted,
                Err(_) => break,
            };
            self.metrics.record_demand(granted as u64);

            let batch = match self.upstream.await_events() {
                Ok(batch) => batch,
                Err(_) => break,
            };
            self.metrics.record_events(batch.items.len() as u64);

            let start = Instant::now();
            let delay = stage.on_events(batch.items)?;
            self.metrics.record_latency(start.elapsed().as_nanos() as u64);
            self.metrics.record_batch();

            match self.shutdown.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
        }
        debug!(stage = stage.name(), "consumer stopped");
        Ok(())
    }
}

/// Produces endless copies of a fixed seed value.
/// A degenerate but valid unbounded generator.
#[derive(Debug)]
pub struct ReplicateProducer<T: Clone> {
    value: T,
}

impl<T: Clone> ReplicateProducer<T> {
    /// Create a producer that replicates `value` on every demand
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Clone + Send> Producer<T> for ReplicateProducer<T> {
    fn on_demand(&mut self, amount: usize) -> Result<Vec<T>> {
        Ok(vec![self.value.clone(); amount])
    }

    fn name(&self) -> &str {
        "replicate"
    }
}

/// A producer that threads explicit state through a step function.
/// Each step returns `(events, next_state)`; the next state replaces the
/// held state, never mutates it in place.
pub struct UnfoldProducer<S, F> {
    name: String,
    state: Option<S>,
    step: F,
}

impl<S, F> UnfoldProducer<S, F> {
    /// Create a producer seeded with `state`
    pub fn new(name: impl Into<String>, state: S, step: F) -> Self {
        Self {
            name: name.into(),
            state: Some(state),
            step,
        }
    }
}

impl<T, S, F> Producer<T> for UnfoldProducer<S, F>
where
    S: Send,
    F: FnMut(usize, S) -> Result<(Vec<T>, S)> + Send,
{
    fn on_demand(&mut self, amount: usize) -> Result<Vec<T>> {
        let state = self
            .state
            .take()
            .ok_or_else(|| PipelineError::StatePoisoned(self.name.clone()))?;
        let (events, next) = (self.step)(amount, state)?;
        self.state = Some(next);
        Ok(events)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A pass-through transformer that forwards batches unchanged
#[derive(Debug)]
pub struct PassthroughTransformer;

impl<T: Send> Transformer<T> for PassthroughTransformer {
    fn on_events(&mut self, events: Vec<T>) -> Result<Vec<T>> {
        Ok(events)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// A transformer that maps each event through a function
pub struct MapTransformer<F> {
    name: String,
    mapper: F,
}

impl<F> MapTransformer<F> {
    /// Create a new map transformer
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<T, F> Transformer<T> for MapTransformer<F>
where
    F: FnMut(T) -> Result<T> + Send,
{
    fn on_events(&mut self, events: Vec<T>) -> Result<Vec<T>> {
        events.into_iter().map(&mut self.mapper).collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A transformer that retains events matching a predicate
pub struct FilterTransformer<F> {
    name: String,
    predicate: F,
}

impl<F> FilterTransformer<F> {
    /// Create a new filter transformer
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<T, F> Transformer<T> for FilterTransformer<F>
where
    F: FnMut(&T) -> bool + Send,
{
    fn on_events(&mut self, events: Vec<T>) -> Result<Vec<T>> {
        let predicate = &mut self.predicate;
        Ok(events.into_iter().filter(|event| predicate(event)).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A transformer that threads explicit state through a batch step function.
/// Each step returns `(events, next_state)`; the next state replaces the
/// held state.
pub struct ScanTransformer<S, F> {
    name: String,
    state: Option<S>,
    step: F,
}

impl<S, F> ScanTransformer<S, F> {
    /// Create a transformer seeded with `state`
    pub fn new(name: impl Into<String>, state: S, step: F) -> Self {
        Self {
            name: name.into(),
            state: Some(state),
            step,
        }
    }
}

impl<T, S, F> Transformer<T> for ScanTransformer<S, F>
where
    S: Send,
    F: FnMut(Vec<T>, S) -> Result<(Vec<T>, S)> + Send,
{
    fn on_events(&mut self, events: Vec<T>) -> Result<Vec<T>> {
        let state = self
            .state
            .take()
            .ok_or_else(|| PipelineError::StatePoisoned(self.name.clone()))?;
        let (events, next) = (self.step)(events, state)?;
        self.state = Some(next);
        Ok(events)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A consumer that hands each batch to a sink callback and pulses at a fixed
/// inter-pulse delay
pub struct SinkConsumer<F> {
    name: String,
    delay: Duration,
    sink: F,
}

impl<F> SinkConsumer<F> {
    /// Create a new sink consumer with the given inter-pulse delay
    pub fn new(name: impl Into<String>, delay: Duration, sink: F) -> Self {
        Self {
            name: name.into(),
            delay,
            sink,
        }
    }
}

impl<T, F> Consumer<T> for SinkConsumer<F>
where
    F: FnMut(Vec<T>) -> Result<()> + Send,
{
    fn on_events(&mut self, events: Vec<T>) -> Result<Duration> {
        (self.sink)(events)?;
        Ok(self.delay)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
