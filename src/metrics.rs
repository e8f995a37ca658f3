use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A simple percentile tracker that maintains a sliding window of measurements
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    measurements: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl PercentileTracker {
    /// Create a new percentile tracker with a specified window size
    pub fn new(window_size: usize) -> Self {
        Self {
            measurements: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size,
        }
    }

    /// Record a measurement (in nanoseconds)
    pub fn record(&self, nanos: u64) {
        let mut measurements = self.measurements.lock();
        if measurements.len() >= self.window_size {
            measurements.pop_front();
        }
        measurements.push_back(nanos);
    }

    /// Calculate the p50 (median) latency in microseconds
    pub fn p50_us(&self) -> f64 {
        self.percentile(0.50)
    }

    /// Calculate the p95 (95th percentile) latency in microseconds
    pub fn p95_us(&self) -> f64 {
        self.percentile(0.95)
    }

    /// Calculate the p99 (99th percentile) latency in microseconds
    pub fn p99_us(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, p: f64) -> f64 {
        let measurements = self.measurements.lock();
        if measurements.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<_> = measurements.iter().copied().collect();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0 // Convert nanoseconds to microseconds
    }

    /// Get the count of recorded measurements
    pub fn count(&self) -> usize {
        self.measurements.lock().len()
    }
}

/// Per-stage metrics collector
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Demand units observed on the stage's inbound protocol
    demand_observed: Arc<AtomicU64>,
    /// Events emitted by (or, for a consumer, delivered to) the stage
    events_processed: Arc<AtomicU64>,
    /// Event batches handled
    batches_processed: Arc<AtomicU64>,
    /// Per-batch processing latency (p50, p95, p99)
    latency_tracker: PercentileTracker,
    /// Creation time for throughput calculation
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            demand_observed: Arc::new(AtomicU64::new(0)),
            events_processed: Arc::new(AtomicU64::new(0)),
            batches_processed: Arc::new(AtomicU64::new(0)),
            latency_tracker: PercentileTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    /// Record demand units observed
    pub fn record_demand(&self, amount: u64) {
        self.demand_observed.fetch_add(amount, Ordering::Relaxed);
    }

    /// Record events processed
    pub fn record_events(&self, count: u64) {
        self.events_processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a handled batch
    pub fn record_batch(&self) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch processing latency measurement in nanoseconds
    pub fn record_latency(&self, nanos: u64) {
        self.latency_tracker.record(nanos);
    }

    /// Get the total demand units observed
    pub fn total_demand(&self) -> u64 {
        self.demand_observed.load(Ordering::Relaxed)
    }

    /// Get the total number of events processed
    pub fn total_events(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    /// Get the total number of batches handled
    pub fn total_batches(&self) -> u64 {
        self.batches_processed.load(Ordering::Relaxed)
    }

    /// Calculate current throughput in events per second
    pub fn throughput_eps(&self) -> f64 {
        let elapsed = self.start_time.elapsed();
        let total = self.total_events();
        if elapsed.as_secs_f64() == 0.0 {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        }
    }

    /// Get P50 latency in microseconds
    pub fn latency_p50_us(&self) -> f64 {
        self.latency_tracker.p50_us()
    }

    /// Get P95 latency in microseconds
    pub fn latency_p95_us(&self) -> f64 {
        self.latency_tracker.p95_us()
    }

    /// Get P99 latency in microseconds
    pub fn latency_p99_us(&self) -> f64 {
        self.latency_tracker.p99_us()
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_demand: self.total_demand(),
            total_events: self.total_events(),
            total_batches: self.total_batches(),
            throughput_eps: self.throughput_eps(),
            latency_p50_us: self.latency_p50_us(),
            latency_p95_us: self.latency_p95_us(),
            latency_p99_us: self.latency_p99_us(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_demand: u64,
    pub total_events: u64,
    pub total_batches: u64,
    pub throughput_eps: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Demand: {}, Events: {}, Batches: {}, Throughput: {:.2} ev/s, \
             Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.total_demand,
            self.total_events,
            self.total_batches,
            self.throughput_eps,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
