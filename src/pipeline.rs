use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::stage::{
    Consumer, ConsumerRunner, Producer, ProducerRunner, Transformer, TransformerRunner,
};
use crate::subscription::{self, ConsumerEnd, MaxDemand, ProducerEnd};
use crossbeam::channel::{unbounded, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::error;

/// A stage specification: role, body, and the demand configuration of the
/// stage's upstream edge. Role is dispatched at wiring time, not per message.
enum StageSpec<T> {
    Producer {
        body: Box<dyn Producer<T>>,
    },
    Transformer {
        max_demand: MaxDemand,
        body: Box<dyn Transformer<T>>,
    },
    Consumer {
        max_demand: MaxDemand,
        demand_per_pulse: usize,
        body: Box<dyn Consumer<T>>,
    },
}

impl<T> StageSpec<T> {
    fn name(&self) -> &str {
        match self {
            StageSpec::Producer { body } => body.name(),
            StageSpec::Transformer { body, .. } => body.name(),
            StageSpec::Consumer { body, .. } => body.name(),
        }
    }

    /// Demand cap of the edge toward this stage's upstream
    fn max_demand(&self) -> MaxDemand {
        match self {
            StageSpec::Producer { .. } => MaxDemand::Unbounded,
            StageSpec::Transformer { max_demand, .. } => *max_demand,
            StageSpec::Consumer { max_demand, .. } => *max_demand,
        }
    }
}

/// Builder for constructing pipelines in chain order, producer first
pub struct PipelineBuilder<T> {
    stages: Vec<StageSpec<T>>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add the root producer stage
    pub fn producer(mut self, stage: impl Producer<T> + 'static) -> Self {
        self.stages.push(StageSpec::Producer {
            body: Box::new(stage),
        });
        self
    }

    /// Add a transformer stage. `max_demand` caps the outstanding demand the
    /// stage may hold toward its upstream.
    pub fn transformer(
        mut self,
        max_demand: MaxDemand,
        stage: impl Transformer<T> + 'static,
    ) -> Self {
        self.stages.push(StageSpec::Transformer {
            max_demand,
            body: Box::new(stage),
        });
        self
    }

    /// Add the terminal consumer stage. `demand_per_pulse` is the fixed
    /// quantity requested on each heartbeat pulse.
    pub fn consumer(
        mut self,
        max_demand: MaxDemand,
        demand_per_pulse: usize,
        stage: impl Consumer<T> + 'static,
    ) -> Self {
        self.stages.push(StageSpec::Consumer {
            max_demand,
            demand_per_pulse,
            body: Box::new(stage),
        });
        self
    }

    /// Validate the topology and build the pipeline
    pub fn build(self) -> Result<Pipeline<T>> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }
        if self.stages.len() < 2 {
            return Err(PipelineError::Topology(
                "pipeline needs both a producer and a consumer".to_string(),
            ));
        }

        let last = self.stages.len() - 1;
        for (i, spec) in self.stages.iter().enumerate() {
            match spec {
                StageSpec::Producer { .. } if i != 0 => {
                    return Err(PipelineError::Topology(format!(
                        "producer '{}' must be the first stage",
                        spec.name()
                    )));
                }
                StageSpec::Consumer { .. } if i != last => {
                    return Err(PipelineError::Topology(format!(
                        "consumer '{}' must be the last stage",
                        spec.name()
                    )));
                }
                StageSpec::Transformer { .. } if i == 0 || i == last => {
                    return Err(PipelineError::Topology(format!(
                        "transformer '{}' must sit between a producer and a consumer",
                        spec.name()
                    )));
                }
                _ => {}
            }
            if let MaxDemand::Limit(0) = spec.max_demand() {
                return Err(PipelineError::Topology(format!(
                    "max demand for stage '{}' must be positive",
                    spec.name()
                )));
            }
            if let StageSpec::Consumer {
                demand_per_pulse: 0,
                ..
            } = spec
            {
                return Err(PipelineError::Topology(format!(
                    "demand per pulse for stage '{}' must be positive",
                    spec.name()
                )));
            }
        }
        let names = self.stages.iter().map(|s| s.name().to_string()).collect();
        let metrics = self.stages.iter().map(|_| StageMetrics::new()).collect();
        Ok(Pipeline {
            stages: self.stages,
            names,
            metrics,
        })
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated, unstarted pipeline
pub struct Pipeline<T> {
    stages: Vec<StageSpec<T>>,
    names: Vec<String>,
    metrics: Vec<StageMetrics>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Number of stages in the chain
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Get metrics for a specific stage
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.metrics.get(index)
    }

    /// Start the pipeline: wire subscriptions from the consumer side toward
    /// the producer side, then spawn one named thread per stage
    pub fn start(self) -> Result<RunningPipeline> {
        let Pipeline {
            stages,
            names,
            metrics,
        } = self;
        let n = stages.len();

        let mut producer_ends: Vec<Option<ProducerEnd<T>>> = (0..n).map(|_| None).collect();
        let mut consumer_ends: Vec<Option<ConsumerEnd<T>>> = (0..n).map(|_| None).collect();
        for i in (1..n).rev() {
            let (up, down) = subscription::connect(stages[i].max_demand());
            producer_ends[i - 1] = Some(up);
            consumer_ends[i] = Some(down);
        }

        let (shutdown_tx, shutdown_rx) = unbounded();

        let mut handles = Vec::with_capacity(n);
        for (i, spec) in stages.into_iter().enumerate() {
            let stage_metrics = metrics[i].clone();
            let name = names[i].clone();
            let handle = match spec {
                StageSpec::Producer { body } => {
                    let runner = ProducerRunner::new(take_end(&mut producer_ends, i)?, stage_metrics);
                    spawn_stage(&name, move || runner.run(body))?
                }
                StageSpec::Transformer { body, .. } => {
                    let runner = TransformerRunner::new(
                        take_end(&mut consumer_ends, i)?,
                        take_end(&mut producer_ends, i)?,
                        stage_metrics,
                    );
                    spawn_stage(&name, move || runner.run(body))?
                }
                StageSpec::Consumer {
                    demand_per_pulse,
                    body,
                    ..
                } => {
                    let runner = ConsumerRunner::new(
                        take_end(&mut consumer_ends, i)?,
                        demand_per_pulse,
                        shutdown_rx.clone(),
                        stage_metrics,
                    );
                    spawn_stage(&name, move || runner.run(body))?
                }
            };
            handles.push((name, handle));
        }

        Ok(RunningPipeline {
            handles,
            shutdown_tx,
            names,
            metrics,
        })
    }
}

fn take_end<E>(ends: &mut [Option<E>], index: usize) -> Result<E> {
    ends[index].take().ok_or_else(|| {
        PipelineError::Topology(format!("stage {index} has no wired edge"))
    })
}

fn spawn_stage(
    name: &str,
    run: impl FnOnce() -> Result<()> + Send + 'static,
) -> Result<JoinHandle<Result<()>>> {
    let stage = name.to_string();
    thread::Builder::new()
        .name(format!("stage-{name}"))
        .spawn(move || {
            let result = run();
            if let Err(fault) = &result {
                error!(stage = %stage, error = %fault, "stage fault, pipeline will stall");
            }
            result
        })
        .map_err(|e| PipelineError::ThreadError(format!("failed to spawn stage '{name}': {e}")))
}

/// A running pipeline that the supervisor can join on or shut down
pub struct RunningPipeline {
    handles: Vec<(String, JoinHandle<Result<()>>)>,
    shutdown_tx: Sender<()>,
    names: Vec<String>,
    metrics: Vec<StageMetrics>,
}

impl RunningPipeline {
    /// Block until every stage thread exits. While the pipeline is healthy
    /// this blocks indefinitely; the first stage fault is returned.
    pub fn wait(self) -> Result<()> {
        Self::join_all(self.handles)
    }

    /// Let the pipeline run for `duration`, then shut it down
    pub fn wait_timeout(self, duration: Duration) -> Result<()> {
        thread::sleep(duration);
        self.shutdown()
    }

    /// Stop the pipeline: signal the consumer to stop pulsing, which starves
    /// the chain into clean exit, then join all stage threads
    pub fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        Self::join_all(self.handles)
    }

    /// Get a handle that can signal shutdown from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Get metrics for a specific stage
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.metrics.get(index)
    }

    /// Get a summary of all stage metrics
    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (name, metrics) in self.names.iter().zip(&self.metrics) {
            summary.push_str(&format!("  {}: {}\n", name, metrics.snapshot().format()));
        }
        summary
    }

    fn join_all(handles: Vec<(String, JoinHandle<Result<()>>)>) -> Result<()> {
        let mut first_fault = None;
        for (name, handle) in handles {
            let result = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(PipelineError::ThreadError(format!(
                    "stage '{name}' panicked"
                ))),
            };
            if let Err(fault) = result {
                first_fault.get_or_insert(fault);
            }
        }
        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// Signals a running pipeline to shut down; safe to hold after the pipeline
/// has already stopped
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Sender<()>,
}

impl ShutdownHandle {
    /// Request shutdown. Idempotent; a signal after the pipeline stopped is
    /// ignored.
    pub fn signal(&self) {
        let _ = self.tx.send(());
    }
}
