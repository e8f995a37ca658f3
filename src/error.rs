use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No stages in pipeline
    #[error("Cannot build a pipeline with no stages")]
    NoStages,

    /// Stage chain is not a valid producer -> transformers -> consumer run
    #[error("Invalid pipeline topology: {0}")]
    Topology(String),

    /// Feed retrieval failure (transport fault or non-success status)
    #[error("Feed retrieval failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Feed payload could not be decoded
    #[error("Feed decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Stage execution error
    #[error("Stage execution failed: {0}")]
    StageError(String),

    /// A stage's state was consumed by a failed step and cannot be reused
    #[error("Stage '{0}' state was poisoned by an earlier fault")]
    StatePoisoned(String),

    /// Thread spawn or join error
    #[error("Thread error: {0}")]
    ThreadError(String),
}
