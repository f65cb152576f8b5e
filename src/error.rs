use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Batch engine error
pub enum BatchError {
    /// Neither a maximum batch size nor a batch timeout was configured.
    #[error("Configuration: max_batch_size and batch_timeout can't both be zero")]
    NoTrigger,

    /// The engine was started without a batch factory.
    #[error("Configuration: a batch factory is required")]
    MissingFactory,

    /// The engine was started outside of a Tokio runtime.
    #[error("Configuration: no Tokio runtime available: {0}")]
    NoRuntime(String),

    /// `start` was called on an engine that already left the `NotStarted` state.
    #[error("Lifecycle: engine {0} has already been started")]
    AlreadyStarted(String),

    /// The operation requires a running engine.
    #[error("Lifecycle: engine {0} is not running")]
    NotRunning(String),

    /// The accumulation task ended abnormally.
    #[error("Engine {0}: accumulation task failed: {1}")]
    Worker(String, String),
}
