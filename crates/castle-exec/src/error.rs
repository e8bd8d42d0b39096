//! Error types for the execution layer.

/// Errors from the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool was shut down and no longer accepts tasks.
    #[error("worker pool is shut down")]
    ShutDown,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
