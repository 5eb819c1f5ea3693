use std::fmt;

/// Errors returned by [`super::ThreadPool`] operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// `submit` was called after `shutdown` had already set the stop flag.
    #[error("thread pool has been shut down")]
    Stopped,

    /// The queue could not grow any further (either the ring buffer hit its
    /// growth ceiling, or the allocator itself failed).
    #[error("thread pool queue is out of memory")]
    OutOfMemory,

    /// A worker thread could not be spawned during pool construction.
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(std::io::Error),

    /// A worker thread could not be joined during shutdown.
    #[error("failed to join worker thread: {0}")]
    JoinFailed(JoinPanic),
}

/// Opaque wrapper around a worker thread's panic payload, captured so that
/// [`PoolError::JoinFailed`] can implement `std::error::Error` (a raw
/// `Box<dyn Any + Send>` cannot).
#[derive(Debug)]
pub struct JoinPanic(pub(crate) String);

impl fmt::Display for JoinPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
