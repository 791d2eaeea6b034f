//! Error types for the gop substrate
//!
//! These cover failures of the substrate itself (no thread, pool shut down,
//! misuse of a queue). Domain outcomes of user functions travel in
//! [`OpStatus`](crate::status::OpStatus) instead.

use core::fmt;

/// Result type for substrate operations
pub type GopResult<T> = Result<T, GopError>;

/// Errors that can occur in pool, op and queue operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GopError {
    /// Neither the primary workers nor the overflow reserve could get a thread
    ResourceExhausted,

    /// Pool is shutting down and no longer accepts work
    ShutDown,

    /// Op already belongs to a queue
    AlreadyQueued,

    /// Invalid op state for the requested transition
    InvalidState,

    /// Wait timed out
    Timeout,

    /// Pool configuration rejected
    InvalidConfig(&'static str),

    /// Worker thread error
    WorkerError(WorkerError),
}

impl fmt::Display for GopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GopError::ResourceExhausted => write!(f, "no thread available for operation"),
            GopError::ShutDown => write!(f, "pool is shut down"),
            GopError::AlreadyQueued => write!(f, "operation already belongs to a queue"),
            GopError::InvalidState => write!(f, "invalid operation state"),
            GopError::Timeout => write!(f, "wait timed out"),
            GopError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            GopError::WorkerError(e) => write!(f, "worker error: {}", e),
        }
    }
}

impl std::error::Error for GopError {}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn a primary worker thread
    SpawnFailed,

    /// Failed to spawn an overflow rescue thread
    RescueSpawnFailed,

    /// Worker thread panicked
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            WorkerError::RescueSpawnFailed => write!(f, "failed to spawn overflow thread"),
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

impl From<WorkerError> for GopError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::SpawnFailed | WorkerError::RescueSpawnFailed => GopError::ResourceExhausted,
            WorkerError::Panicked => GopError::WorkerError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = GopError::AlreadyQueued;
        assert_eq!(format!("{}", e), "operation already belongs to a queue");

        let e = GopError::WorkerError(WorkerError::Panicked);
        assert_eq!(format!("{}", e), "worker error: worker thread panicked");
    }

    #[test]
    fn test_spawn_failure_is_exhaustion() {
        let e: GopError = WorkerError::RescueSpawnFailed.into();
        assert_eq!(e, GopError::ResourceExhausted);

        let e: GopError = WorkerError::Panicked.into();
        assert!(matches!(e, GopError::WorkerError(WorkerError::Panicked)));
    }
}
