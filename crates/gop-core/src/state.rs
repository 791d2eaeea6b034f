//! Operation lifecycle state and free modes

use core::fmt;

/// Lifecycle state of an operation
///
/// ```text
/// Created --submit--> Queued --picked up--> Running --fn returns--> Completed
/// Created --inline wait--> Running
/// Created | Queued --abort--> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpState {
    /// Built, not yet handed to the pool
    Created = 0,

    /// Submitted, waiting for a worker or overflow thread
    Queued = 1,

    /// User function is executing
    Running = 2,

    /// User function returned (or panicked); status is final
    Completed = 3,

    /// Cancelled before the user function ran
    Aborted = 4,
}

impl OpState {
    /// Check if the op can still be cancelled
    #[inline]
    pub const fn is_abortable(&self) -> bool {
        matches!(self, OpState::Created | OpState::Queued)
    }

    /// Check if the op has reached a terminal state
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OpState::Completed | OpState::Aborted)
    }
}

impl From<u8> for OpState {
    fn from(v: u8) -> Self {
        match v {
            0 => OpState::Created,
            1 => OpState::Queued,
            2 => OpState::Running,
            3 => OpState::Completed,
            4 => OpState::Aborted,
            _ => OpState::Created, // Default for invalid values
        }
    }
}

impl From<OpState> for u8 {
    fn from(state: OpState) -> u8 {
        state as u8
    }
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpState::Created => "created",
            OpState::Queued => "queued",
            OpState::Running => "running",
            OpState::Completed => "completed",
            OpState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// How an op's argument payload is released by `free`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeMode {
    /// Run the payload destructor (or drop the payload) exactly once
    Destroy,

    /// Leave the payload attached for the caller; the destructor is discarded
    Nop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OpState::Created.is_terminal());
        assert!(!OpState::Queued.is_terminal());
        assert!(!OpState::Running.is_terminal());
        assert!(OpState::Completed.is_terminal());
        assert!(OpState::Aborted.is_terminal());
    }

    #[test]
    fn test_abortable_states() {
        assert!(OpState::Created.is_abortable());
        assert!(OpState::Queued.is_abortable());
        assert!(!OpState::Running.is_abortable());
        assert!(!OpState::Completed.is_abortable());
    }

    #[test]
    fn test_u8_roundtrip() {
        for s in [OpState::Created, OpState::Queued, OpState::Running, OpState::Completed, OpState::Aborted] {
            assert_eq!(OpState::from(u8::from(s)), s);
        }
        assert_eq!(OpState::from(200), OpState::Created);
    }
}
