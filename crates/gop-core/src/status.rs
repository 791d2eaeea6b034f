//! Operation result status
//!
//! Every user function returns an [`OpStatus`]: a coarse [`StatusKind`], a
//! fine-grained `error_code` chosen by the caller's domain, and an integer
//! `value` (bytes moved, entries listed, failed-task count for queues).
//! Only [`StatusKind::Success`] counts as success.

use crate::constants::{EXHAUSTED_ERROR_CODE, PANIC_ERROR_CODE};
use core::fmt;

/// Coarse classification of an operation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusKind {
    Success = 0,
    Failure = 1,
    /// Transient condition, the caller may resubmit
    Retry = 2,
    /// Remote side unreachable
    Dead = 3,
    Timeout = 4,
    InvalidHost = 5,
    /// Local error before or after the remote call
    Error = 6,
    /// Cancelled before the user function ran
    Aborted = 7,
    /// Pool or overflow reserve could not obtain a thread
    Exhausted = 8,
}

impl StatusKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Success => "success",
            StatusKind::Failure => "failure",
            StatusKind::Retry => "retry",
            StatusKind::Dead => "dead",
            StatusKind::Timeout => "timeout",
            StatusKind::InvalidHost => "invalid-host",
            StatusKind::Error => "error",
            StatusKind::Aborted => "aborted",
            StatusKind::Exhausted => "exhausted",
        }
    }
}

/// Result of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpStatus {
    pub kind: StatusKind,
    pub error_code: i32,
    pub value: i64,
}

impl OpStatus {
    pub const SUCCESS: OpStatus = OpStatus::new(StatusKind::Success, 0);
    pub const FAILURE: OpStatus = OpStatus::new(StatusKind::Failure, 0);
    pub const RETRY: OpStatus = OpStatus::new(StatusKind::Retry, 0);
    pub const TIMEOUT: OpStatus = OpStatus::new(StatusKind::Timeout, 0);
    /// Status of an op cancelled before dispatch
    pub const ABORTED: OpStatus = OpStatus::new(StatusKind::Aborted, 0);
    /// Status of an op that never got a thread
    pub const EXHAUSTED: OpStatus = OpStatus::new(StatusKind::Exhausted, EXHAUSTED_ERROR_CODE);
    /// Status of an op whose function panicked
    pub const PANICKED: OpStatus = OpStatus::new(StatusKind::Failure, PANIC_ERROR_CODE);

    #[inline]
    pub const fn new(kind: StatusKind, error_code: i32) -> Self {
        OpStatus { kind, error_code, value: 0 }
    }

    /// Success carrying a fine-grained code
    #[inline]
    pub const fn success(error_code: i32) -> Self {
        OpStatus::new(StatusKind::Success, error_code)
    }

    /// Failure carrying a fine-grained code
    #[inline]
    pub const fn failure(error_code: i32) -> Self {
        OpStatus::new(StatusKind::Failure, error_code)
    }

    /// Attach an integer payload
    #[inline]
    pub const fn with_value(mut self, value: i64) -> Self {
        self.value = value;
        self
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self.kind, StatusKind::Success)
    }
}

impl Default for OpStatus {
    fn default() -> Self {
        OpStatus::SUCCESS
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(code={}", self.kind.as_str(), self.error_code)?;
        if self.value != 0 {
            write!(f, ", value={}", self.value)?;
        }
        write!(f, ")")
    }
}
