//! Operation identifier type

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id counter shared by ops and queues. Zero is never handed out.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an operation or an operation queue
///
/// Ids are assigned from a single monotonically increasing counter, so they
/// can be used to correlate completions in logs. The value 0 is reserved as
/// the "no operation" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct OpId(u64);

impl OpId {
    /// Sentinel value indicating no operation
    pub const NONE: OpId = OpId(0);

    /// Allocate the next id
    #[inline]
    pub fn next() -> Self {
        OpId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create an OpId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        OpId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Check if this is a real id
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for OpId {
    #[inline]
    fn from(id: u64) -> Self {
        OpId(id)
    }
}

impl From<OpId> for u64 {
    #[inline]
    fn from(id: OpId) -> Self {
        id.0
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "OpId(NONE)")
        } else {
            write!(f, "OpId({})", self.0)
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for OpId {
    fn default() -> Self {
        OpId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_id_monotonic() {
        let a = OpId::next();
        let b = OpId::next();
        assert!(b > a);
        assert!(a.is_some());
    }

    #[test]
    fn test_op_id_none() {
        let none = OpId::default();
        assert!(none.is_none());
        assert_eq!(format!("{}", none), "none");
        assert_eq!(format!("{:?}", none), "OpId(NONE)");
    }

    #[test]
    fn test_op_id_conversions() {
        let id: OpId = 100u64.into();
        let raw: u64 = id.into();
        assert_eq!(raw, 100);
        assert_eq!(format!("{}", id), "100");
    }
}
