//! Thread-local storage for the execution context
//!
//! Every thread remembers which pool's op it is currently executing and at
//! what nesting depth. Submission uses this to tell a recursive submission
//! (from inside the same pool) from an ordinary one.

use std::cell::Cell;

/// Pool uid meaning "not executing inside any pool"
pub const NO_POOL: u64 = 0;

thread_local! {
    /// Pool whose op this thread is executing
    static CURRENT_POOL: Cell<u64> = const { Cell::new(NO_POOL) };

    /// Depth of the op this thread is executing (0 when idle)
    static CURRENT_DEPTH: Cell<u32> = const { Cell::new(0) };

    /// Primary worker index for this OS thread
    static WORKER_ID: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// Pool uid of the op executing on this thread, `NO_POOL` if none
#[inline]
pub fn current_pool() -> u64 {
    CURRENT_POOL.with(|c| c.get())
}

/// Depth of the op executing on this thread
#[inline]
pub fn current_depth() -> u32 {
    CURRENT_DEPTH.with(|c| c.get())
}

/// Check if this thread is executing an op of pool `uid`
#[inline]
pub fn in_pool(uid: u64) -> bool {
    uid != NO_POOL && current_pool() == uid
}

/// Depth a new op of pool `uid` gets when created on this thread
#[inline]
pub fn child_depth(uid: u64) -> u32 {
    if in_pool(uid) {
        current_depth() + 1
    } else {
        1
    }
}

/// Set the current worker ID
#[inline]
pub fn set_worker_id(id: usize) {
    WORKER_ID.with(|c| c.set(id));
}

/// Try to get current worker ID, returns None if not on a primary worker
#[inline]
pub fn try_current_worker_id() -> Option<usize> {
    let id = WORKER_ID.with(|c| c.get());
    if id == usize::MAX {
        None
    } else {
        Some(id)
    }
}

/// Marks this thread as executing inside a pool until dropped
///
/// Restores the previous context on drop, so inline execution nested in
/// another pool's op unwinds correctly.
pub struct ExecGuard {
    prev_pool: u64,
    prev_depth: u32,
}

impl ExecGuard {
    pub fn enter(pool: u64, depth: u32) -> Self {
        let guard = ExecGuard {
            prev_pool: current_pool(),
            prev_depth: current_depth(),
        };
        CURRENT_POOL.with(|c| c.set(pool));
        CURRENT_DEPTH.with(|c| c.set(depth));
        guard
    }
}

impl Drop for ExecGuard {
    fn drop(&mut self) {
        CURRENT_POOL.with(|c| c.set(self.prev_pool));
        CURRENT_DEPTH.with(|c| c.set(self.prev_depth));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_nesting() {
        assert_eq!(current_pool(), NO_POOL);
        assert_eq!(child_depth(7), 1);
        {
            let _a = ExecGuard::enter(7, 1);
            assert!(in_pool(7));
            assert_eq!(child_depth(7), 2);
            assert_eq!(child_depth(8), 1);
            {
                let _b = ExecGuard::enter(8, 1);
                assert!(!in_pool(7));
                assert!(in_pool(8));
            }
            assert!(in_pool(7));
            assert_eq!(current_depth(), 1);
        }
        assert_eq!(current_pool(), NO_POOL);
        assert_eq!(current_depth(), 0);
    }

    #[test]
    fn test_no_pool_never_matches() {
        assert!(!in_pool(NO_POOL));
    }

    #[test]
    fn test_worker_id() {
        assert_eq!(try_current_worker_id(), None);
        let id = std::thread::spawn(|| {
            set_worker_id(3);
            try_current_worker_id()
        })
        .join()
        .unwrap();
        assert_eq!(id, Some(3));
    }
}
