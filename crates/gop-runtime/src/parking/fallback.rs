//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support. The wake sequence lives under
//! the mutex, so the compare-and-sleep is atomic with respect to wakers.

use super::WorkerParking;
use crate::sync::{lock, wait, wait_timeout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Condvar-based parking (fallback)
pub struct FallbackParking {
    /// Wake sequence
    seq: Mutex<u32>,

    /// Condition variable
    condvar: Condvar,

    /// Count of workers between prepare_park and wake-up
    parked: AtomicUsize,
}

impl FallbackParking {
    /// Create a new fallback parking instance
    pub fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn bump(&self) {
        let mut guard = lock(&self.seq);
        *guard = guard.wrapping_add(1);
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FallbackParking {
    fn prepare_park(&self) -> u32 {
        self.parked.fetch_add(1, Ordering::SeqCst);
        *lock(&self.seq)
    }

    fn cancel_park(&self) {
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }

    fn park(&self, token: u32, timeout: Option<Duration>) -> bool {
        let mut guard = lock(&self.seq);
        if *guard == token {
            guard = match timeout {
                Some(t) => wait_timeout(&self.condvar, guard, t).0,
                None => wait(&self.condvar, guard),
            };
        }
        let woken = *guard != token;
        drop(guard);

        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn wake_one(&self) {
        self.bump();
        if self.parked.load(Ordering::SeqCst) > 0 {
            self.condvar.notify_one();
        }
    }

    fn wake_all(&self) {
        self.bump();
        if self.parked.load(Ordering::SeqCst) > 0 {
            self.condvar.notify_all();
        }
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_token_returns_immediately() {
        let p = FallbackParking::new();
        let token = p.prepare_park();
        p.wake_one();
        assert!(p.park(token, None));
    }
}
