//! Poison-tolerant lock helpers
//!
//! User functions run under `catch_unwind`, so a poisoned lock only means a
//! panic escaped substrate bookkeeping. The guarded data stays consistent at
//! every unlock point, so the poison flag is ignored.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn wait<'a, T>(cv: &Condvar, g: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    cv.wait(g).unwrap_or_else(PoisonError::into_inner)
}

/// Returns the guard and whether the wait timed out
#[inline]
pub(crate) fn wait_timeout<'a, T>(
    cv: &Condvar,
    g: MutexGuard<'a, T>,
    timeout: Duration,
) -> (MutexGuard<'a, T>, bool) {
    let (g, res) = cv
        .wait_timeout(g, timeout)
        .unwrap_or_else(PoisonError::into_inner);
    (g, res.timed_out())
}
