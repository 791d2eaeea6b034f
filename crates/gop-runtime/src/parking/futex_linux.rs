//! Linux futex-based worker parking
//!
//! Futex word semantics: a wake sequence. Every wake increments it, a parking
//! worker sleeps only while it still holds the value it saw in
//! `prepare_park`. The kernel compares the word atomically with the sleep, so
//! a wake racing with `FUTEX_WAIT` turns into an immediate `EAGAIN` return.

use super::WorkerParking;
use std::sync::atomic::{fence, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Linux futex-based parking
pub struct FutexParking {
    /// Futex word: wake sequence
    seq: AtomicU32,

    /// Count of workers between prepare_park and wake-up
    parked: AtomicUsize,
}

impl FutexParking {
    /// Create a new futex parking instance
    pub fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn futex_wake(&self, n: i32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.seq.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                n,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FutexParking {
    fn prepare_park(&self) -> u32 {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let token = self.seq.load(Ordering::SeqCst);
        // Order the caller's queue re-check after the announcement
        fence(Ordering::SeqCst);
        token
    }

    fn cancel_park(&self) {
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }

    fn park(&self, token: u32, timeout: Option<Duration>) -> bool {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });

        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // FUTEX_WAIT: sleep while seq == token
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.seq.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                token,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }

        self.parked.fetch_sub(1, Ordering::SeqCst);

        // ETIMEDOUT, EAGAIN and EINTR all land here; the sequence says
        // whether a wake actually happened.
        self.seq.load(Ordering::SeqCst) != token
    }

    fn wake_one(&self) {
        // Bump first so a worker between prepare_park and FUTEX_WAIT bails out
        self.seq.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return; // No one to wake
        }
        self.futex_wake(1);
    }

    fn wake_all(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.futex_wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
