//! Worker parking mechanism
//!
//! Idle workers sleep on an eventcount: a sequence word that every wake
//! bumps. A worker announces itself with [`WorkerParking::prepare_park`],
//! re-checks the job queue, and only then sleeps on the token it got back.
//! A wake issued anywhere after `prepare_park` changes the sequence, so the
//! sleep returns immediately instead of missing it.
//!
//! ```text
//! worker                          submitter
//! token = prepare_park()          jobs.push(job)
//! if !jobs.is_empty() {           wake_one()   // seq += 1, futex wake
//!     cancel_park(); continue
//! }
//! park(token, timeout)
//! ```

use std::time::Duration;

/// Platform-specific worker parking mechanism
pub trait WorkerParking: Send + Sync {
    /// Register as a parking candidate and snapshot the wake sequence
    ///
    /// Must be followed by exactly one `park` or `cancel_park`.
    fn prepare_park(&self) -> u32;

    /// Withdraw after `prepare_park` because work was found
    fn cancel_park(&self);

    /// Sleep until a wake newer than `token` or the timeout
    ///
    /// Returns:
    /// - `true` if a wake was observed
    /// - `false` on timeout or spurious return
    ///
    /// Workers re-check for work regardless of the return value.
    fn park(&self, token: u32, timeout: Option<Duration>) -> bool;

    /// Wake one parked worker
    fn wake_one(&self);

    /// Wake all parked workers
    ///
    /// Used at shutdown.
    fn wake_all(&self);

    /// Number of workers between `prepare_park` and wake-up (hint, may be stale)
    fn parked_count(&self) -> usize;
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}
