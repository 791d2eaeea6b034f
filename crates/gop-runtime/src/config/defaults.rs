//! Library defaults for pool configuration.
//!
//! Each value can be overridden at runtime through the matching
//! `GOP_TP_*` environment variable (see [`PoolConfig::from_env`]).
//!
//! [`PoolConfig::from_env`]: super::PoolConfig::from_env

use gop_core::constants;

/// Workers spawned eagerly at pool creation and kept alive while idle
pub const MIN_THREADS: usize = constants::DEFAULT_MIN_THREADS;

/// Upper bound on primary workers
pub const MAX_THREADS: usize = constants::DEFAULT_MAX_THREADS;

/// Nested submission levels tracked by the overflow reserve
pub const MAX_RECURSION: usize = constants::DEFAULT_MAX_RECURSION;

/// How long a surplus idle worker lingers before exiting
pub const IDLE_TIMEOUT_MS: u64 = constants::DEFAULT_IDLE_TIMEOUT_MS;

/// Per-depth concurrency statistics
pub const STATS: bool = false;

/// Floor and ceiling for `min_threads` when sizing from a core count
pub const CORES_MIN_THREADS_FLOOR: usize = 1;
pub const CORES_MIN_THREADS_CEIL: usize = 10;

/// Sanity ceiling for `max_threads`
pub const MAX_THREADS_LIMIT: usize = 100_000;
