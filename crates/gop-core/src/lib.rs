//! # gop-core
//!
//! Core types for the gop (generic operation) execution substrate.
//!
//! This crate is platform-agnostic and spawns no threads.
//! Worker threads, parking and the pool itself live in `gop-runtime`.
//!
//! ## Modules
//!
//! - `id` - Operation and queue identifier type
//! - `state` - Operation lifecycle states
//! - `status` - Operation result (kind, error code, value)
//! - `error` - Substrate error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod status;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::OpId;
pub use state::{FreeMode, OpState};
pub use status::{OpStatus, StatusKind};
pub use error::{GopError, GopResult, WorkerError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

/// Pool sizing constants
pub mod constants {
    /// Default minimum number of primary workers
    pub const DEFAULT_MIN_THREADS: usize = 1;

    /// Default maximum number of primary workers
    pub const DEFAULT_MAX_THREADS: usize = 4;

    /// Default number of nested submission levels before clamping
    pub const DEFAULT_MAX_RECURSION: usize = 10;

    /// Hard ceiling on recursion levels tracked by the overflow reserve
    /// and the depth statistics table
    pub const MAX_RECURSION_DEPTH: usize = 100;

    /// Default time a surplus idle worker lingers before exiting (1s)
    pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 1000;

    /// Error code stored in the status of an op whose function panicked
    pub const PANIC_ERROR_CODE: i32 = -1;

    /// Error code stored in the status of an op that could not get a thread
    pub const EXHAUSTED_ERROR_CODE: i32 = -2;
}
