//! # gop - Generic Operation Pool
//!
//! Thread pool, operation records and fan-out/fan-in queues for running
//! large numbers of blocking remote operations without deadlocking, even when
//! operations submit and wait on more work in the same pool.
//!
//! ## Features
//!
//! - **Elastic pools**: `min_threads` kept warm, growth on demand up to `max_threads`
//! - **Operation records**: status, caller tag, private slot, payload destructor
//! - **Queues**: build-then-start batches, wait-any in completion order, wait-all
//! - **Recursion safe**: nested submissions beyond capacity go to rescue threads
//! - **Diagnostics**: counters, per-depth statistics, leveled stderr logging
//!
//! ## Quick Start
//!
//! ```ignore
//! use gop::{OpQueue, OpStatus, PoolContext, Op};
//!
//! fn main() -> gop::GopResult<()> {
//!     let pool = PoolContext::create("io", 0, 8)?;
//!
//!     // One call, blocking
//!     let status = gop::sync_exec(&pool, 41, |n, _| {
//!         *n += 1;
//!         OpStatus::success(0)
//!     });
//!     assert!(status.is_success());
//!
//!     // Fan-out / fan-in
//!     let q = OpQueue::new();
//!     for i in 0..16 {
//!         let op = Op::new(&pool, i, |i, _| OpStatus::SUCCESS.with_value(*i));
//!         op.set_caller_tag(i);
//!         q.add(&op)?;
//!     }
//!     q.start_execution()?;
//!     while let Some(done) = q.wait_any() {
//!         println!("task {} -> {}", done.caller_tag(), done.status());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        Op::new, sync_exec, OpQueue add / wait_any           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Pool Context                            │
//! │     counters, submission routing, drain on destroy          │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                            │
//!          ordinary │                            │ recursive, over capacity
//!                   ▼                            ▼
//!    ┌──────────────────────────┐   ┌──────────────────────────┐
//!    │   Primary workers        │   │   Overflow reserve       │
//!    │   min..max, futex park   │   │   per-depth stacks,      │
//!    │                          │   │   rescue threads         │
//!    └──────────────────────────┘   └──────────────────────────┘
//! ```

// Re-export core types
pub use gop_core::{
    constants,
    FreeMode,
    GopError,
    GopResult,
    OpId,
    OpState,
    OpStatus,
    StatusKind,
    WorkerError,
};

// Re-export kprint macros for debug logging
pub use gop_core::{kprint, kprintln, klog, kerror, kwarn, kinfo, kdebug, ktrace};
pub use gop_core::kprint::{
    LogLevel, init as init_logging, set_log_level, set_flush_enabled, set_time_enabled,
};

// Re-export env utilities
pub use gop_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use gop_runtime::{
    ConfigError,
    LevelStats,
    Op,
    OpQueue,
    PoolConfig,
    PoolContext,
    PoolHandle,
    PoolInfo,
    PoolRegistry,
    PoolSizing,
    StatsSnapshot,
};

/// Run `f(&mut arg)` on `pool` and block until it returns its status
///
/// Safe to call from inside an op running on the same pool. The argument is
/// dropped afterwards; build an [`Op`] directly to get it back.
pub fn sync_exec<A, F>(pool: &PoolHandle, arg: A, f: F) -> OpStatus
where
    A: Send + 'static,
    F: FnOnce(&mut A, OpId) -> OpStatus + Send + 'static,
{
    Op::new(pool, arg, f).sync_exec()
}

/// Check if the calling thread is executing an op of `pool`
#[inline]
pub fn in_pool(pool: &PoolHandle) -> bool {
    pool.is_current()
}
