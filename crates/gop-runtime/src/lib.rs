//! # gop-runtime
//!
//! Threaded execution core for the gop substrate.
//!
//! This crate provides:
//! - Pool contexts with an elastic set of primary workers
//! - Operation records (`Op`) with wait, abort and payload lifecycle
//! - Operation queues for fan-out / fan-in
//! - An overflow reserve that keeps recursive submissions from deadlocking
//! - Worker parking (futex on Linux, condvar elsewhere)
//! - A named, reference-counted pool registry

pub mod config;
pub mod op;
pub mod opque;
pub mod overflow;
pub mod parking;
pub mod pool;
pub mod registry;
pub mod stats;
pub mod tls;
pub mod worker;

mod sync;

// Re-exports
pub use config::{ConfigError, PoolConfig, PoolSizing};
pub use op::Op;
pub use opque::OpQueue;
pub use parking::{new_parking, WorkerParking};
pub use pool::{PoolContext, PoolHandle, PoolInfo};
pub use registry::PoolRegistry;
pub use stats::{LevelStats, StatsSnapshot};
