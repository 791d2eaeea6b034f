//! Pool context
//!
//! A [`PoolContext`] owns one elastic set of primary workers, the overflow
//! reserve used for recursive submissions, and the pool's counters. Ops hold
//! a [`PoolHandle`] (a cheap clone of the shared state); the context itself
//! owns the lifecycle and drains everything when destroyed or dropped.
//!
//! Submission routing:
//!
//! ```text
//! running += 1                           (ops and direct jobs alike)
//! if this thread is executing an op of this pool
//!    and running > max_concurrency      -> overflow reserve (rescue thread)
//! else                                  -> primary workers
//! ```

use crate::config::{PoolConfig, PoolSizing};
use crate::overflow::OverflowReserve;
use crate::stats::{DepthStats, StatsSnapshot};
use crate::sync::{lock, wait_timeout};
use crate::tls::{self, ExecGuard};
use crate::worker::{Job, WorkerSet};
use gop_core::{kdebug, kerror, kinfo, kwarn, GopError, GopResult, OpId};
use std::fmt;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

static NEXT_POOL_UID: AtomicU64 = AtomicU64::new(1);

/// Advisory counters. All but `running` only ever increase.
#[derive(Default)]
pub(crate) struct PoolCounters {
    pub(crate) created: AtomicU64,
    pub(crate) submitted: AtomicU64,
    pub(crate) started: AtomicU64,
    pub(crate) completed: AtomicU64,
    /// Ops and direct jobs submitted and not yet finished
    pub(crate) running: AtomicUsize,
    pub(crate) direct: AtomicU64,
}

pub(crate) struct PoolShared {
    pub(crate) uid: u64,
    pub(crate) name: String,
    pub(crate) sizing: PoolSizing,
    pub(crate) counters: PoolCounters,
    pub(crate) stats: Option<DepthStats>,
    workers: WorkerSet,
    overflow: Arc<OverflowReserve>,
    /// Ops and direct jobs handed out and not yet finished
    inflight: AtomicUsize,
    drain_lock: Mutex<()>,
    drained: Condvar,
}

impl PoolShared {
    /// Route an op's job to the primary workers or the overflow reserve
    pub(crate) fn submit_op(&self, id: OpId, depth: u32, job: Job) -> GopResult<()> {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let running = self.counters.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.inflight.fetch_add(1, Ordering::AcqRel);

        let res = if tls::in_pool(self.uid) && running > self.sizing.max_concurrency {
            self.overflow.push(depth, id, job)
        } else {
            self.workers.submit(job)
        };

        if let Err(e) = &res {
            kwarn!("pool {}: op {} not submitted: {}", self.name, id, e);
            self.finish_op();
        }
        res
    }

    /// Account for an op about to run in the caller's thread
    pub(crate) fn begin_inline(&self) -> GopResult<()> {
        if self.workers.is_shutdown() {
            return Err(GopError::ShutDown);
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.counters.running.fetch_add(1, Ordering::AcqRel);
        self.inflight.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Balance a `submit_op`, `begin_inline` or `direct`
    pub(crate) fn finish_op(&self) {
        self.counters.running.fetch_sub(1, Ordering::AcqRel);
        self.finish_inflight();
    }

    fn finish_inflight(&self) {
        if self.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = lock(&self.drain_lock);
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut guard = lock(&self.drain_lock);
        while self.inflight.load(Ordering::Acquire) > 0 {
            guard = wait_timeout(&self.drained, guard, Duration::from_millis(100)).0;
        }
    }
}

/// Cloneable handle used to build ops and submit direct jobs
#[derive(Clone)]
pub struct PoolHandle {
    pub(crate) shared: Arc<PoolShared>,
}

impl PoolHandle {
    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Process-unique pool id
    #[inline]
    pub fn uid(&self) -> u64 {
        self.shared.uid
    }

    #[inline]
    pub fn sizing(&self) -> PoolSizing {
        self.shared.sizing
    }

    /// Check if the calling thread is executing an op of this pool
    #[inline]
    pub fn is_current(&self) -> bool {
        tls::in_pool(self.shared.uid)
    }

    /// Run `f` on a pool worker without an op record
    ///
    /// Fire-and-forget: there is no status and nothing to wait on. A panic
    /// in `f` is caught and logged.
    pub fn direct<F>(&self, f: F) -> GopResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        shared.counters.direct.fetch_add(1, Ordering::Relaxed);
        // Holds a primary worker like any op, so it counts toward routing
        shared.counters.running.fetch_add(1, Ordering::AcqRel);
        shared.inflight.fetch_add(1, Ordering::AcqRel);

        let uid = shared.uid;
        let depth = tls::child_depth(uid);
        let job_shared = Arc::clone(shared);
        let res = shared.workers.submit(Box::new(move || {
            {
                let _ctx = ExecGuard::enter(uid, depth);
                if catch_unwind(AssertUnwindSafe(f)).is_err() {
                    kerror!("direct job panicked");
                }
            }
            job_shared.finish_op();
        }));

        if res.is_err() {
            shared.finish_op();
        }
        res
    }

    /// Snapshot of counters and thread usage
    pub fn info(&self) -> PoolInfo {
        let s = &self.shared;
        let c = &s.counters;
        PoolInfo {
            name: s.name.clone(),
            created: c.created.load(Ordering::Relaxed),
            submitted: c.submitted.load(Ordering::Relaxed),
            started: c.started.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            running: c.running.load(Ordering::Relaxed),
            direct: c.direct.load(Ordering::Relaxed),
            overflow: s.overflow.in_overflow(),
            overflow_high_water: s.overflow.high_water(),
            overflow_total: s.overflow.total(),
            rescue_threads: s.overflow.rescue_threads(),
            threads: s.workers.threads(),
            busy: s.workers.busy(),
            idle: s.workers.idle(),
            threads_high_water: s.workers.high_water(),
            pending: s.workers.pending(),
            sizing: s.sizing,
        }
    }

    /// Per-depth statistics, if enabled for this pool
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.shared.stats.as_ref().map(DepthStats::snapshot)
    }
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("name", &self.shared.name)
            .field("uid", &self.shared.uid)
            .finish()
    }
}

/// Owner of a thread pool
///
/// Dereferences to [`PoolHandle`]. Dropping it is the same as
/// [`destroy`](PoolContext::destroy).
pub struct PoolContext {
    handle: PoolHandle,
    destroyed: bool,
}

impl PoolContext {
    /// Create a pool from a full configuration
    pub fn new(config: PoolConfig) -> GopResult<Self> {
        config.validate()?;
        let sizing = config.sizing();
        let workers = WorkerSet::new(&config.name, &sizing)?;
        let overflow = OverflowReserve::new(&config.name, sizing.recursion_depth);

        let shared = Arc::new(PoolShared {
            uid: NEXT_POOL_UID.fetch_add(1, Ordering::Relaxed),
            name: config.name,
            sizing,
            counters: PoolCounters::default(),
            stats: config.stats.then(DepthStats::new),
            workers,
            overflow,
            inflight: AtomicUsize::new(0),
            drain_lock: Mutex::new(()),
            drained: Condvar::new(),
        });

        kdebug!(
            "pool {} created: min={} max={} max_concurrency={} recursion_depth={}",
            shared.name,
            sizing.min_threads,
            sizing.max_threads,
            sizing.max_concurrency,
            sizing.recursion_depth
        );

        Ok(PoolContext {
            handle: PoolHandle { shared },
            destroyed: false,
        })
    }

    /// Create a pool with the given thread bounds; other settings come from
    /// defaults and `GOP_TP_*` environment overrides.
    pub fn create(name: &str, min_threads: usize, max_threads: usize) -> GopResult<Self> {
        Self::new(
            PoolConfig::from_env(name)
                .min_threads(min_threads)
                .max_threads(max_threads),
        )
    }

    /// Cloneable handle for building ops from other threads
    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Drain all queued and running work, then stop and join the workers
    ///
    /// Callers must stop submitting first; later submissions through a
    /// surviving [`PoolHandle`] fail with `GopError::ShutDown`.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let shared = &self.handle.shared;
        if tls::in_pool(shared.uid) {
            kwarn!("pool {} destroyed from one of its own ops, not draining", shared.name);
        } else {
            shared.wait_drained();
        }
        shared.workers.shutdown();

        if let Some(stats) = &shared.stats {
            kinfo!("pool {} depth statistics\n{}", shared.name, stats.snapshot());
        }
        kdebug!("pool {} destroyed\n{}", shared.name, self.handle.info());
    }
}

impl Deref for PoolContext {
    type Target = PoolHandle;

    fn deref(&self) -> &PoolHandle {
        &self.handle
    }
}

impl Drop for PoolContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PoolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolContext")
            .field("name", &self.handle.shared.name)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

/// Point-in-time view of a pool, printable as a diagnostic dump
#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub name: String,
    pub created: u64,
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub running: usize,
    pub direct: u64,
    pub overflow: usize,
    pub overflow_high_water: usize,
    pub overflow_total: u64,
    pub rescue_threads: usize,
    pub threads: usize,
    pub busy: usize,
    pub idle: usize,
    pub threads_high_water: usize,
    pub pending: usize,
    pub sizing: PoolSizing,
}

impl fmt::Display for PoolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Thread pool info ({})", self.name)?;
        writeln!(
            f,
            "  ops: created {} submitted {} started {} completed {} running {} direct {}",
            self.created, self.submitted, self.started, self.completed, self.running, self.direct
        )?;
        writeln!(
            f,
            "  threads: current {} busy {} idle {} high-water {} pending jobs {}",
            self.threads, self.busy, self.idle, self.threads_high_water, self.pending
        )?;
        writeln!(
            f,
            "  overflow: current {} high-water {} total {} rescue threads {}",
            self.overflow, self.overflow_high_water, self.overflow_total, self.rescue_threads
        )?;
        write!(
            f,
            "  sizing: min {} max {} max_concurrency {} recursion_depth {} idle {:?}",
            self.sizing.min_threads,
            self.sizing.max_threads,
            self.sizing.max_concurrency,
            self.sizing.recursion_depth,
            self.sizing.idle_timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;
    use crate::opque::OpQueue;
    use gop_core::OpStatus;
    use std::sync::mpsc;

    fn pool(name: &str, min: usize, max: usize) -> PoolContext {
        PoolContext::new(PoolConfig::new(name).min_threads(min).max_threads(max)).unwrap()
    }

    #[test]
    fn test_create_and_destroy() {
        let p = PoolContext::create("ptest-create", 0, 4).unwrap();
        assert_eq!(p.sizing().max_threads, 4);
        assert_eq!(p.info().threads, 0);
        p.destroy();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = PoolContext::create("ptest-bad", 5, 1).unwrap_err();
        assert!(matches!(err, GopError::InvalidConfig(_)));
    }

    #[test]
    fn test_uids_are_unique() {
        let a = pool("ptest-a", 0, 1);
        let b = pool("ptest-b", 0, 1);
        assert_ne!(a.uid(), b.uid());
    }

    #[test]
    fn test_direct_runs_on_worker_inside_pool() {
        let p = pool("ptest-direct", 1, 2);
        let (tx, rx) = mpsc::channel();
        let h = p.handle();
        p.direct(move || {
            tx.send((h.is_current(), tls::try_current_worker_id().is_some())).unwrap();
        })
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (true, true));
        assert!(!p.is_current());
        assert_eq!(p.info().direct, 1);
    }

    #[test]
    fn test_destroy_drains_direct_jobs() {
        let p = pool("ptest-drain", 0, 2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let done = Arc::clone(&done);
            p.direct(move || {
                std::thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        p.destroy();
        assert_eq!(done.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_direct_after_destroy_fails() {
        let p = pool("ptest-late", 0, 1);
        let h = p.handle();
        p.destroy();
        assert_eq!(h.direct(|| {}), Err(GopError::ShutDown));
    }

    #[test]
    fn test_direct_job_fan_out_is_rescued() {
        // The direct job holds the only worker; both children must overflow
        let p = pool("ptest-direct-fanout", 0, 1);
        let h = p.handle();
        let (tx, rx) = mpsc::channel();
        p.direct(move || {
            let q = OpQueue::new();
            for i in 0..2i64 {
                q.add(&Op::new(&h, i, |i, _| OpStatus::SUCCESS.with_value(*i)))
                    .unwrap();
            }
            q.start_execution().unwrap();
            tx.send(q.wait_all_timeout(Duration::from_secs(5))).unwrap();
        })
        .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(10)).unwrap(),
            Some(OpStatus::SUCCESS)
        );
        assert_eq!(p.info().overflow_total, 2);
        let h = p.handle();
        p.destroy();
        assert_eq!(h.info().running, 0);
    }

    #[test]
    fn test_rescue_spawn_failure_exhausts_op() {
        let p = pool("ptest-exhaust-ovf", 1, 1);
        p.shared.overflow.fail_spawn.store(true, Ordering::Relaxed);
        let h = p.handle();
        let (tx, rx) = mpsc::channel();

        let outer = Op::new(&p, (), move |_, _| {
            let q = OpQueue::new();
            let child = Op::new(&h, (), |_, _| OpStatus::SUCCESS);
            q.add(&child).unwrap();
            let started = q.start_execution();
            tx.send((started, q.wait_all(), q.tasks_failed(), child.status()))
                .unwrap();
            OpStatus::SUCCESS
        });
        outer.start().unwrap();
        assert_eq!(outer.wait(), OpStatus::SUCCESS);

        let (started, all, failed, child) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(started, Err(GopError::ResourceExhausted));
        assert_eq!(all, OpStatus::FAILURE.with_value(1));
        assert_eq!(failed, 1);
        assert_eq!(child, OpStatus::EXHAUSTED);
        assert_eq!(p.info().overflow, 0);

        let h = p.handle();
        p.destroy();
        assert_eq!(h.info().running, 0);
    }

    #[test]
    fn test_worker_spawn_failure_exhausts_op() {
        let p = pool("ptest-exhaust-w", 0, 1);
        p.shared.workers.fail_spawns();

        let op = Op::new(&p, (), |_, _| OpStatus::SUCCESS);
        assert_eq!(op.start(), Err(GopError::ResourceExhausted));
        assert_eq!(op.state(), gop_core::OpState::Completed);
        assert_eq!(op.status(), OpStatus::EXHAUSTED);
        assert_eq!(op.wait(), OpStatus::EXHAUSTED);
        assert_eq!(p.info().running, 0);
        p.destroy();
    }

    #[test]
    fn test_info_display() {
        let p = pool("ptest-info", 0, 3);
        let text = format!("{}", p.info());
        assert!(text.starts_with("Thread pool info (ptest-info)"));
        assert!(text.contains("max 3"));
    }
}
