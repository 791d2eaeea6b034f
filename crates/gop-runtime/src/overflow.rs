//! Overflow reserve for recursive submissions
//!
//! When an op running inside a pool submits more work to the same pool and
//! the pool is already at `max_concurrency`, the new job lands here instead
//! of the primary queue. Each push spawns a rescue thread outside the
//! primary worker set; rescue threads drain the reserve deepest level first
//! and exit once it is empty. The primary pool never grows past
//! `max_threads`.

use crate::sync::lock;
use crate::worker::Job;
use gop_core::{kdebug, kerror, kprint, kwarn, GopError, GopResult, OpId};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

struct Entry {
    id: OpId,
    job: Job,
}

/// Per-depth stacks of pending recursive jobs plus the rescue thread group
pub struct OverflowReserve {
    name: String,
    /// One stack per depth level; index 0 is unused by real ops (depth >= 1)
    levels: Mutex<Vec<Vec<Entry>>>,
    /// Jobs queued here or running on a rescue thread
    active: AtomicUsize,
    high_water: AtomicUsize,
    rescue_threads: AtomicUsize,
    next_rescue: AtomicUsize,
    total: AtomicU64,
    #[cfg(test)]
    pub(crate) fail_spawn: std::sync::atomic::AtomicBool,
}

impl OverflowReserve {
    pub fn new(name: &str, recursion_depth: usize) -> Arc<Self> {
        let depth = recursion_depth.max(1);
        Arc::new(OverflowReserve {
            name: name.to_string(),
            levels: Mutex::new((0..depth).map(|_| Vec::new()).collect()),
            active: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            rescue_threads: AtomicUsize::new(0),
            next_rescue: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            #[cfg(test)]
            fail_spawn: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Park `job` at `depth` and start a rescue thread for it
    ///
    /// If no thread can be spawned the job is withdrawn again and
    /// `ResourceExhausted` is returned, unless a running rescue thread
    /// already claimed it.
    pub fn push(self: &Arc<Self>, depth: u32, id: OpId, job: Job) -> GopResult<()> {
        let slot = {
            let mut levels = lock(&self.levels);
            let mut slot = depth as usize;
            if slot >= levels.len() {
                kwarn!(
                    "pool {}: op {} depth {} beyond recursion limit {}, clamping",
                    self.name,
                    id,
                    depth,
                    levels.len() - 1
                );
                slot = levels.len() - 1;
            }
            levels[slot].push(Entry { id, job });
            slot
        };

        let n = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(n, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        kdebug!("pool {}: op {} to overflow at depth {} ({} active)", self.name, id, depth, n);

        if let Err(e) = self.spawn_rescue() {
            kerror!("pool {}: overflow thread spawn failed: {}", self.name, e);
            let mut levels = lock(&self.levels);
            if let Some(pos) = levels[slot].iter().rposition(|e| e.id == id) {
                let entry = levels[slot].remove(pos);
                drop(levels);
                drop(entry);
                self.active.fetch_sub(1, Ordering::AcqRel);
                return Err(GopError::ResourceExhausted);
            }
        }
        Ok(())
    }

    fn spawn_rescue(self: &Arc<Self>) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_spawn.load(Ordering::Relaxed) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "spawn disabled"));
        }

        let rescue_id = self.next_rescue.fetch_add(1, Ordering::Relaxed);
        let reserve = Arc::clone(self);
        thread::Builder::new()
            .name(format!("{}-ovf{}", self.name, rescue_id))
            .spawn(move || reserve.rescue_loop(rescue_id))
            .map(drop)
    }

    fn pop_deepest(&self) -> Option<Entry> {
        let mut levels = lock(&self.levels);
        levels.iter_mut().rev().find_map(|level| level.pop())
    }

    fn rescue_loop(&self, rescue_id: usize) {
        kprint::set_thread_tag(format!("{}/ovf{}", self.name, rescue_id));
        self.rescue_threads.fetch_add(1, Ordering::AcqRel);

        while let Some(entry) = self.pop_deepest() {
            if catch_unwind(AssertUnwindSafe(entry.job)).is_err() {
                kerror!("overflow job for op {} panicked", entry.id);
            }
            self.active.fetch_sub(1, Ordering::AcqRel);
        }

        self.rescue_threads.fetch_sub(1, Ordering::AcqRel);
    }

    /// Jobs currently queued in or running from the reserve
    #[inline]
    pub fn in_overflow(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Most jobs ever in the reserve at once
    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    /// Live rescue threads
    #[inline]
    pub fn rescue_threads(&self) -> usize {
        self.rescue_threads.load(Ordering::Relaxed)
    }

    /// Jobs ever routed through the reserve
    #[inline]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of depth levels
    pub fn depth_levels(&self) -> usize {
        lock(&self.levels).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn wait_drained(r: &OverflowReserve) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while r.in_overflow() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_push_runs_job() {
        let r = OverflowReserve::new("otest", 3);
        let (tx, rx) = mpsc::channel();
        r.push(1, OpId::next(), Box::new(move || tx.send(5).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 5);
        wait_drained(&r);
        assert_eq!(r.in_overflow(), 0);
        assert_eq!(r.total(), 1);
        assert!(r.high_water() >= 1);
    }

    #[test]
    fn test_deepest_level_first() {
        let r = OverflowReserve::new("otest", 4);
        let (tx, rx) = mpsc::channel();

        // Stage entries directly so no rescue thread races the ordering
        {
            let mut levels = lock(&r.levels);
            for depth in [1usize, 3, 2] {
                let tx = tx.clone();
                levels[depth].push(Entry {
                    id: OpId::next(),
                    job: Box::new(move || tx.send(depth).unwrap()),
                });
                r.active.fetch_add(1, Ordering::AcqRel);
            }
        }
        r.rescue_loop(0);

        let order: Vec<usize> = rx.try_iter().collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(r.in_overflow(), 0);
    }

    #[test]
    fn test_depth_beyond_limit_is_clamped() {
        let r = OverflowReserve::new("otest", 2);
        assert_eq!(r.depth_levels(), 2);
        let (tx, rx) = mpsc::channel();
        r.push(50, OpId::next(), Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_spawn_failure_withdraws_job() {
        let r = OverflowReserve::new("otest", 3);
        r.fail_spawn.store(true, Ordering::Relaxed);
        let ran = Arc::new(AtomicUsize::new(0));
        let job_ran = Arc::clone(&ran);
        let err = r
            .push(2, OpId::next(), Box::new(move || {
                job_ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap_err();

        assert_eq!(err, GopError::ResourceExhausted);
        assert_eq!(r.in_overflow(), 0);
        assert_eq!(r.total(), 1);
        assert!(r.pop_deepest().is_none());
        // Withdrawn job is dropped, never run
        assert_eq!(Arc::strong_count(&ran), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
