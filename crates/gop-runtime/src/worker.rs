//! Primary worker thread management
//!
//! Workers are OS threads that pull boxed jobs from a lock-free queue.
//! The set is elastic: `min_threads` are spawned eagerly and never retire,
//! more are spawned on demand up to `max_threads` when jobs outnumber the
//! parked workers, and a worker above the minimum exits after sitting idle
//! for `idle_timeout`.

use crate::config::PoolSizing;
use crate::parking::{new_parking, WorkerParking};
use crate::sync::lock;
use crate::tls;
use crossbeam_queue::SegQueue;
use gop_core::{kdebug, kerror, kprint, kwarn, GopError, GopResult, WorkerError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Unit of work handed to a worker
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared state between submitters and workers.
struct WorkerInner {
    name: String,
    /// Pending jobs: submitters -> workers.
    jobs: SegQueue<Job>,
    parking: Box<dyn WorkerParking>,
    min_threads: usize,
    max_threads: usize,
    idle_timeout: Duration,
    /// Live worker threads.
    threads: AtomicUsize,
    /// Workers currently running a job.
    busy: AtomicUsize,
    high_water: AtomicUsize,
    next_id: AtomicUsize,
    shutdown: AtomicBool,
    #[cfg(test)]
    fail_spawn: AtomicBool,
}

impl WorkerInner {
    /// Give up this worker's slot unless it is needed.
    fn try_retire(&self) -> bool {
        let mut n = self.threads.load(Ordering::Acquire);
        loop {
            if n <= self.min_threads {
                return false;
            }
            match self
                .threads
                .compare_exchange_weak(n, n - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(cur) => n = cur,
            }
        }

        // A job pushed while we were deciding may have skipped spawning
        // because we still counted as parked.
        fence(Ordering::SeqCst);
        if !self.jobs.is_empty() && !self.shutdown.load(Ordering::Acquire) {
            if self.reserve_slot() {
                return false;
            }
        }
        true
    }

    /// Claim a thread slot below `max_threads`
    fn reserve_slot(&self) -> bool {
        let mut n = self.threads.load(Ordering::Acquire);
        loop {
            if n >= self.max_threads {
                return false;
            }
            match self
                .threads
                .compare_exchange_weak(n, n + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.high_water.fetch_max(n + 1, Ordering::Relaxed);
                    return true;
                }
                Err(cur) => n = cur,
            }
        }
    }
}

/// Elastic set of primary worker threads
pub struct WorkerSet {
    inner: Arc<WorkerInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerSet {
    /// Create the set and spawn `min_threads` workers
    pub fn new(name: &str, sizing: &PoolSizing) -> GopResult<Self> {
        let set = WorkerSet {
            inner: Arc::new(WorkerInner {
                name: name.to_string(),
                jobs: SegQueue::new(),
                parking: new_parking(),
                min_threads: sizing.min_threads,
                max_threads: sizing.max_threads,
                idle_timeout: sizing.idle_timeout,
                threads: AtomicUsize::new(0),
                busy: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                #[cfg(test)]
                fail_spawn: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::with_capacity(sizing.max_threads.min(64))),
        };

        for _ in 0..sizing.min_threads {
            if let Err(e) = set.try_spawn() {
                set.shutdown();
                return Err(e.into());
            }
        }
        Ok(set)
    }

    /// Queue a job for the workers
    ///
    /// Fails with `ResourceExhausted` only when no worker exists and none
    /// can be spawned; the job is dropped in that case.
    pub fn submit(&self, job: Job) -> GopResult<()> {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::Acquire) {
            return Err(GopError::ShutDown);
        }

        if inner.threads.load(Ordering::Acquire) == 0 {
            if let Err(e) = self.try_spawn() {
                if inner.threads.load(Ordering::Acquire) == 0 {
                    kerror!("pool {}: cannot start any worker", inner.name);
                    return Err(e.into());
                }
            }
        }

        inner.jobs.push(job);
        fence(Ordering::SeqCst);

        if inner.jobs.len() > inner.parking.parked_count() {
            if let Err(e) = self.try_spawn() {
                kwarn!("pool {}: {}, job stays queued", inner.name, e);
            }
        }
        inner.parking.wake_one();
        Ok(())
    }

    /// Spawn one more worker if below `max_threads`
    ///
    /// Returns `Ok(false)` when already at the limit.
    fn try_spawn(&self) -> Result<bool, WorkerError> {
        let inner = &self.inner;
        if !inner.reserve_slot() {
            return Ok(false);
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let worker_inner = Arc::clone(inner);
        let spawned = spawn_worker(inner, id, worker_inner);

        match spawned {
            Ok(handle) => {
                let mut handles = lock(&self.handles);
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                Ok(true)
            }
            Err(e) => {
                inner.threads.fetch_sub(1, Ordering::AcqRel);
                kwarn!("pool {}: worker spawn failed: {}", inner.name, e);
                Err(WorkerError::SpawnFailed)
            }
        }
    }

    /// Stop accepting jobs, let workers drain the queue, and join them
    ///
    /// When called from one of this set's own workers, that worker is not
    /// joined; it exits once its current job returns.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.parking.wake_all();

        let handles = std::mem::take(&mut *lock(&self.handles));
        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                kerror!("pool {}: worker thread panicked", self.inner.name);
            }
        }
    }

    /// Make every later thread spawn fail
    #[cfg(test)]
    pub(crate) fn fail_spawns(&self) {
        self.inner.fail_spawn.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Live worker threads
    #[inline]
    pub fn threads(&self) -> usize {
        self.inner.threads.load(Ordering::Relaxed)
    }

    /// Workers currently running a job
    #[inline]
    pub fn busy(&self) -> usize {
        self.inner.busy.load(Ordering::Relaxed)
    }

    /// Workers parked waiting for a job
    #[inline]
    pub fn idle(&self) -> usize {
        self.inner.parking.parked_count()
    }

    /// Most workers ever alive at once
    #[inline]
    pub fn high_water(&self) -> usize {
        self.inner.high_water.load(Ordering::Relaxed)
    }

    /// Jobs waiting for a worker
    #[inline]
    pub fn pending(&self) -> usize {
        self.inner.jobs.len()
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        // Workers exit once the queue is empty; joining is shutdown()'s job.
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.parking.wake_all();
    }
}

fn spawn_worker(
    inner: &WorkerInner,
    id: usize,
    worker_inner: Arc<WorkerInner>,
) -> std::io::Result<JoinHandle<()>> {
    #[cfg(test)]
    if inner.fail_spawn.load(Ordering::Relaxed) {
        return Err(std::io::Error::new(std::io::ErrorKind::Other, "spawn disabled"));
    }

    thread::Builder::new()
        .name(format!("{}-w{}", inner.name, id))
        .spawn(move || worker_loop(worker_inner, id))
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<WorkerInner>, id: usize) {
    tls::set_worker_id(id);
    kprint::set_thread_tag(format!("{}/w{}", inner.name, id));
    kdebug!("worker started");

    loop {
        if let Some(job) = inner.jobs.pop() {
            inner.busy.fetch_add(1, Ordering::Relaxed);
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                kerror!("job panicked outside operation bookkeeping");
            }
            inner.busy.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            inner.threads.fetch_sub(1, Ordering::AcqRel);
            break;
        }

        let token = inner.parking.prepare_park();
        if !inner.jobs.is_empty() || inner.shutdown.load(Ordering::SeqCst) {
            inner.parking.cancel_park();
            continue;
        }

        let woken = inner.parking.park(token, Some(inner.idle_timeout));
        if !woken && inner.jobs.is_empty() && inner.try_retire() {
            kdebug!("worker idle for {:?}, retiring", inner.idle_timeout);
            break;
        }
    }

    kdebug!("worker exiting");
}
