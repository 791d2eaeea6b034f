//! Operation queue: fan-out / fan-in coordinator
//!
//! An [`OpQueue`] collects ops, dispatches them (immediately, or in one
//! batch at [`start_execution`](OpQueue::start_execution)), and hands them
//! back in completion order. It has no capacity limit; callers throttle with
//! [`tasks_left`](OpQueue::tasks_left):
//!
//! ```ignore
//! let q = OpQueue::new();
//! q.start_execution()?;
//! for path in paths {
//!     q.add(&remove_op(&pool, path))?;
//!     if q.tasks_left() > np {
//!         if let Some(done) = q.wait_any() {
//!             failed += !done.status().is_success() as usize;
//!             done.free(FreeMode::Destroy);
//!         }
//!     }
//! }
//! q.wait_all();
//! ```
//!
//! A queue holding a single op that was never started runs it inline in the
//! waiting thread. `sync_exec` relies on this to stay deadlock-free inside
//! saturated pools.

use crate::op::Op;
use crate::sync::{lock, wait, wait_timeout};
use gop_core::{kdebug, kwarn, FreeMode, GopResult, OpId, OpStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct QueueState {
    started: bool,
    /// Added before start, not yet submitted
    pending: Vec<Op>,
    /// Added and not yet completed
    outstanding: HashMap<OpId, Op>,
    /// Completed, not yet returned by wait_any / get_next_finished
    finished: VecDeque<Op>,
    /// Completed unsuccessfully, not yet returned by get_next_failed
    failed: VecDeque<Op>,
    n_added: usize,
    n_completed: usize,
    n_failed: usize,
}

impl QueueState {
    fn file_completed(&mut self, op: &Op) {
        self.n_completed += 1;
        if !op.status().is_success() {
            self.n_failed += 1;
            self.failed.push_back(op.clone());
        }
        self.finished.push_back(op.clone());
    }

    fn overall(&self) -> OpStatus {
        if self.n_failed == 0 {
            OpStatus::SUCCESS
        } else {
            OpStatus::FAILURE.with_value(self.n_failed as i64)
        }
    }

    fn all_done(&self) -> bool {
        self.n_completed == self.n_added
    }
}

pub(crate) struct QueueInner {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl QueueInner {
    /// Completion callback from an op that belongs to this queue
    pub(crate) fn op_completed(&self, op: &Op) {
        let mut s = lock(&self.state);
        if s.outstanding.remove(&op.id()).is_none() {
            return;
        }
        s.file_completed(op);
        drop(s);
        self.cond.notify_all();
    }
}

/// Fan-out / fan-in coordinator for a set of ops
pub struct OpQueue {
    id: OpId,
    inner: Arc<QueueInner>,
}

impl OpQueue {
    pub fn new() -> Self {
        OpQueue {
            id: OpId::next(),
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> OpId {
        self.id
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.inner.state)
    }

    /// Add an op. Submitted at once if the queue is started, held otherwise.
    ///
    /// Fails with `AlreadyQueued` if the op ever joined a queue, or with the
    /// submission error (the op is then completed as exhausted and still
    /// counted here).
    pub fn add(&self, op: &Op) -> GopResult<()> {
        let submit_now = {
            let mut s = self.state();
            let already_done = op.attach_queue(Arc::downgrade(&self.inner))?;
            s.n_added += 1;
            if already_done {
                s.file_completed(op);
                false
            } else {
                s.outstanding.insert(op.id(), op.clone());
                if !s.started {
                    s.pending.push(op.clone());
                }
                s.started
            }
        };
        self.inner.cond.notify_all();

        if submit_now {
            op.start()?;
        }
        Ok(())
    }

    /// Mark the queue started and submit everything held so far
    ///
    /// Returns the first submission error; every op is still attempted.
    pub fn start_execution(&self) -> GopResult<()> {
        let pending = {
            let mut s = self.state();
            s.started = true;
            std::mem::take(&mut s.pending)
        };
        if !pending.is_empty() {
            kdebug!("queue {}: starting {} ops", self.id, pending.len());
        }

        let mut first_err = None;
        for op in pending {
            if let Err(e) = op.start() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Start before waiting; a lone unstarted op runs inline
    fn kick(&self) {
        let inline = {
            let mut s = self.state();
            if s.started {
                return;
            }
            if s.pending.len() == 1 && s.outstanding.len() == 1 {
                s.started = true;
                s.pending.pop()
            } else {
                None
            }
        };

        match inline {
            Some(op) => op.run_inline(),
            None => self.start_pending(),
        }
    }

    /// Start before a timed wait; nothing runs in the calling thread
    fn start_pending(&self) {
        if let Err(e) = self.start_execution() {
            kwarn!("queue {}: {}", self.id, e);
        }
    }

    /// Block until the next op completes and return it
    ///
    /// Ops come back in completion order, each exactly once. Returns `None`
    /// when every added op has been returned.
    pub fn wait_any(&self) -> Option<Op> {
        self.kick();
        let mut s = self.state();
        loop {
            if let Some(op) = s.finished.pop_front() {
                return Some(op);
            }
            if s.all_done() {
                return None;
            }
            s = wait(&self.inner.cond, s);
        }
    }

    /// Like [`wait_any`](OpQueue::wait_any) but gives up after `timeout`
    ///
    /// An unstarted queue is started first; even a lone op goes to the pool
    /// so the timeout holds.
    pub fn wait_any_timeout(&self, timeout: Duration) -> Option<Op> {
        self.start_pending();
        let deadline = Instant::now() + timeout;
        let mut s = self.state();
        loop {
            if let Some(op) = s.finished.pop_front() {
                return Some(op);
            }
            let now = Instant::now();
            if s.all_done() || now >= deadline {
                return None;
            }
            s = wait_timeout(&self.inner.cond, s, deadline - now).0;
        }
    }

    /// Block until every added op has completed
    ///
    /// Returns success if none failed, otherwise a failure whose `value` is
    /// the number of failed ops. Completed ops stay available through
    /// `wait_any` and `get_next_finished`.
    pub fn wait_all(&self) -> OpStatus {
        self.kick();
        let mut s = self.state();
        while !s.all_done() {
            s = wait(&self.inner.cond, s);
        }
        s.overall()
    }

    /// Like [`wait_all`](OpQueue::wait_all); `None` if ops are still
    /// outstanding after `timeout`
    pub fn wait_all_timeout(&self, timeout: Duration) -> Option<OpStatus> {
        self.start_pending();
        let deadline = Instant::now() + timeout;
        let mut s = self.state();
        while !s.all_done() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            s = wait_timeout(&self.inner.cond, s, deadline - now).0;
        }
        Some(s.overall())
    }

    /// Added minus completed
    pub fn tasks_left(&self) -> usize {
        let s = self.state();
        s.n_added - s.n_completed
    }

    pub fn tasks_failed(&self) -> usize {
        self.state().n_failed
    }

    pub fn tasks_finished(&self) -> usize {
        self.state().n_completed
    }

    /// Ops ever added
    pub fn task_count(&self) -> usize {
        self.state().n_added
    }

    /// Next failed op, without blocking
    pub fn get_next_failed(&self) -> Option<Op> {
        self.state().failed.pop_front()
    }

    /// Next completed op not yet returned, without blocking
    pub fn get_next_finished(&self) -> Option<Op> {
        self.state().finished.pop_front()
    }

    /// Would `wait_any` block right now
    pub fn will_block(&self) -> bool {
        let s = self.state();
        s.finished.is_empty() && !s.all_done()
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Free every op the queue still references
    pub fn free(self, mode: FreeMode) {
        let ops: HashMap<OpId, Op> = {
            let mut s = self.state();
            let mut ops = std::mem::take(&mut s.outstanding);
            let rest = std::mem::take(&mut s.pending)
                .into_iter()
                .chain(std::mem::take(&mut s.finished))
                .chain(std::mem::take(&mut s.failed));
            for op in rest {
                ops.entry(op.id()).or_insert(op);
            }
            ops
        };
        for op in ops.into_values() {
            op.free(mode);
        }
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state();
        f.debug_struct("OpQueue")
            .field("id", &self.id)
            .field("started", &s.started)
            .field("added", &s.n_added)
            .field("completed", &s.n_completed)
            .field("failed", &s.n_failed)
            .finish()
    }
}
