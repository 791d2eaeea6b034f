//! Operation record ("gop")
//!
//! An [`Op`] wraps a user function and its argument payload so the pool can
//! queue it, run it once, and let any number of handles wait on the result.
//! `Op` is a cheap cloneable handle; the record lives until the last handle
//! is dropped, so status stays readable after [`Op::free`].
//!
//! Locking: an op's control lock is never held while taking a queue lock.
//! Queues take their own lock first and then the op's (see `opque`).

use crate::opque::{OpQueue, QueueInner};
use crate::pool::{PoolHandle, PoolShared};
use crate::sync::{lock, wait, wait_timeout};
use crate::tls::{self, ExecGuard};
use gop_core::{kerror, ktrace, FreeMode, GopError, GopResult, OpId, OpState, OpStatus, StatusKind};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

type Payload = Box<dyn Any + Send>;
type UserFn = Box<dyn FnOnce(&mut (dyn Any + Send + 'static), OpId) -> OpStatus + Send>;
type Destructor = Box<dyn FnOnce(Payload) + Send>;

struct OpCtl {
    state: OpState,
    status: OpStatus,
    func: Option<UserFn>,
    payload: Option<Payload>,
    destructor: Option<Destructor>,
    private: Option<Arc<dyn Any + Send + Sync>>,
    queue: Option<Weak<QueueInner>>,
    /// Set once the op joins a queue; never cleared
    in_queue: bool,
    /// `free(Destroy)` requested while running
    destroy_pending: bool,
}

struct OpCore {
    id: OpId,
    depth: u32,
    pool: Arc<PoolShared>,
    caller_tag: AtomicI64,
    ctl: Mutex<OpCtl>,
    done: Condvar,
}

impl Drop for OpCore {
    fn drop(&mut self) {
        let ctl = self.ctl.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let (Some(payload), Some(destructor)) = (ctl.payload.take(), ctl.destructor.take()) {
            destructor(payload);
        }
    }
}

/// Handle to an operation record
#[derive(Clone)]
pub struct Op(Arc<OpCore>);

impl Op {
    /// Build an op bound to `pool`. Nothing is submitted yet.
    ///
    /// `f` receives the payload and the op's id and reports its outcome as an
    /// [`OpStatus`]. A panic inside `f` becomes [`OpStatus::PANICKED`].
    pub fn new<A, F>(pool: &PoolHandle, arg: A, f: F) -> Op
    where
        A: Send + 'static,
        F: FnOnce(&mut A, OpId) -> OpStatus + Send + 'static,
    {
        let shared = Arc::clone(&pool.shared);
        shared.counters.created.fetch_add(1, Ordering::Relaxed);
        let depth = tls::child_depth(shared.uid);

        let func: UserFn = Box::new(move |arg: &mut (dyn Any + Send + 'static), id| match arg.downcast_mut::<A>() {
            Some(a) => f(a, id),
            None => OpStatus::new(StatusKind::Error, 0),
        });

        Op(Arc::new(OpCore {
            id: OpId::next(),
            depth,
            pool: shared,
            caller_tag: AtomicI64::new(0),
            ctl: Mutex::new(OpCtl {
                state: OpState::Created,
                status: OpStatus::SUCCESS,
                func: Some(func),
                payload: Some(Box::new(arg)),
                destructor: None,
                private: None,
                queue: None,
                in_queue: false,
                destroy_pending: false,
            }),
            done: Condvar::new(),
        }))
    }

    /// Remember a destructor for the payload, run by `free(FreeMode::Destroy)`
    /// or when the last handle drops
    pub fn with_destructor<A, D>(self, d: D) -> Op
    where
        A: Send + 'static,
        D: FnOnce(A) + Send + 'static,
    {
        let destructor: Destructor = Box::new(move |p: Payload| {
            if let Ok(a) = p.downcast::<A>() {
                d(*a);
            }
        });
        lock(&self.0.ctl).destructor = Some(destructor);
        self
    }

    #[inline]
    pub fn id(&self) -> OpId {
        self.0.id
    }

    /// Nesting depth: 1 for ops built outside the pool, parent depth + 1 for
    /// ops built while executing one of its ops
    #[inline]
    pub fn depth(&self) -> u32 {
        self.0.depth
    }

    #[inline]
    pub fn set_caller_tag(&self, tag: i64) {
        self.0.caller_tag.store(tag, Ordering::Relaxed);
    }

    #[inline]
    pub fn caller_tag(&self) -> i64 {
        self.0.caller_tag.load(Ordering::Relaxed)
    }

    pub fn set_private(&self, private: Arc<dyn Any + Send + Sync>) {
        lock(&self.0.ctl).private = Some(private);
    }

    /// Private slot, if set and of type `T`
    pub fn private<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let p = lock(&self.0.ctl).private.clone()?;
        p.downcast::<T>().ok()
    }

    pub fn status(&self) -> OpStatus {
        lock(&self.0.ctl).status
    }

    pub fn state(&self) -> OpState {
        lock(&self.0.ctl).state
    }

    /// Completed or aborted
    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn pool(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.0.pool),
        }
    }

    /// Submit to the pool. A no-op unless the op is still `Created`.
    ///
    /// On failure the op is completed with [`OpStatus::EXHAUSTED`] (or
    /// [`OpStatus::ABORTED`] if the pool is shut down) so waiters return.
    pub fn start(&self) -> GopResult<()> {
        {
            let mut c = lock(&self.0.ctl);
            if c.state != OpState::Created {
                return Ok(());
            }
            c.state = OpState::Queued;
        }

        let op = self.clone();
        let res = self
            .0
            .pool
            .submit_op(self.0.id, self.0.depth, Box::new(move || op.execute()));

        if let Err(e) = &res {
            let (state, status) = match e {
                GopError::ShutDown => (OpState::Aborted, OpStatus::ABORTED),
                _ => (OpState::Completed, OpStatus::EXHAUSTED),
            };
            let c = lock(&self.0.ctl);
            if c.state == OpState::Queued {
                self.finish(c, state, status);
            }
        }
        res
    }

    /// Execute in the calling thread if nobody has submitted it yet
    pub(crate) fn run_inline(&self) {
        if lock(&self.0.ctl).state != OpState::Created {
            return;
        }
        match self.0.pool.begin_inline() {
            Ok(()) => self.execute(),
            Err(_) => {
                let c = lock(&self.0.ctl);
                if c.state == OpState::Created {
                    self.finish(c, OpState::Aborted, OpStatus::ABORTED);
                }
            }
        }
    }

    /// Body of the job handed to a worker, a rescue thread, or run inline.
    /// Always balances the pool's submission accounting.
    fn execute(&self) {
        let core = &*self.0;
        let (func, mut payload) = {
            let mut c = lock(&core.ctl);
            if !c.state.is_abortable() {
                // Aborted while queued, or already run inline by another waiter
                drop(c);
                core.pool.finish_op();
                return;
            }
            c.state = OpState::Running;
            (c.func.take(), c.payload.take())
        };
        core.pool.counters.started.fetch_add(1, Ordering::Relaxed);
        ktrace!("op {} running at depth {}", core.id, core.depth);

        let status = {
            let _ctx = ExecGuard::enter(core.pool.uid, core.depth);
            if let Some(stats) = &core.pool.stats {
                stats.enter(core.depth);
            }
            let status = match (func, payload.as_deref_mut()) {
                (Some(f), Some(arg)) => match catch_unwind(AssertUnwindSafe(|| f(arg, core.id))) {
                    Ok(status) => status,
                    Err(_) => {
                        kerror!("op {} panicked", core.id);
                        OpStatus::PANICKED
                    }
                },
                _ => OpStatus::new(StatusKind::Error, 0),
            };
            if let Some(stats) = &core.pool.stats {
                stats.exit(core.depth);
            }
            status
        };

        core.pool.counters.completed.fetch_add(1, Ordering::Relaxed);
        let mut c = lock(&core.ctl);
        c.payload = payload;
        self.finish(c, OpState::Completed, status);
        core.pool.finish_op();
    }

    /// Move to a terminal state, wake waiters, then notify the queue
    fn finish(&self, mut c: MutexGuard<'_, OpCtl>, state: OpState, status: OpStatus) {
        c.state = state;
        c.status = status;
        c.func = None;
        let queue = c.queue.as_ref().and_then(Weak::upgrade);
        let destroy = std::mem::take(&mut c.destroy_pending);
        drop(c);

        self.0.done.notify_all();
        if destroy {
            self.destroy_payload();
        }
        if let Some(q) = queue {
            q.op_completed(self);
        }
    }

    /// Cancel before the user function runs
    ///
    /// Returns `false` once the op is running or terminal.
    pub fn abort(&self) -> bool {
        let c = lock(&self.0.ctl);
        if !c.state.is_abortable() {
            return false;
        }
        self.finish(c, OpState::Aborted, OpStatus::ABORTED);
        true
    }

    /// Block until the op completes and return its status
    ///
    /// An op nobody has submitted yet runs inline in the calling thread.
    pub fn wait(&self) -> OpStatus {
        self.run_inline();
        let mut c = lock(&self.0.ctl);
        while !c.state.is_terminal() {
            c = wait(&self.0.done, c);
        }
        c.status
    }

    /// Submit if needed and wait up to `timeout`; `None` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> Option<OpStatus> {
        let _ = self.start();
        let deadline = Instant::now() + timeout;
        let mut c = lock(&self.0.ctl);
        while !c.state.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            c = wait_timeout(&self.0.done, c, deadline - now).0;
        }
        Some(c.status)
    }

    /// Run through a private single-element queue and return the status
    ///
    /// Executes inline in the calling thread, so it behaves the same on
    /// ordinary threads and inside the pool's own workers. The payload is
    /// destroyed afterwards.
    pub fn sync_exec(self) -> OpStatus {
        let q = OpQueue::new();
        let status = match q.add(&self) {
            Ok(()) => match q.wait_any() {
                Some(op) => op.status(),
                None => self.status(),
            },
            Err(_) => self.wait(),
        };
        self.free(FreeMode::Destroy);
        status
    }

    /// Release the payload
    ///
    /// `Destroy` runs the destructor (or drops the payload) exactly once; if
    /// the op has not started it is aborted first, and if it is running the
    /// release happens when it completes. `Nop` keeps the payload for
    /// [`take_payload`](Op::take_payload) and discards the destructor.
    pub fn free(&self, mode: FreeMode) {
        match mode {
            FreeMode::Nop => {
                lock(&self.0.ctl).destructor = None;
            }
            FreeMode::Destroy => {
                self.abort();
                let mut c = lock(&self.0.ctl);
                if c.state == OpState::Running {
                    c.destroy_pending = true;
                    return;
                }
                drop(c);
                self.destroy_payload();
            }
        }
    }

    fn destroy_payload(&self) {
        let (payload, destructor) = {
            let mut c = lock(&self.0.ctl);
            (c.payload.take(), c.destructor.take())
        };
        if let Some(p) = payload {
            match destructor {
                Some(d) => d(p),
                None => drop(p),
            }
        }
    }

    /// Take the payload back after completion
    ///
    /// Returns `None` while the op is pending or running, after the payload
    /// was destroyed, or if `A` is the wrong type.
    pub fn take_payload<A: Send + 'static>(&self) -> Option<A> {
        let mut c = lock(&self.0.ctl);
        if !c.state.is_terminal() {
            return None;
        }
        let p = c.payload.take()?;
        match p.downcast::<A>() {
            Ok(a) => {
                c.destructor = None;
                Some(*a)
            }
            Err(p) => {
                c.payload = Some(p);
                None
            }
        }
    }

    /// Borrow the payload after completion
    pub fn with_payload<A: Send + 'static, R>(&self, f: impl FnOnce(&A) -> R) -> Option<R> {
        let c = lock(&self.0.ctl);
        if !c.state.is_terminal() {
            return None;
        }
        c.payload.as_ref()?.downcast_ref::<A>().map(f)
    }

    /// Join a queue; returns whether the op is already terminal
    pub(crate) fn attach_queue(&self, queue: Weak<QueueInner>) -> GopResult<bool> {
        let mut c = lock(&self.0.ctl);
        if c.in_queue {
            return Err(GopError::AlreadyQueued);
        }
        c.in_queue = true;
        c.queue = Some(queue);
        Ok(c.state.is_terminal())
    }
}

impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Op {}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = lock(&self.0.ctl);
        f.debug_struct("Op")
            .field("id", &self.0.id)
            .field("tag", &self.caller_tag())
            .field("depth", &self.0.depth)
            .field("state", &c.state)
            .field("status", &c.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::PoolContext;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn pool(name: &str, min: usize, max: usize) -> PoolContext {
        PoolContext::new(PoolConfig::new(name).min_threads(min).max_threads(max)).unwrap()
    }

    #[test]
    fn test_new_op_is_created() {
        let p = pool("otest-new", 0, 1);
        let before = p.info().created;
        let op = Op::new(&p, (), |_, _| OpStatus::SUCCESS);
        assert_eq!(op.state(), OpState::Created);
        assert_eq!(op.depth(), 1);
        assert_eq!(p.info().created, before + 1);
        assert_eq!(p.info().submitted, 0);
    }

    #[test]
    fn test_wait_runs_inline() {
        let p = pool("otest-inline", 0, 1);
        let me = std::thread::current().id();
        let op = Op::new(&p, None, move |seen: &mut Option<bool>, _| {
            *seen = Some(std::thread::current().id() == me);
            OpStatus::success(3)
        });
        assert_eq!(op.wait(), OpStatus::success(3));
        assert_eq!(op.take_payload::<Option<bool>>(), Some(Some(true)));
        assert_eq!(p.info().threads, 0);
    }

    #[test]
    fn test_start_runs_on_worker() {
        let p = pool("otest-start", 1, 1);
        let (tx, rx) = mpsc::channel();
        let op = Op::new(&p, tx, |tx, id| {
            tx.send(id).unwrap();
            OpStatus::SUCCESS.with_value(10)
        });
        op.start().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), op.id());
        assert_eq!(op.wait().value, 10);
        assert_eq!(op.state(), OpState::Completed);
    }

    #[test]
    fn test_panic_becomes_failure() {
        let p = pool("otest-panic", 1, 1);
        let op = Op::new(&p, (), |_, _| panic!("user bug"));
        op.start().unwrap();
        let status = op.wait();
        assert_eq!(status, OpStatus::PANICKED);
        assert!(!status.is_success());
    }

    #[test]
    fn test_abort_before_dispatch() {
        let p = pool("otest-abort", 0, 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let op = Op::new(&p, (), move |_, _| {
            r.fetch_add(1, Ordering::SeqCst);
            OpStatus::SUCCESS
        });
        assert!(op.abort());
        assert!(!op.abort());
        assert_eq!(op.state(), OpState::Aborted);
        assert_eq!(op.wait(), OpStatus::ABORTED);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abort_after_completion_refused() {
        let p = pool("otest-abort2", 0, 1);
        let op = Op::new(&p, (), |_, _| OpStatus::SUCCESS);
        op.wait();
        assert!(!op.abort());
        assert_eq!(op.status(), OpStatus::SUCCESS);
    }

    #[test]
    fn test_free_nop_keeps_status_and_payload() {
        let p = pool("otest-nop", 0, 1);
        let destroyed = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&destroyed);
        let op = Op::new(&p, vec![1u8, 2, 3], |v, _| {
            v.push(4);
            OpStatus::failure(9)
        })
        .with_destructor(move |_: Vec<u8>| {
            d.fetch_add(1, Ordering::SeqCst);
        });
        op.wait();
        op.free(FreeMode::Nop);
        assert_eq!(op.status(), OpStatus::failure(9));
        assert_eq!(op.with_payload(|v: &Vec<u8>| v.len()), Some(4));
        drop(op);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_free_destroy_runs_destructor_once() {
        let p = pool("otest-destroy", 0, 1);
        let destroyed = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&destroyed);
        let op = Op::new(&p, String::from("buf"), |_, _| OpStatus::SUCCESS)
            .with_destructor(move |s: String| {
                assert_eq!(s, "buf");
                d.fetch_add(1, Ordering::SeqCst);
            });
        op.wait();
        op.free(FreeMode::Destroy);
        op.free(FreeMode::Destroy);
        drop(op);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_free_destroy_while_running_is_deferred() {
        let p = pool("otest-defer", 1, 1);
        let destroyed = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&destroyed);
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (in_tx, in_rx) = mpsc::channel::<()>();
        let op = Op::new(&p, (go_rx, in_tx), |(go, inside), _| {
            inside.send(()).unwrap();
            go.recv().unwrap();
            OpStatus::SUCCESS
        })
        .with_destructor(move |_: (mpsc::Receiver<()>, mpsc::Sender<()>)| {
            d.fetch_add(1, Ordering::SeqCst);
        });
        op.start().unwrap();
        in_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        op.free(FreeMode::Destroy);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        go_tx.send(()).unwrap();
        op.wait();
        let deadline = Instant::now() + Duration::from_secs(5);
        while destroyed.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_caller_tag_and_private() {
        let p = pool("otest-tag", 0, 1);
        let op = Op::new(&p, (), |_, _| OpStatus::SUCCESS);
        assert_eq!(op.caller_tag(), 0);
        op.set_caller_tag(42);
        op.set_private(Arc::new(String::from("ctx")));
        assert_eq!(op.caller_tag(), 42);
        assert_eq!(op.private::<String>().as_deref().map(String::as_str), Some("ctx"));
        assert!(op.private::<u32>().is_none());
    }

    #[test]
    fn test_take_payload_wrong_type_keeps_it() {
        let p = pool("otest-take", 0, 1);
        let op = Op::new(&p, 5u32, |n, _| {
            *n += 1;
            OpStatus::SUCCESS
        });
        assert_eq!(op.take_payload::<u32>(), None); // not run yet
        op.wait();
        assert_eq!(op.take_payload::<String>(), None);
        assert_eq!(op.take_payload::<u32>(), Some(6));
        assert_eq!(op.take_payload::<u32>(), None);
    }

    #[test]
    fn test_wait_timeout() {
        let p = pool("otest-timeout", 1, 1);
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let op = Op::new(&p, go_rx, |go, _| {
            go.recv().unwrap();
            OpStatus::SUCCESS
        });
        assert_eq!(op.wait_timeout(Duration::from_millis(30)), None);
        go_tx.send(()).unwrap();
        assert_eq!(op.wait_timeout(Duration::from_secs(5)), Some(OpStatus::SUCCESS));
    }

    #[test]
    fn test_start_after_pool_destroyed_aborts() {
        let p = pool("otest-dead", 0, 1);
        let op = Op::new(&p, (), |_, _| OpStatus::SUCCESS);
        p.destroy();
        assert_eq!(op.start(), Err(GopError::ShutDown));
        assert_eq!(op.status(), OpStatus::ABORTED);
        assert!(op.is_completed());
    }

    #[test]
    fn test_sync_exec_nested_depth() {
        let p = pool("otest-depth", 1, 1);
        let h = p.handle();
        let op = Op::new(&p, 0u32, move |inner_depth, _| {
            let child = Op::new(&h, (), |_, _| OpStatus::SUCCESS);
            *inner_depth = child.depth();
            child.sync_exec()
        });
        op.start().unwrap();
        assert!(op.wait().is_success());
        assert_eq!(op.take_payload::<u32>(), Some(2));
    }
}
