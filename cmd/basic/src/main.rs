//! Basic gop example
//!
//! Walks through the three call styles: a blocking `sync_exec`, a queue
//! fan-out with caller tags and failure enumeration, and a nested
//! `sync_exec` from inside a single-thread pool.
//!
//! # Environment Variables
//!
//! - `GOP_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `GOP_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `GOP_TP_BASIC_MAX_THREADS=8` - Override sizing of the "basic" pool

use gop::{kdebug, kinfo, Op, OpQueue, OpStatus, PoolConfig, PoolContext};
use std::time::Duration;

// GOP_LOG_LEVEL=debug GOP_FLUSH_EPRINT=1 cargo run -p gop-basic
fn main() -> gop::GopResult<()> {
    println!("=== gop Basic Example ===\n");

    let pool = PoolContext::new(PoolConfig::from_env("basic").min_threads(0).max_threads(4))?;

    // Blocking call
    let status = gop::sync_exec(&pool, String::from("hello"), |s, id| {
        kdebug!("op {} upper-casing {:?}", id, s);
        *s = s.to_uppercase();
        OpStatus::SUCCESS.with_value(s.len() as i64)
    });
    println!("sync_exec -> {}", status);

    // Fan-out: every third task fails
    let q = OpQueue::new();
    for i in 0..10i64 {
        let op = Op::new(&pool, i, |i, _| {
            std::thread::sleep(Duration::from_millis(5 * (*i as u64 % 4)));
            if *i % 3 == 2 {
                OpStatus::failure(*i as i32)
            } else {
                OpStatus::success(7)
            }
        });
        op.set_caller_tag(i);
        q.add(&op)?;
    }
    q.start_execution()?;

    while let Some(done) = q.wait_any() {
        kinfo!("task {} finished: {}", done.caller_tag(), done.status());
    }
    println!("\n{} of {} tasks failed", q.tasks_failed(), q.task_count());
    while let Some(failed) = q.get_next_failed() {
        println!("  task {} -> {}", failed.caller_tag(), failed.status());
    }
    q.free(gop::FreeMode::Destroy);

    // Nested sync_exec on a one-thread pool
    let single = PoolContext::new(PoolConfig::from_env("single").min_threads(1).max_threads(1))?;
    let h = single.handle();
    let status = gop::sync_exec(&single, (), move |_, _| {
        let inner = Op::new(&h, 3i64, |n, _| OpStatus::SUCCESS.with_value(*n * 2));
        inner.start().ok();
        inner.wait()
    });
    println!("\nnested sync_exec on 1 thread -> {}", status);
    println!("\n{}", single.info());

    pool.destroy();
    single.destroy();
    println!("\n=== Example Complete ===");
    Ok(())
}
