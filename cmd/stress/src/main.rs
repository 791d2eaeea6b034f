//! Stress test - recursive fan-out
//!
//! Simulates a recursive directory removal: every "directory" op fans out
//! its children into a queue on the same pool, throttled to `np`
//! outstanding ops with `tasks_left`, and counts failures instead of
//! stopping. A small pool forces most nested work through the overflow
//! reserve.
//!
//! Usage: `stress [fanout] [depth] [np] [max_threads]`

use gop::{kinfo, FreeMode, Op, OpQueue, OpStatus, PoolConfig, PoolContext, PoolHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct Walk {
    fanout: usize,
    np: usize,
    files: AtomicU64,
    failed: AtomicU64,
}

fn remove_dir(pool: &PoolHandle, walk: &Arc<Walk>, level: u32) -> OpStatus {
    if level == 0 {
        let n = walk.files.fetch_add(1, Ordering::Relaxed) + 1;
        // One in a thousand "files" refuses to go away
        return if n % 1000 == 0 {
            walk.failed.fetch_add(1, Ordering::Relaxed);
            OpStatus::failure(13)
        } else {
            OpStatus::SUCCESS
        };
    }

    let q = OpQueue::new();
    if q.start_execution().is_err() {
        return OpStatus::FAILURE;
    }
    let mut failed = 0;
    for _ in 0..walk.fanout {
        let (h, w) = (pool.clone(), Arc::clone(walk));
        let op = Op::new(pool, (), move |_, _| remove_dir(&h, &w, level - 1));
        if q.add(&op).is_err() {
            failed += 1;
        }
        if q.tasks_left() > walk.np {
            if let Some(done) = q.wait_any() {
                failed += !done.status().is_success() as i64;
                done.free(FreeMode::Destroy);
            }
        }
    }
    while let Some(done) = q.wait_any() {
        failed += !done.status().is_success() as i64;
        done.free(FreeMode::Destroy);
    }

    if failed == 0 {
        OpStatus::SUCCESS
    } else {
        OpStatus::FAILURE.with_value(failed)
    }
}

fn arg(n: usize, default: usize) -> usize {
    std::env::args()
        .nth(n)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() -> gop::GopResult<()> {
    println!("=== gop Stress Test ===\n");

    let fanout = arg(1, 8);
    let depth = arg(2, 4) as u32;
    let np = arg(3, 4);
    let max_threads = arg(4, 4);

    let config = PoolConfig::from_env("stress")
        .min_threads(1)
        .max_threads(max_threads)
        .max_recursion(depth as usize + 1)
        .stats(true);
    config.print();
    let pool = PoolContext::new(config)?;

    let walk = Arc::new(Walk {
        fanout,
        np,
        files: AtomicU64::new(0),
        failed: AtomicU64::new(0),
    });

    println!("Removing a tree of {}^{} files, np={}...", fanout, depth, np);
    let start = Instant::now();
    let (h, w) = (pool.handle(), Arc::clone(&walk));
    let status = gop::sync_exec(&pool, (), move |_, _| remove_dir(&h, &w, depth));
    let elapsed = start.elapsed();

    let files = walk.files.load(Ordering::Relaxed);
    kinfo!("walk finished: {}", status);

    println!("\n=== Results ===");
    println!("Files:           {}", files);
    println!("Failed files:    {}", walk.failed.load(Ordering::Relaxed));
    println!("Time:            {:?}", elapsed);
    println!("Throughput:      {:.0} ops/sec", files as f64 / elapsed.as_secs_f64());
    println!("\n{}", pool.info());
    if let Some(stats) = pool.stats() {
        println!("\n{}", stats);
    }

    pool.destroy();
    println!("\n=== Stress Test Complete ===");
    Ok(())
}
