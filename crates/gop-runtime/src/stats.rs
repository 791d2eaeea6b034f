//! Per-depth concurrency statistics
//!
//! Enabled per pool with `PoolConfig::stats` or `GOP_TP_STATS=1`. Records
//! the peak number of ops executing at once, overall and per depth level,
//! so chronically recursing pools show up in the table.

use crate::sync::lock;
use gop_core::constants::MAX_RECURSION_DEPTH;
use std::fmt;
use std::sync::Mutex;

/// Counters for one depth level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    pub current: usize,
    pub max_concurrent: usize,
    pub total: u64,
}

struct StatsInner {
    concurrent: usize,
    max_concurrent: usize,
    levels: Vec<LevelStats>,
}

pub struct DepthStats {
    inner: Mutex<StatsInner>,
}

impl DepthStats {
    pub fn new() -> Self {
        DepthStats {
            inner: Mutex::new(StatsInner {
                concurrent: 0,
                max_concurrent: 0,
                levels: vec![LevelStats::default(); MAX_RECURSION_DEPTH],
            }),
        }
    }

    fn slot(depth: u32) -> usize {
        (depth as usize).min(MAX_RECURSION_DEPTH - 1)
    }

    /// An op at `depth` started executing
    pub fn enter(&self, depth: u32) {
        let mut s = lock(&self.inner);
        s.concurrent += 1;
        s.max_concurrent = s.max_concurrent.max(s.concurrent);
        let level = &mut s.levels[Self::slot(depth)];
        level.current += 1;
        level.total += 1;
        level.max_concurrent = level.max_concurrent.max(level.current);
    }

    /// An op at `depth` finished executing
    pub fn exit(&self, depth: u32) {
        let mut s = lock(&self.inner);
        s.concurrent = s.concurrent.saturating_sub(1);
        let level = &mut s.levels[Self::slot(depth)];
        level.current = level.current.saturating_sub(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let s = lock(&self.inner);
        StatsSnapshot {
            max_concurrency: s.max_concurrent,
            levels: s
                .levels
                .iter()
                .enumerate()
                .filter(|(_, l)| l.total > 0)
                .map(|(d, l)| (d as u32, *l))
                .collect(),
        }
    }
}

impl Default for DepthStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a pool's depth statistics (levels never used are omitted)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub max_concurrency: usize,
    pub levels: Vec<(u32, LevelStats)>,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "max concurrency: {}", self.max_concurrency)?;
        writeln!(f, "  depth  max_concurrent  total")?;
        for (depth, l) in &self.levels {
            writeln!(f, "  {:>5}  {:>14}  {:>5}", depth, l.max_concurrent, l.total)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_exit_tracks_peaks() {
        let s = DepthStats::new();
        s.enter(1);
        s.enter(1);
        s.enter(2);
        s.exit(2);
        s.exit(1);
        s.enter(2);

        let snap = s.snapshot();
        assert_eq!(snap.max_concurrency, 3);
        assert_eq!(snap.levels.len(), 2);
        assert_eq!(snap.levels[0].0, 1);
        assert_eq!(snap.levels[0].1.max_concurrent, 2);
        assert_eq!(snap.levels[0].1.total, 2);
        assert_eq!(snap.levels[1].1.total, 2);
        assert_eq!(snap.levels[1].1.current, 1);
    }

    #[test]
    fn test_deep_levels_clamp() {
        let s = DepthStats::new();
        s.enter(10_000);
        let snap = s.snapshot();
        assert_eq!(snap.levels[0].0 as usize, MAX_RECURSION_DEPTH - 1);
    }

    #[test]
    fn test_display() {
        let s = DepthStats::new();
        s.enter(1);
        let text = format!("{}", s.snapshot());
        assert!(text.starts_with("max concurrency: 1"));
    }
}
