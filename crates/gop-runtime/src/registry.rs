//! Named, reference-counted pool registry
//!
//! Several components of a process often want "the CPU pool" or "the
//! unlimited pool" without each building its own. A [`PoolRegistry`] hands
//! out shared pools by name; the pool is destroyed when the last user
//! releases it. There is no process-global registry: the embedding
//! application owns one and passes it around.

use crate::config::PoolConfig;
use crate::pool::PoolContext;
use crate::sync::lock;
use gop_core::{kdebug, GopResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Entry {
    pool: Arc<PoolContext>,
    refs: usize,
}

#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, Entry>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool named `config.name`, creating it from `config` on first use
    ///
    /// Later acquirers share the existing pool; their config is ignored.
    pub fn acquire(&self, config: PoolConfig) -> GopResult<Arc<PoolContext>> {
        let mut pools = lock(&self.pools);
        if let Some(entry) = pools.get_mut(&config.name) {
            entry.refs += 1;
            return Ok(Arc::clone(&entry.pool));
        }

        let name = config.name.clone();
        let pool = Arc::new(PoolContext::new(config)?);
        kdebug!("registry: pool {} registered", name);
        pools.insert(
            name,
            Entry {
                pool: Arc::clone(&pool),
                refs: 1,
            },
        );
        Ok(pool)
    }

    /// Look up a registered pool without taking a reference
    pub fn get(&self, name: &str) -> Option<Arc<PoolContext>> {
        lock(&self.pools).get(name).map(|e| Arc::clone(&e.pool))
    }

    /// Drop one reference; returns `true` if that was the last one
    ///
    /// The registry's own handle goes away with the last reference. The pool
    /// is destroyed as soon as the acquirers' `Arc`s are gone too.
    pub fn release(&self, name: &str) -> bool {
        let removed = {
            let mut pools = lock(&self.pools);
            let Some(entry) = pools.get_mut(name) else {
                return false;
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                return false;
            }
            pools.remove(name)
        };
        kdebug!("registry: pool {} released", name);
        // Destroy (which drains) outside the registry lock
        drop(removed);
        true
    }

    /// Outstanding references to `name`
    pub fn refs(&self, name: &str) -> usize {
        lock(&self.pools).get(name).map_or(0, |e| e.refs)
    }

    pub fn len(&self) -> usize {
        lock(&self.pools).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered pool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.pools).keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry").field("pools", &self.names()).finish()
    }
}
