//! Pool Configuration
//!
//! Provides library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls made after `from_env()`
//! 2. Pool-scoped environment variables (`GOP_TP_<NAME>_<FIELD>`)
//! 3. Global environment variables (`GOP_TP_<FIELD>`)
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use gop_runtime::config::PoolConfig;
//!
//! // Use defaults with env overrides
//! let config = PoolConfig::from_env("tpc:0");
//!
//! // Or customize programmatically
//! let config = PoolConfig::from_env("tpc:0")
//!     .max_threads(16)
//!     .idle_timeout(Duration::from_millis(200));
//! ```

pub mod defaults;

use gop_core::constants::MAX_RECURSION_DEPTH;
use gop_core::env::env_get_scoped;
use gop_core::GopError;
use std::time::Duration;

const ENV_PREFIX: &str = "GOP_TP";

/// Pool configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name, used in thread names, log tags and registry lookups
    pub name: String,
    /// Workers spawned eagerly and kept while idle (0 is legal)
    pub min_threads: usize,
    /// Upper bound on primary workers
    pub max_threads: usize,
    /// Nested submission levels tolerated before overflow depths clamp
    pub max_recursion: usize,
    /// How long a worker above `min_threads` lingers idle before exiting
    pub idle_timeout: Duration,
    /// Record per-depth concurrency statistics
    pub stats: bool,
}

impl PoolConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional, each also accepted in the
    /// pool-scoped form `GOP_TP_<NAME>_<FIELD>`):
    /// - `GOP_TP_MIN_THREADS` - Workers kept alive while idle
    /// - `GOP_TP_MAX_THREADS` - Upper bound on primary workers
    /// - `GOP_TP_MAX_RECURSION` - Nested submission levels
    /// - `GOP_TP_IDLE_MS` - Idle timeout in milliseconds
    /// - `GOP_TP_STATS` - Per-depth statistics (0/1)
    pub fn from_env(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            min_threads: env_get_scoped(ENV_PREFIX, &name, "MIN_THREADS", defaults::MIN_THREADS),
            max_threads: env_get_scoped(ENV_PREFIX, &name, "MAX_THREADS", defaults::MAX_THREADS),
            max_recursion: env_get_scoped(ENV_PREFIX, &name, "MAX_RECURSION", defaults::MAX_RECURSION),
            idle_timeout: Duration::from_millis(env_get_scoped(
                ENV_PREFIX,
                &name,
                "IDLE_MS",
                defaults::IDLE_TIMEOUT_MS,
            )),
            stats: env_get_scoped(
                ENV_PREFIX,
                &name,
                "STATS",
                if defaults::STATS { 1usize } else { 0 },
            ) != 0,
            name,
        }
    }

    /// Create config with explicit defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_threads: defaults::MIN_THREADS,
            max_threads: defaults::MAX_THREADS,
            max_recursion: defaults::MAX_RECURSION,
            idle_timeout: Duration::from_millis(defaults::IDLE_TIMEOUT_MS),
            stats: defaults::STATS,
        }
    }

    /// Size a pool from a core count the way the storage client sizes its
    /// shared pools: `max_threads = cores`, `min_threads = cores / 10`
    /// clamped to `[1, 10]`.
    pub fn for_cores(name: impl Into<String>, cores: usize) -> Self {
        let min = (cores / 10).clamp(defaults::CORES_MIN_THREADS_FLOOR, defaults::CORES_MIN_THREADS_CEIL);
        Self::from_env(name).min_threads(min).max_threads(cores.max(min))
    }

    // Builder methods

    pub fn min_threads(mut self, n: usize) -> Self {
        self.min_threads = n;
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    pub fn max_recursion(mut self, n: usize) -> Self {
        self.max_recursion = n;
        self
    }

    pub fn idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn stats(mut self, enable: bool) -> Self {
        self.stats = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue("name must not be empty"));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::InvalidValue("max_threads must be > 0"));
        }
        if self.max_threads > defaults::MAX_THREADS_LIMIT {
            return Err(ConfigError::InvalidValue("max_threads must be <= 100000"));
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::InvalidValue("min_threads must be <= max_threads"));
        }
        if self.max_recursion >= MAX_RECURSION_DEPTH {
            return Err(ConfigError::InvalidValue("max_recursion must be < 100"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("idle_timeout must be > 0"));
        }
        Ok(())
    }

    /// Derived sizing used by the pool at runtime.
    pub fn sizing(&self) -> PoolSizing {
        PoolSizing {
            min_threads: self.min_threads,
            max_threads: self.max_threads,
            idle_timeout: self.idle_timeout,
            max_concurrency: self.max_threads,
            recursion_depth: self.max_recursion + 1,
        }
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        let sizing = self.sizing();
        eprintln!("Pool Configuration ({}):", self.name);
        eprintln!("  min_threads:      {}", self.min_threads);
        eprintln!("  max_threads:      {}", self.max_threads);
        eprintln!("  max_recursion:    {}", self.max_recursion);
        eprintln!("  idle_timeout:     {:?}", self.idle_timeout);
        eprintln!("  stats:            {}", self.stats);
        eprintln!("  max_concurrency:  {}", sizing.max_concurrency);
        eprintln!("  recursion_depth:  {}", sizing.recursion_depth);
    }
}

/// Runtime sizing derived from a [`PoolConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    pub min_threads: usize,
    pub max_threads: usize,
    pub idle_timeout: Duration,
    /// Outstanding ops above which a recursive submission goes to overflow
    pub max_concurrency: usize,
    /// Number of depth levels in the overflow reserve
    pub recursion_depth: usize,
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for GopError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => GopError::InvalidConfig(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env() {
        let config = PoolConfig::from_env("cfg-test-plain");
        assert!(config.max_threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scoped_env_override() {
        std::env::set_var("GOP_TP_CFG_TEST_SCOPED_MAX_THREADS", "7");
        std::env::set_var("GOP_TP_CFG_TEST_SCOPED_STATS", "1");
        let config = PoolConfig::from_env("cfg-test-scoped");
        assert_eq!(config.max_threads, 7);
        assert!(config.stats);
        std::env::remove_var("GOP_TP_CFG_TEST_SCOPED_MAX_THREADS");
        std::env::remove_var("GOP_TP_CFG_TEST_SCOPED_STATS");
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::new("b")
            .min_threads(0)
            .max_threads(8)
            .idle_timeout(Duration::from_millis(5))
            .stats(true);

        assert_eq!(config.min_threads, 0);
        assert_eq!(config.max_threads, 8);
        assert_eq!(config.idle_timeout, Duration::from_millis(5));
        assert!(config.stats);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(PoolConfig::new("v").max_threads(0).validate().is_err());
        assert!(PoolConfig::new("v").min_threads(5).max_threads(4).validate().is_err());
        assert!(PoolConfig::new("v").max_recursion(100).validate().is_err());
        assert!(PoolConfig::new("").validate().is_err());
        assert!(PoolConfig::new("v").idle_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_sizing() {
        let s = PoolConfig::new("s").max_threads(6).max_recursion(3).sizing();
        assert_eq!(s.max_concurrency, 6);
        assert_eq!(s.recursion_depth, 4);
    }

    #[test]
    fn test_for_cores() {
        let c = PoolConfig::for_cores("cores-test-a", 200);
        assert_eq!(c.min_threads, 10);
        assert_eq!(c.max_threads, 200);

        let c = PoolConfig::for_cores("cores-test-b", 4);
        assert_eq!(c.min_threads, 1);
        assert_eq!(c.max_threads, 4);

        let c = PoolConfig::for_cores("cores-test-c", 0);
        assert_eq!(c.min_threads, 1);
        assert_eq!(c.max_threads, 1);
    }

    #[test]
    fn test_config_error_into_gop_error() {
        let e: GopError = ConfigError::InvalidValue("x").into();
        assert_eq!(e, GopError::InvalidConfig("x"));
    }
}
