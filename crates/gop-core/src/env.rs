//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults,
//! plus scoped lookups used for per-pool overrides.
//!
//! # Usage
//!
//! ```ignore
//! use gop_core::env::{env_get, env_get_bool, env_get_scoped};
//!
//! let max: usize = env_get("GOP_TP_MAX_THREADS", 4);
//! let stats: bool = env_get_bool("GOP_TP_STATS", false);
//!
//! // GOP_TP_TPC_0_MAX_THREADS, then GOP_TP_MAX_THREADS, then 4
//! let max: usize = env_get_scoped("GOP_TP", "tpc:0", "MAX_THREADS", 4);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Works with any type that implements `FromStr`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Everything else returns false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// Returns `Some(T)` if the variable is set and parses successfully,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

/// Build a scoped key: `<PREFIX>_<SCOPE>_<FIELD>`
///
/// The scope is upper-cased and every character outside `[A-Z0-9]` becomes
/// `_`, so pool names like `tpc:0` map to `TPC_0`.
pub fn env_key(prefix: &str, scope: &str, field: &str) -> String {
    let scope: String = scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_{}_{}", prefix, scope, field)
}

/// Scoped lookup: `<PREFIX>_<SCOPE>_<FIELD>`, then `<PREFIX>_<FIELD>`, then default
pub fn env_get_scoped<T>(prefix: &str, scope: &str, field: &str, default: T) -> T
where
    T: FromStr,
{
    if let Some(v) = env_get_opt(&env_key(prefix, scope, field)) {
        return v;
    }
    env_get(&format!("{}_{}", prefix, field), default)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__GOP_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_bool_default() {
        assert!(env_get_bool("__GOP_TEST_UNSET_VAR__", true));
        assert!(!env_get_bool("__GOP_TEST_UNSET_VAR__", false));
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<usize> = env_get_opt("__GOP_TEST_UNSET_VAR__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_str_default() {
        assert_eq!(env_get_str("__GOP_TEST_UNSET_VAR__", "hello"), "hello");
    }

    #[test]
    fn test_env_is_set() {
        assert!(!env_is_set("__GOP_TEST_UNSET_VAR__"));
        // PATH should always be set
        assert!(env_is_set("PATH"));
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__GOP_TEST_NUM__", "123");
        let val: usize = env_get("__GOP_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__GOP_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var("__GOP_TEST_BOOL__", v);
            assert!(env_get_bool("__GOP_TEST_BOOL__", false), "{}", v);
        }
        for v in ["0", "false", "garbage"] {
            std::env::set_var("__GOP_TEST_BOOL__", v);
            assert!(!env_get_bool("__GOP_TEST_BOOL__", true), "{}", v);
        }
        std::env::remove_var("__GOP_TEST_BOOL__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__GOP_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__GOP_TEST_INVALID__", 99);
        assert_eq!(val, 99); // Should return default on parse failure
        std::env::remove_var("__GOP_TEST_INVALID__");
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("GOP_TP", "tpc:0", "MAX_THREADS"), "GOP_TP_TPC_0_MAX_THREADS");
        assert_eq!(env_key("X", "cache-pool", "F"), "X_CACHE_POOL_F");
    }

    #[test]
    fn test_env_get_scoped_precedence() {
        std::env::set_var("__GOPT_LIMIT", "5");
        let v: usize = env_get_scoped("__GOPT", "scoped:a", "LIMIT", 1);
        assert_eq!(v, 5);

        std::env::set_var("__GOPT_SCOPED_A_LIMIT", "9");
        let v: usize = env_get_scoped("__GOPT", "scoped:a", "LIMIT", 1);
        assert_eq!(v, 9);

        // Other scopes still see the unscoped value
        let v: usize = env_get_scoped("__GOPT", "scoped:b", "LIMIT", 1);
        assert_eq!(v, 5);

        std::env::remove_var("__GOPT_SCOPED_A_LIMIT");
        std::env::remove_var("__GOPT_LIMIT");
    }
}
