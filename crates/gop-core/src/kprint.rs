//! Kernel-style print macros for gop
//!
//! Thread-safe, optionally-flushing diagnostic output similar to the Linux
//! kernel's printk. Pool threads register a short context tag
//! (`tpc:0/w2`, `tpc:0/ovf0`) that is printed in front of every line they log.
//!
//! # Environment Variables
//!
//! - `GOP_FLUSH_EPRINT=1` - Flush stderr after each print (useful for debugging hangs)
//! - `GOP_LOG_LEVEL=<level>` - Set log level: 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `GOP_LOG_TIME=1` - Prefix each leveled line with seconds since logging started
//!
//! # Usage
//!
//! ```ignore
//! use gop_core::{kprintln, kdebug, kinfo, kwarn, kerror};
//!
//! kprintln!("Simple message");
//! kdebug!("op {} submitted at depth {}", id, depth);
//! kinfo!("pool {} started", name);
//! kwarn!("overflow depth clamped");
//! kerror!("Critical failure!");
//! ```

use std::cell::RefCell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or number, as accepted by `GOP_LOG_LEVEL`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

// Global configuration (initialized once)
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static EPOCH: OnceLock<Instant> = OnceLock::new();

thread_local! {
    /// Context tag of the current thread, set by pool threads
    static THREAD_TAG: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }
    EPOCH.get_or_init(Instant::now);

    if let Ok(val) = std::env::var("GOP_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("GOP_LOG_TIME") {
        let time = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        TIME_ENABLED.store(time, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("GOP_LOG_LEVEL") {
        let level = LogLevel::parse(&val).unwrap_or(LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Check if flush is enabled
#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

/// Check if the elapsed-time prefix is enabled
#[inline]
pub fn time_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    TIME_ENABLED.load(Ordering::Relaxed)
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set flush mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Set elapsed-time prefix programmatically
pub fn set_time_enabled(enabled: bool) {
    EPOCH.get_or_init(Instant::now);
    TIME_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Tag every line logged from this thread with `tag`
pub fn set_thread_tag(tag: impl Into<String>) {
    let tag = tag.into();
    THREAD_TAG.with(|t| *t.borrow_mut() = Some(tag));
}

/// Remove this thread's context tag
pub fn clear_thread_tag() {
    THREAD_TAG.with(|t| *t.borrow_mut() = None);
}

/// Current thread's context tag, if any
pub fn thread_tag() -> Option<String> {
    THREAD_TAG.with(|t| t.borrow().clone())
}

/// Internal: Write and optionally flush
///
/// Uses a lock on stderr to ensure atomic line output.
#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock(); // Mutex lock for atomic output
    let _ = handle.write_fmt(args);
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Internal: Write with newline and optionally flush
#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Internal: Leveled print
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    if time_enabled() {
        let secs = EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64();
        let _ = write!(handle, "{:>10.6} ", secs);
    }
    let _ = write!(handle, "{} ", level.prefix());
    THREAD_TAG.with(|t| {
        if let Some(tag) = t.borrow().as_deref() {
            let _ = write!(handle, "[{}] ", tag);
        }
    });
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr (no newline)
///
/// Like `eprint!` but with optional auto-flush and mutex protection.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        $crate::kprint::_kprint_impl(format_args!($($arg)*));
    }};
}

/// Print to stderr with newline
///
/// Like `eprintln!` but with optional auto-flush and mutex protection.
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Leveled log: `klog!(Warn, "fmt", args..)`
///
/// The level is a bare [`LogLevel`] variant name. The per-level macros
/// below are shorthands for this one.
#[macro_export]
macro_rules! klog {
    ($level:ident, $($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            format_args!($($arg)*)
        );
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::klog!(Error, $($arg)*) };
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!(Warn, $($arg)*) };
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!(Info, $($arg)*) };
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!(Debug, $($arg)*) };
}

/// Trace level log (per-op lifecycle events)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!(Trace, $($arg)*) };
}

// ============================================================================
// Tests
// ============================================================================
