//! Structured file logging for foreman runs.
//!
//! Log levels:
//! - ERROR: Task failures and broken invariants
//! - WARN: Provider failures, deadlocks, aborts
//! - INFO: Run start and finish
//! - DEBUG: Dispatch decisions and provider calls
//! - TRACE: Very detailed traces
//!
//! Nothing is written until [`init`] or [`init_at`] opens a log file.
//! `FOREMAN_DEBUG=1` (or `debug = true` in the config) raises the level to
//! DEBUG; `FOREMAN_LOG=<level>` sets it explicitly and wins over both.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::config::Config;

static SINK: OnceLock<Mutex<File>> = OnceLock::new();
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Level implied by the debug flag and the environment.
fn resolve_level(debug: bool) -> LogLevel {
    if let Some(level) = std::env::var("FOREMAN_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        return level;
    }
    let env_debug = std::env::var("FOREMAN_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Open the log file named by the configuration.
pub fn init(config: &Config) -> crate::Result<()> {
    init_at(config.log_path()?, config.debug)
}

/// Open (and truncate) `path` as the log file.
///
/// The first successful call wins; later calls only adjust the level.
pub fn init_at(path: PathBuf, debug: bool) -> crate::Result<()> {
    set_level(resolve_level(debug));
    if SINK.get().is_some() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    let _ = SINK.set(Mutex::new(file));
    Ok(())
}

pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Whether a record at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    SINK.get().is_some() && level <= self::level()
}

/// Write one record. Used by the `flog*` macros.
pub fn write(level: LogLevel, target: &str, msg: &str) {
    if level > self::level() {
        return;
    }
    let Some(sink) = SINK.get() else {
        return;
    };
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    if let Ok(mut file) = sink.lock() {
        let _ = writeln!(file, "[{}] [{}] {}: {}", timestamp, level.as_str(), target, msg);
    }
}

/// Write a record without a module target.
pub fn log_at(level: LogLevel, msg: &str) {
    write(level, "foreman", msg);
}

/// Log at INFO level.
#[macro_export]
macro_rules! flog {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! flog_error {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! flog_warn {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Warn, $($arg)*)
    };
}

/// Log at DEBUG level; the message is not formatted unless it will be written.
#[macro_export]
macro_rules! flog_debug {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! flog_trace {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Trace, $($arg)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! flog_at {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::write($level, module_path!(), &format!($($arg)*));
        }
    };
}
