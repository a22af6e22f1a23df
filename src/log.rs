//! File logging for team-tasks.
//!
//! Every invocation appends to `~/.team-tasks/team-tasks.log`, tagged with
//! its pid, since several agents usually drive the same projects at once.
//!
//! Levels:
//! - ERROR: Operations that aborted without persisting
//! - WARN: Recoverable surprises (stale locks, unreadable records)
//! - INFO: One line per committed operation
//! - DEBUG: Store and lock internals
//! - TRACE: Full record contents on save
//!
//! `TEAM_TASKS_LOG=<level>` picks any level. Otherwise `--debug` or
//! `TEAM_TASKS_DEBUG=1` selects DEBUG, and INFO is the default.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Config;
use crate::error::Error;

pub const LOG_LEVEL_ENV: &str = "TEAM_TASKS_LOG";
pub const DEBUG_ENV: &str = "TEAM_TASKS_DEBUG";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

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
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(Error::Validation(format!(
                "unknown log level '{}' (error, warn, info, debug, trace)",
                other
            ))),
        }
    }
}

/// An explicit, valid level wins; then the debug switches; then INFO.
fn resolve_level(debug_flag: bool, level_env: Option<&str>, debug_env: Option<&str>) -> LogLevel {
    if let Some(level) = level_env.and_then(|v| v.parse().ok()) {
        return level;
    }
    let debug_env = debug_env.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if debug_flag || debug_env {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Set the level from the flag and environment and open the log file.
pub fn init_with_debug(debug: bool) {
    let level = resolve_level(
        debug,
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
        std::env::var(DEBUG_ENV).ok().as_deref(),
    );
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    if let Ok(home) = Config::home_dir() {
        let _ = std::fs::create_dir_all(&home);
        LOG_PATH.set(home.join("team-tasks.log")).ok();
    }
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Append one line. Dropped silently before `init_with_debug` and on I/O errors.
pub fn log_at(level: LogLevel, msg: &str) {
    if level > self::level() {
        return;
    }
    let Some(path) = LOG_PATH.get() else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(
            file,
            "[{}] [{}] [pid {}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level.as_str(),
            std::process::id(),
            msg
        );
    }
}

#[macro_export]
macro_rules! ttlog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! ttlog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! ttlog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! ttlog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Debug, &format!($($arg)*))
    };
}

/// TRACE lines can be large; the message is only formatted when enabled.
#[macro_export]
macro_rules! ttlog_trace {
    ($($arg:tt)*) => {
        if $crate::log::level() >= $crate::log::LogLevel::Trace {
            $crate::log::log_at($crate::log::LogLevel::Trace, &format!($($arg)*))
        }
    };
}
