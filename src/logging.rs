// src/logging.rs

//! Pluggable log sink
//!
//! Install and extraction code reports user-facing warnings (conflicts,
//! skipped junk entries, blocked traversal attempts) through `LogSink`, so an
//! embedding UI can route them to its own log panel. The default sink
//! forwards to `tracing`.

use std::fmt;
use tracing::{debug, error, info, warn};

/// Severity of a message sent to a `LogSink`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-method logging capability
pub trait LogSink {
    fn log(&self, message: &str, level: LogLevel);
}

/// Forwards every message to the matching `tracing` macro
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }
}

/// Shared default sink handed out when the caller does not provide one
pub static TRACING_LOG: TracingLog = TracingLog;


#[cfg(test)]
mod tests {
    use super::testing::RecordingLog;
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Warn > LogLevel::Info);
        assert_eq!(LogLevel::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingLog::default();
        sink.log("skipped __MACOSX/foo", LogLevel::Debug);
        sink.log("conflict on a.dds", LogLevel::Warn);
        assert_eq!(sink.count(LogLevel::Warn), 1);
        assert_eq!(sink.count(LogLevel::Debug), 1);
    }
}
