// src/progress.rs

//! Progress reporting for long-running operations
//!
//! Extraction reports `(percent, message)` pairs through the `ProgressSink`
//! trait. Implementations include:
//! - closures `FnMut(u8, &str)` for GUI or custom integration
//! - `LogProgress`: logs progress to tracing
//! - `NoProgress`: no-op for scripted/quiet modes
//!
//! Callers never need a sink for correctness; everything in the crate accepts
//! `NoProgress` as well as a real sink.

use std::time::{Duration, Instant};
use tracing::info;

/// Receiver for `(percent, message)` progress updates
pub trait ProgressSink {
    /// Report progress; `percent` is always within 0..=100
    fn report(&mut self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(u8, &str),
{
    fn report(&mut self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Silent progress sink (no-op)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8, _message: &str) {}
}

/// Logging progress sink
///
/// Logs progress updates to tracing at info level, skipping repeats of the
/// same percentage.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    last_percent: Option<u8>,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_percent: None,
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&mut self, percent: u8, message: &str) {
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        info!("{}: {}% {}", self.name, percent, message);
    }
}

/// Sub-range of the overall 0..=100 scale assigned to one phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub base: f64,
    pub share: f64,
}

impl ProgressBand {
    pub const FULL: ProgressBand = ProgressBand {
        base: 0.0,
        share: 100.0,
    };

    pub fn new(base: f64, share: f64) -> Self {
        Self { base, share }
    }

    /// Map a completion ratio (0.0..=1.0) into this band
    pub fn percent(&self, ratio: f64) -> u8 {
        let ratio = ratio.clamp(0.0, 1.0);
        (self.base + ratio * self.share).clamp(0.0, 100.0) as u8
    }
}

/// Minimum wall time between updates pushed at entry boundaries
pub const ENTRY_INTERVAL: Duration = Duration::from_millis(50);

/// Minimum wall time between updates pushed while copying a large entry
pub const CHUNK_INTERVAL: Duration = Duration::from_millis(200);

/// Rate limiter deciding when an update is worth pushing
///
/// Entry-boundary updates go out on the first entry, every tenth entry and
/// the last entry, and only when `ENTRY_INTERVAL` has passed. Chunk updates
/// only go out when `CHUNK_INTERVAL` has passed.
#[derive(Debug)]
pub struct Throttle {
    last_push: Option<Instant>,
    entry_interval: Duration,
    chunk_interval: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(ENTRY_INTERVAL, CHUNK_INTERVAL)
    }
}

impl Throttle {
    pub fn new(entry_interval: Duration, chunk_interval: Duration) -> Self {
        Self {
            last_push: None,
            entry_interval,
            chunk_interval,
        }
    }

    /// Decide whether to push an update at the start of entry `index` of `total`
    pub fn at_entry(&mut self, index: usize, total: usize) -> bool {
        let milestone = index == 0 || index % 10 == 0 || index + 1 == total;
        milestone && self.elapsed(self.entry_interval)
    }

    /// Decide whether to push an update in the middle of copying an entry
    pub fn at_chunk(&mut self) -> bool {
        self.last_push.is_some() && self.elapsed(self.chunk_interval)
    }

    fn elapsed(&mut self, interval: Duration) -> bool {
        let now = Instant::now();
        match self.last_push {
            Some(last) if now.duration_since(last) < interval => false,
            _ => {
                self.last_push = Some(now);
                true
            }
        }
    }
}

/// Shorten a file name for display, keeping its tail
pub fn shorten(name: &str, max_chars: usize) -> String {
    let count = name.chars().count();
    if count <= max_chars {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - max_chars).collect();
    format!("...{}", tail)
}
