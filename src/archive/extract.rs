// src/archive/extract.rs

//! Streaming extraction into a staging directory
//!
//! Entries are written one at a time in fixed-size chunks, so memory use is
//! bounded no matter how large the archive is. Each target path is checked
//! against the resolved staging root before anything is created (zip-slip
//! defense); a mismatch rejects the archive instead of rewriting the path.

use crate::archive::validator::{ArchiveValidator, EntryVerdict, RejectReason, SkipReason};
use crate::archive::{ArchiveEntry, open_archive, read_entries};
use crate::error::{Error, Result};
use crate::filesystem::path::normalize_lexically;
use crate::logging::{LogLevel, LogSink, TRACING_LOG};
use crate::progress::{ProgressBand, ProgressSink, Throttle, shorten};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Size of the copy buffer used while streaming entries
pub const CHUNK_SIZE: usize = 8192;

/// Expected worst-case growth of an archive when uncompressed
const EXPANSION_FACTOR: u64 = 3;

/// Extra headroom on top of the expanded size
const SAFETY_MARGIN: u64 = 2;

/// Longest file name tail shown in progress messages
const DISPLAY_NAME_CHARS: usize = 25;

/// Extracts validated archives into a staging directory
pub struct SafeExtractor<'a> {
    validator: &'a ArchiveValidator,
    log: &'a dyn LogSink,
    band: ProgressBand,
}

impl<'a> SafeExtractor<'a> {
    pub fn new(validator: &'a ArchiveValidator) -> Self {
        Self {
            validator,
            log: &TRACING_LOG,
            band: ProgressBand::FULL,
        }
    }

    /// Route skip/reject warnings to `log`
    pub fn with_log(mut self, log: &'a dyn LogSink) -> Self {
        self.log = log;
        self
    }

    /// Report progress within `band` instead of 0..=100
    pub fn with_band(mut self, band: ProgressBand) -> Self {
        self.band = band;
        self
    }

    /// Extract `archive_path` into `staging_dir`
    ///
    /// The whole entry list is validated before the first write, so a denied
    /// extension anywhere in the archive leaves `staging_dir` untouched.
    /// Returns the number of files written. On error, `staging_dir` may hold
    /// a partial tree but no open handles; the caller owns its cleanup.
    pub fn extract(
        &self,
        archive_path: &Path,
        staging_dir: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<usize> {
        let mut archive = open_archive(archive_path)?;
        let entries = read_entries(&mut archive)?;
        let report = self.validator.validate(&entries)?;

        let root = staging_dir.canonicalize()?;
        let total = entries.len();
        let total_bytes = report.accepted_bytes;
        let mut throttle = Throttle::default();
        let mut written_bytes: u64 = 0;
        let mut staged = 0usize;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        debug!(
            "Extracting {} of {} entries from {} into {}",
            report.accepted,
            total,
            archive_path.display(),
            root.display()
        );

        for (position, entry) in entries.iter().enumerate() {
            match self.validator.classify(entry) {
                EntryVerdict::Accept => {}
                EntryVerdict::Skip(SkipReason::Directory) => continue,
                EntryVerdict::Skip(SkipReason::Junk) => {
                    self.log.log(
                        &format!("Skipped junk entry: {}", entry.name),
                        LogLevel::Debug,
                    );
                    continue;
                }
                EntryVerdict::Reject(reason) => {
                    return Err(self.reject(reason, entry));
                }
            }

            let display = shorten(&entry.name, DISPLAY_NAME_CHARS);
            if throttle.at_entry(position, total) {
                let ratio = completion(written_bytes, total_bytes, position, total);
                progress.report(
                    self.band.percent(ratio),
                    &format!("Extracting: {}", display),
                );
            }

            let target = self.resolve_target(&root, entry)?;
            let mut source = archive.by_index(entry.index)?;
            let mut out = File::create(&target)?;

            loop {
                let read = source.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                out.write_all(&buffer[..read])?;
                written_bytes += read as u64;

                if throttle.at_chunk() {
                    let ratio = completion(written_bytes, total_bytes, position, total);
                    progress.report(
                        self.band.percent(ratio),
                        &format!("Extracting: {}", display),
                    );
                }
            }

            staged += 1;
        }

        info!(
            "Extracted {} files ({} bytes) from {}",
            staged,
            written_bytes,
            archive_path.display()
        );
        Ok(staged)
    }

    /// Compute and prepare the on-disk location for an entry
    ///
    /// `root` must already be canonical. The entry is joined, normalized
    /// lexically, and must stay strictly below `root`; once the parent is
    /// created its resolved form is checked again.
    fn resolve_target(&self, root: &Path, entry: &ArchiveEntry) -> Result<PathBuf> {
        let joined = root.join(entry.name.replace('\\', "/"));
        let target = normalize_lexically(&joined);

        if target == root || !target.starts_with(root) {
            return Err(self.reject(RejectReason::PathEscape, entry));
        }

        let parent = target
            .parent()
            .ok_or_else(|| self.reject(RejectReason::PathEscape, entry))?;
        fs::create_dir_all(parent)?;

        if !parent.canonicalize()?.starts_with(root) {
            return Err(self.reject(RejectReason::PathEscape, entry));
        }

        Ok(target)
    }

    fn reject(&self, reason: RejectReason, entry: &ArchiveEntry) -> Error {
        if reason == RejectReason::PathEscape {
            self.log.log(
                &format!("Blocked path traversal entry: {}", entry.name),
                LogLevel::Warn,
            );
        }
        Error::unsafe_archive(reason.describe(), vec![entry.name.clone()])
    }
}

fn completion(written: u64, total_bytes: u64, position: usize, total: usize) -> f64 {
    if total_bytes > 0 {
        written as f64 / total_bytes as f64
    } else if total > 0 {
        position as f64 / total as f64
    } else {
        0.0
    }
}

/// Space an archive of `archive_size` bytes needs to be installed safely
pub fn required_space(archive_size: u64) -> u64 {
    archive_size
        .saturating_mul(EXPANSION_FACTOR)
        .saturating_mul(SAFETY_MARGIN)
}

/// Fail if `available` bytes cannot hold `required`
pub fn ensure_space(available: u64, required: u64) -> Result<()> {
    if available < required {
        return Err(Error::InsufficientSpace {
            available,
            required,
        });
    }
    Ok(())
}

/// Best-effort free-space check before extracting `archive` under `dest`
///
/// Only a confirmed shortage is an error. If the archive size or the free
/// space cannot be determined, the failure is logged and the check passes.
pub fn check_disk_space(archive: &Path, dest: &Path, log: &dyn LogSink) -> Result<()> {
    let archive_size = match fs::metadata(archive) {
        Ok(meta) => meta.len(),
        Err(e) => {
            log.log(
                &format!("Disk space check skipped (archive size unknown): {}", e),
                LogLevel::Warn,
            );
            return Ok(());
        }
    };

    let anchor = existing_ancestor(dest);
    let available = match fs2::available_space(&anchor) {
        Ok(available) => available,
        Err(e) => {
            log.log(
                &format!(
                    "Disk space check skipped (cannot query {}): {}",
                    anchor.display(),
                    e
                ),
                LogLevel::Warn,
            );
            return Ok(());
        }
    };

    let required = required_space(archive_size);
    debug!(
        "Disk space check: {} available, {} required at {}",
        available,
        required,
        anchor.display()
    );
    ensure_space(available, required)
}

fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}
