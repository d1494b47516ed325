// src/ledger/persist.rs

//! Crash-safe file replacement
//!
//! The new content goes to a temporary file in the destination directory,
//! is flushed to disk, and is then renamed over the old file. A crash at any
//! point leaves either the old file or the new one, never a truncated mix.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `path` with `content`
///
/// The parent directory is created if needed. The temporary file is removed
/// automatically when any step fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
