// src/archive/mod.rs

//! Package archive handling
//!
//! Packages arrive as ZIP archives from untrusted sources. This module:
//! - Opens archives and lists their entries without extracting anything
//! - Decodes entry names that are not flagged as UTF-8
//! - Validates entries against extension and path-safety rules
//! - Streams accepted entries into a private staging directory

pub mod extract;
pub mod names;
pub mod validator;

pub use extract::{SafeExtractor, check_disk_space};
pub use validator::{ArchiveValidator, EntryVerdict, ExtensionPolicy, RejectReason, SkipReason};

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Metadata about one entry in a package archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position of the entry inside the archive
    pub index: usize,
    /// Decoded entry name, as stored (not normalized)
    pub name: String,
    pub is_dir: bool,
    /// Uncompressed size in bytes
    pub size: u64,
}

impl ArchiveEntry {
    pub fn new(index: usize, name: impl Into<String>, is_dir: bool, size: u64) -> Self {
        Self {
            index,
            name: name.into(),
            is_dir,
            size,
        }
    }

    /// Normalized path components, or `None` if the name escapes the root
    pub fn components(&self) -> Option<Vec<String>> {
        names::normalize_entry_name(&self.name)
    }

    /// Lowercased extension of the last path segment
    pub fn extension(&self) -> Option<String> {
        let last = self
            .name
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()?;
        Path::new(last)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

/// Open a package archive, checking it is a `.zip` file
pub fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let is_zip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip {
        return Err(Error::InvalidArchive(format!(
            "{} is not a .zip file",
            path.display()
        )));
    }

    let file = File::open(path).map_err(|e| {
        Error::InvalidArchive(format!("Failed to open {}: {}", path.display(), e))
    })?;

    ZipArchive::new(file)
        .map_err(|e| Error::InvalidArchive(format!("{}: {}", path.display(), e)))
}

/// List every entry of an open archive with decoded names
pub fn read_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        let name = names::decode_entry_name(file.name_raw(), file.name());
        let is_dir = file.is_dir() || name.ends_with('\\');
        entries.push(ArchiveEntry::new(index, name, is_dir, file.size()));
    }

    debug!("Read {} archive entries", entries.len());
    Ok(entries)
}

/// Open a package archive and list its entries
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open_archive(path)?;
    read_entries(&mut archive)
}

/// Archive base name without the `.zip` extension
pub fn archive_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| Error::InvalidArchive(format!("{} has no file name", path.display())))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;

    /// Write a ZIP archive containing `(name, content)` entries
    ///
    /// Names ending in `/` become directory entries.
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap();
    }
}
