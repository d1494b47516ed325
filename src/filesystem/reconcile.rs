// src/filesystem/reconcile.rs

//! Placement of a staged tree into the shared install root
//!
//! An archive holding a single top-level folder installs under that folder's
//! name. Anything else (loose files, several folders) is wrapped in a folder
//! named after the archive. Existing destinations are only replaced when the
//! caller asks for it.

use crate::archive::validator::{ArchiveValidator, EntryVerdict, is_junk};
use crate::archive::ArchiveEntry;
use crate::error::{Error, Result};
use crate::filesystem::path::{relative_name, sanitize_folder_name};
use crate::logging::{LogLevel, LogSink, TRACING_LOG};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Scratch folder used inside the staging area to wrap loose top-level items
const ASSEMBLY_DIR: &str = ".packledger-assembly";

/// Planned shape of an install, computed from the entry list alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Folder created under the install root
    pub folder_name: String,
    /// True when the archive's single top-level folder is used as-is
    pub from_content: bool,
    /// Ledger keys of the files the install will produce
    pub files: Vec<String>,
}

/// Plan where an archive's files will land without extracting it
///
/// Applies the same rules as `TreeReconciler::reconcile`, so the returned
/// file names can be checked against the ledger before touching disk.
pub fn plan_layout(
    entries: &[ArchiveEntry],
    validator: &ArchiveValidator,
    archive_stem: &str,
) -> Result<Layout> {
    // top-level name -> is a directory
    let mut top_level: BTreeMap<String, bool> = BTreeMap::new();
    let mut paths: Vec<Vec<String>> = Vec::new();

    // Only accepted files reach the staging tree; directory entries, junk
    // and empty names never create anything there.
    for entry in entries {
        if validator.classify(entry) != EntryVerdict::Accept {
            continue;
        }
        let Some(components) = entry.components() else {
            continue;
        };
        let Some(first) = components.first() else {
            continue;
        };

        *top_level.entry(first.clone()).or_insert(false) |= components.len() > 1;
        paths.push(components);
    }

    let single_folder = match top_level.iter().next() {
        Some((name, true)) if top_level.len() == 1 => Some(name.clone()),
        _ => None,
    };

    let (folder_name, from_content) = match single_folder {
        Some(name) => (sanitize_folder_name(&name)?, true),
        None => (sanitize_folder_name(archive_stem)?, false),
    };

    let files: BTreeSet<String> = paths
        .into_iter()
        .map(|components| {
            if from_content {
                components.join("/")
            } else {
                format!("{}/{}", folder_name, components.join("/"))
            }
        })
        .collect();

    Ok(Layout {
        folder_name,
        from_content,
        files: files.into_iter().collect(),
    })
}

/// Result of placing a staged tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub final_dir: PathBuf,
    pub folder_name: String,
    /// Ledger keys (relative to the install root) of the files placed
    pub files: Vec<String>,
    /// An existing folder was swapped out and deleted
    pub replaced: bool,
}

/// Moves staged trees into the install root
pub struct TreeReconciler<'a> {
    target_root: PathBuf,
    merge: bool,
    log: &'a dyn LogSink,
}

impl<'a> TreeReconciler<'a> {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
            merge: false,
            log: &TRACING_LOG,
        }
    }

    pub fn with_log(mut self, log: &'a dyn LogSink) -> Self {
        self.log = log;
        self
    }

    /// On overwrite, merge into the existing folder instead of replacing it
    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Place the contents of `staged_dir` under the install root
    ///
    /// Fails with `NameCollision` when the destination folder exists and
    /// `overwrite` is false. With `overwrite`, the old folder is moved aside,
    /// the new tree moved in, and the old one deleted; if moving the new tree
    /// fails the old folder is put back. Files of the old folder belonged to
    /// whichever packages the ledger says; the caller must drop them from
    /// those records (see `Reconciled::replaced`).
    ///
    /// In merge mode the staged tree is merged into the existing folder
    /// instead: only colliding files are replaced and everything else in the
    /// folder is kept.
    ///
    /// `Reconciled::files` lists only the staged files, never files that were
    /// already in the destination.
    pub fn reconcile(
        &self,
        staged_dir: &Path,
        archive_stem: &str,
        overwrite: bool,
    ) -> Result<Reconciled> {
        fs::create_dir_all(&self.target_root)?;

        let top_level = top_level_entries(staged_dir)?;
        if top_level.is_empty() {
            return Err(Error::InvalidArchive(
                "archive contains no installable files".to_string(),
            ));
        }

        let (folder_name, source) = if top_level.len() == 1 && top_level[0].is_dir() {
            let name = top_level[0]
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (sanitize_folder_name(&name)?, top_level[0].clone())
        } else {
            let name = sanitize_folder_name(archive_stem)?;
            let wrapper = staged_dir.join(ASSEMBLY_DIR);
            fs::create_dir(&wrapper)?;
            for item in &top_level {
                if let Some(file_name) = item.file_name() {
                    fs::rename(item, wrapper.join(file_name))?;
                }
            }
            (name, wrapper)
        };

        let mut files: Vec<String> = collect_files(&source, &source)?
            .into_iter()
            .map(|file| format!("{}/{}", folder_name, file))
            .collect();
        files.sort();

        let final_dir = self.target_root.join(&folder_name);
        let mut replaced = false;
        if fs::symlink_metadata(&final_dir).is_ok() {
            if !overwrite {
                return Err(Error::NameCollision(folder_name));
            }
            if self.merge {
                debug!("Merging into existing {}", final_dir.display());
                move_tree(&source, &final_dir)?;
            } else {
                self.replace(&source, &final_dir, &folder_name)?;
                replaced = true;
            }
        } else {
            move_tree(&source, &final_dir)?;
        }

        info!(
            "Placed {} files into {}",
            files.len(),
            final_dir.display()
        );

        Ok(Reconciled {
            final_dir,
            folder_name,
            files,
            replaced,
        })
    }

    fn replace(&self, source: &Path, final_dir: &Path, folder_name: &str) -> Result<()> {
        let backup = self
            .target_root
            .join(format!(".{}.packledger-old", folder_name));
        if fs::symlink_metadata(&backup).is_ok() {
            remove_path(&backup)?;
        }

        debug!("Moving {} aside for overwrite", final_dir.display());
        fs::rename(final_dir, &backup)?;

        match move_tree(source, final_dir) {
            Ok(()) => {
                if let Err(e) = remove_path(&backup) {
                    self.log.log(
                        &format!(
                            "Failed to remove previous version at {}: {}",
                            backup.display(),
                            e
                        ),
                        LogLevel::Warn,
                    );
                }
                Ok(())
            }
            Err(e) => {
                if fs::symlink_metadata(final_dir).is_ok()
                    && let Err(cleanup) = remove_path(final_dir)
                {
                    self.log.log(
                        &format!("Failed to clean partial {}: {}", final_dir.display(), cleanup),
                        LogLevel::Error,
                    );
                }
                if let Err(restore) = fs::rename(&backup, final_dir) {
                    self.log.log(
                        &format!(
                            "Failed to restore {} from {}: {}",
                            final_dir.display(),
                            backup.display(),
                            restore
                        ),
                        LogLevel::Error,
                    );
                }
                Err(e)
            }
        }
    }
}

/// Top-level items of a staged tree, junk excluded, sorted by name
fn top_level_entries(staged_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut items = Vec::new();
    for entry in fs::read_dir(staged_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_junk(&name) {
            continue;
        }
        if name == ASSEMBLY_DIR {
            return Err(Error::InvalidArchive(format!(
                "archive contains reserved name {}",
                ASSEMBLY_DIR
            )));
        }
        items.push(entry.path());
    }
    items.sort();
    Ok(items)
}

/// Move `src` to `dst`, merging into existing directories
///
/// When `dst` is an existing directory, children are merged one level at a
/// time; only colliding files are replaced. Falls back to copy-and-delete
/// when a rename is impossible (e.g. across filesystems).
pub fn move_tree(src: &Path, dst: &Path) -> Result<()> {
    let src_meta = fs::symlink_metadata(src)?;

    if src_meta.is_dir() {
        match fs::symlink_metadata(dst) {
            Ok(dst_meta) if dst_meta.is_dir() => {
                for child in fs::read_dir(src)? {
                    let child = child?;
                    move_tree(&child.path(), &dst.join(child.file_name()))?;
                }
                fs::remove_dir(src)?;
                return Ok(());
            }
            Ok(_) => remove_path(dst)?,
            Err(_) => {}
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        return rename_or_copy(src, dst);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(dst).is_ok() {
        remove_path(dst)?;
    }
    rename_or_copy(src, dst)
}

fn rename_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Err(e) = fs::rename(src, dst) {
        debug!(
            "Rename {} -> {} failed ({}), copying instead",
            src.display(),
            dst.display(),
            e
        );
        copy_tree(src, dst)?;
        remove_path(src)?;
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !fs::symlink_metadata(src)?.is_dir() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file or a whole directory tree
pub fn remove_path(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Ledger keys of every regular file under `dir`, relative to `root`
pub fn collect_files(root: &Path, dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(relative_name(root, entry.path())?);
        }
    }
    Ok(files)
}
