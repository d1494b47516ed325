// src/filesystem/path.rs

//! Path sanitization utilities for security
//!
//! This module provides functions to safely handle file paths from untrusted
//! sources (archives, ledger files, user input) to prevent path traversal
//! attacks.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Characters refused in package folder names
const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest accepted package folder name, in characters
const MAX_NAME_CHARS: usize = 255;

/// Resolve `.` and `..` components without touching the filesystem
///
/// `..` at the root is dropped, so the result of normalizing an absolute path
/// is always absolute. Callers compare the result against a trusted root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
        }
    }

    result
}

/// Sanitize a relative path from an untrusted source
///
/// Rejects `..` components, absolute paths and empty paths; skips `.`.
///
/// # Examples
///
/// ```
/// use packledger::filesystem::path::sanitize_relative;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_relative("skin/body.dds").unwrap(), PathBuf::from("skin/body.dds"));
/// assert!(sanitize_relative("../etc/passwd").is_err());
/// assert!(sanitize_relative("/etc/passwd").is_err());
/// ```
pub fn sanitize_relative(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::InvalidPath(format!(
                    "Path traversal in {}",
                    path.display()
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::InvalidPath(format!(
                    "Absolute path not allowed: {}",
                    path.display()
                )));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath("Empty path after sanitization".to_string()));
    }

    Ok(normalized)
}

/// Safely join a root path with an untrusted relative path
///
/// Sanitizes the path and, when both sides exist on disk, verifies that the
/// resolved result is still under the resolved root (catches symlinks that
/// point outside).
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_relative(path.as_ref())?;
    let joined = root.join(&sanitized);

    if let (Ok(canonical_root), Ok(canonical_joined)) = (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::InvalidPath(format!(
            "Path {} escapes root {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Validate a package folder name (a single path component)
///
/// Rejects empty names, `.`/`..`, names over 255 characters and names
/// containing `< > : " / \ | ? *`.
pub fn sanitize_folder_name(name: &str) -> Result<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(Error::InvalidPath(format!("Invalid folder name: {:?}", name)));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(Error::InvalidPath(format!(
            "Folder name longer than {} characters",
            MAX_NAME_CHARS
        )));
    }
    if let Some(c) = trimmed.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(Error::InvalidPath(format!(
            "Folder name {:?} contains forbidden character {:?}",
            name, c
        )));
    }

    Ok(trimmed.to_string())
}

/// Ledger key for `path` relative to `root`, always `/`-separated
pub fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::InvalidPath(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    if parts.is_empty() {
        return Err(Error::InvalidPath(format!(
            "{} is the root itself",
            path.display()
        )));
    }

    Ok(parts.join("/"))
}
