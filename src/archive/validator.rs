// src/archive/validator.rs

//! Pre-extraction archive validation
//!
//! Every entry is classified before any byte reaches disk. Directories and
//! platform junk are skipped; denied extensions, extensions outside a
//! configured allow list, and names that escape the archive root reject the
//! whole archive.

use crate::archive::ArchiveEntry;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Executable and script extensions refused by default
pub const DEFAULT_DENIED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "bat", "cmd", "ps1", "vbs", "js", "jar", "msi", "com", "scr",
];

/// Texture and config extensions accepted in skin packages
pub const SKIN_EXTENSIONS: &[&str] = &["dds", "blk", "tga"];

/// Whether an entry name is platform metadata rather than package content
///
/// Covers macOS resource forks and Finder metadata, and Windows folder
/// settings and thumbnail caches.
pub fn is_junk(name: &str) -> bool {
    if name.contains("__MACOSX") || name.to_lowercase().contains("desktop.ini") {
        return true;
    }
    name.split(['/', '\\'])
        .any(|segment| segment == ".DS_Store" || segment.eq_ignore_ascii_case("thumbs.db"))
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Extension allow/deny rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    allowed: Option<BTreeSet<String>>,
    denied: BTreeSet<String>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            allowed: None,
            denied: DEFAULT_DENIED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ExtensionPolicy {
    /// Policy with no allow list and no deny list
    pub fn permissive() -> Self {
        Self {
            allowed: None,
            denied: BTreeSet::new(),
        }
    }

    /// Default deny list plus the skin allow list
    pub fn skins() -> Self {
        Self::default().with_allowed(SKIN_EXTENSIONS.iter().copied())
    }

    /// Restrict accepted extensions to `extensions` (leading dots optional)
    pub fn with_allowed<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed = Some(
            extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
        );
        self
    }

    /// Replace the deny list
    pub fn with_denied<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denied = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    pub fn is_denied(&self, extension: &str) -> bool {
        self.denied.contains(&normalize_extension(extension))
    }

    /// Whether the allow list (if any) admits `extension`
    pub fn is_allowed(&self, extension: &str) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.contains(&normalize_extension(extension)),
            None => true,
        }
    }

    pub fn allowed(&self) -> Option<&BTreeSet<String>> {
        self.allowed.as_ref()
    }

    pub fn denied(&self) -> &BTreeSet<String> {
        &self.denied
    }
}

/// Why an entry is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Directory,
    Junk,
}

/// Why an entry rejects the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Name is absolute or climbs out of the archive root
    PathEscape,
    /// Extension is on the deny list
    DeniedExtension(String),
    /// An allow list is configured and the extension is not on it
    NotAllowed(String),
}

impl RejectReason {
    pub fn describe(&self) -> &str {
        match self {
            RejectReason::PathEscape => "entry escapes the extraction root",
            RejectReason::DeniedExtension(_) => "disallowed file type",
            RejectReason::NotAllowed(_) => "file type not in allow list",
        }
    }
}

/// Decision for a single archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryVerdict {
    Accept,
    Skip(SkipReason),
    Reject(RejectReason),
}

/// Summary of a successful validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of entries that will be extracted
    pub accepted: usize,
    /// Junk entries that will be ignored
    pub skipped_junk: Vec<String>,
    /// Total uncompressed size of accepted entries
    pub accepted_bytes: u64,
}

/// Inspects archive entries against an `ExtensionPolicy`
#[derive(Debug, Clone, Default)]
pub struct ArchiveValidator {
    policy: ExtensionPolicy,
}

impl ArchiveValidator {
    pub fn new(policy: ExtensionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ExtensionPolicy {
        &self.policy
    }

    /// Classify one entry
    pub fn classify(&self, entry: &ArchiveEntry) -> EntryVerdict {
        if entry.is_dir {
            return EntryVerdict::Skip(SkipReason::Directory);
        }
        if is_junk(&entry.name) {
            return EntryVerdict::Skip(SkipReason::Junk);
        }

        match entry.components() {
            Some(components) if !components.is_empty() => {}
            _ => return EntryVerdict::Reject(RejectReason::PathEscape),
        }

        if let Some(ext) = entry.extension() {
            if self.policy.is_denied(&ext) {
                return EntryVerdict::Reject(RejectReason::DeniedExtension(ext));
            }
            if !self.policy.is_allowed(&ext) {
                return EntryVerdict::Reject(RejectReason::NotAllowed(ext));
            }
        }

        EntryVerdict::Accept
    }

    /// Validate a full entry list, failing on the first category of rejection
    ///
    /// All offending entries are collected so the caller can show the user
    /// the complete list rather than the first hit.
    pub fn validate(&self, entries: &[ArchiveEntry]) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let mut escapes = Vec::new();
        let mut denied = Vec::new();
        let mut not_allowed = Vec::new();

        for entry in entries {
            match self.classify(entry) {
                EntryVerdict::Accept => {
                    report.accepted += 1;
                    report.accepted_bytes += entry.size;
                }
                EntryVerdict::Skip(SkipReason::Junk) => {
                    debug!("Skipping junk entry: {}", entry.name);
                    report.skipped_junk.push(entry.name.clone());
                }
                EntryVerdict::Skip(SkipReason::Directory) => {}
                EntryVerdict::Reject(RejectReason::PathEscape) => escapes.push(entry.name.clone()),
                EntryVerdict::Reject(RejectReason::DeniedExtension(_)) => {
                    denied.push(entry.name.clone())
                }
                EntryVerdict::Reject(RejectReason::NotAllowed(_)) => {
                    not_allowed.push(entry.name.clone())
                }
            }
        }

        if !escapes.is_empty() {
            return Err(Error::unsafe_archive(
                RejectReason::PathEscape.describe(),
                escapes,
            ));
        }
        if !denied.is_empty() {
            return Err(Error::unsafe_archive(
                RejectReason::DeniedExtension(String::new()).describe(),
                denied,
            ));
        }
        if !not_allowed.is_empty() {
            return Err(Error::unsafe_archive(
                RejectReason::NotAllowed(String::new()).describe(),
                not_allowed,
            ));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> ArchiveEntry {
        ArchiveEntry::new(0, name, false, 100)
    }

    #[test]
    fn test_junk_detection() {
        assert!(is_junk("__MACOSX/skin/._body.dds"));
        assert!(is_junk("skin/Desktop.ini"));
        assert!(is_junk("skin/.DS_Store"));
        assert!(is_junk("skin\\Thumbs.db"));
        assert!(!is_junk("skin/body.dds"));
    }

    #[test]
    fn test_directories_and_junk_are_skipped() {
        let validator = ArchiveValidator::new(ExtensionPolicy::skins());
        assert_eq!(
            validator.classify(&ArchiveEntry::new(0, "skin/", true, 0)),
            EntryVerdict::Skip(SkipReason::Directory)
        );
        // Junk is skipped even though .ini is not allow-listed
        assert_eq!(
            validator.classify(&file("skin/desktop.ini")),
            EntryVerdict::Skip(SkipReason::Junk)
        );
    }

    #[test]
    fn test_denied_extension_rejects_archive() {
        let validator = ArchiveValidator::default();
        let entries = vec![file("skin/body.dds"), file("skin/Setup.EXE")];

        match validator.validate(&entries) {
            Err(Error::UnsafeArchive { entries, .. }) => {
                assert_eq!(entries, vec!["skin/Setup.EXE".to_string()]);
            }
            other => panic!("expected UnsafeArchive, got {:?}", other),
        }
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let validator = ArchiveValidator::new(ExtensionPolicy::skins());
        assert_eq!(validator.classify(&file("skin/BODY.DDS")), EntryVerdict::Accept);
        assert_eq!(validator.classify(&file("skin/readme")), EntryVerdict::Accept);
        assert_eq!(
            validator.classify(&file("skin/notes.txt")),
            EntryVerdict::Reject(RejectReason::NotAllowed("txt".to_string()))
        );
    }

    #[test]
    fn test_no_allow_list_accepts_anything_not_denied() {
        let validator = ArchiveValidator::default();
        assert_eq!(validator.classify(&file("notes.txt")), EntryVerdict::Accept);
        assert_eq!(
            validator.classify(&file("run.ps1")),
            EntryVerdict::Reject(RejectReason::DeniedExtension("ps1".to_string()))
        );
    }

    #[test]
    fn test_traversal_is_rejected_before_extension_rules() {
        let validator = ArchiveValidator::new(ExtensionPolicy::permissive());
        assert_eq!(
            validator.classify(&file("../../evil")),
            EntryVerdict::Reject(RejectReason::PathEscape)
        );

        let err = validator
            .validate(&[file("ok.dds"), file("../../evil")])
            .unwrap_err();
        assert!(matches!(err, Error::UnsafeArchive { .. }));
    }

    #[test]
    fn test_report_counts() {
        let validator = ArchiveValidator::new(ExtensionPolicy::skins());
        let entries = vec![
            ArchiveEntry::new(0, "skin/", true, 0),
            ArchiveEntry::new(1, "skin/body.dds", false, 40),
            ArchiveEntry::new(2, "skin/body.blk", false, 2),
            ArchiveEntry::new(3, "__MACOSX/skin/._body.dds", false, 4),
        ];
        let report = validator.validate(&entries).unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.accepted_bytes, 42);
        assert_eq!(report.skipped_junk.len(), 1);
    }

    #[test]
    fn test_policy_normalizes_extensions() {
        let policy = ExtensionPolicy::permissive()
            .with_allowed([".DDS", "tga"])
            .with_denied(["EXE"]);
        assert!(policy.is_allowed("dds"));
        assert!(policy.is_allowed(".TGA"));
        assert!(policy.is_denied("exe"));
        assert!(!policy.is_allowed("blk"));
    }
}
