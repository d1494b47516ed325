// src/ledger/mod.rs

//! Ownership ledger for installed packages
//!
//! This module tracks which package owns which installed file:
//! - `package -> files` records with install timestamps
//! - a reverse `file -> owner` index used for conflict detection
//! - merge (`record_installation`) and replace (`update_package_files`)
//!   updates, kept as separate operations
//! - crash-safe persistence to a JSON file inside the install root
//!
//! Every mutating call writes the ledger before returning. A failed write is
//! returned as `Error::LedgerSave`; the in-memory state keeps the change.

pub mod models;
pub mod persist;

pub use models::{Conflict, PackageRecord};

use crate::error::{Error, Result};
use models::LedgerDocument;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default ledger file name inside the install root
pub const DEFAULT_LEDGER_FILE: &str = ".manifest.json";

/// Persistent record of package ownership
#[derive(Debug, Clone)]
pub struct OwnershipLedger {
    path: PathBuf,
    installed: BTreeMap<String, PackageRecord>,
    file_owner: BTreeMap<String, String>,
}

impl OwnershipLedger {
    /// Empty ledger that will be saved to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            installed: BTreeMap::new(),
            file_owner: BTreeMap::new(),
        }
    }

    /// Load the ledger at `path`, degrading to an empty ledger on failure
    ///
    /// Load failures are logged and never fatal; the next successful save
    /// replaces the unreadable file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!("{}; starting with an empty ledger", e);
                Self::empty(path)
            }
        }
    }

    /// Load the ledger at `path`
    ///
    /// A missing file is an empty ledger. Missing keys load as empty
    /// collections and unreadable package records are dropped. Index entries
    /// that disagree with the package records are repaired in memory. Fails
    /// with `LedgerLoad` when the file cannot be read or is not a JSON object.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut ledger = Self::load_unrepaired(path)?;
        let repaired = ledger.normalize();
        if repaired > 0 {
            warn!(
                "Repaired {} inconsistent entries in {}",
                repaired,
                ledger.path.display()
            );
        }
        Ok(ledger)
    }

    /// Load the ledger at `path` exactly as stored, without repairs
    ///
    /// Used to audit a ledger file; `verify_consistency` on the result reports
    /// what `load` would repair.
    pub fn load_unrepaired(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => {
                return Err(Error::LedgerLoad(format!("{}: {}", path.display(), e)));
            }
        };

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::LedgerLoad(format!("{}: {}", path.display(), e)))?;
        let Value::Object(mut root) = value else {
            return Err(Error::LedgerLoad(format!(
                "{}: not a JSON object",
                path.display()
            )));
        };

        let mut installed = BTreeMap::new();
        if let Some(Value::Object(mods)) = root.remove("installed_mods") {
            for (name, raw) in mods {
                match serde_json::from_value::<PackageRecord>(raw) {
                    Ok(mut record) => {
                        record.name = name.clone();
                        installed.insert(name, record);
                    }
                    Err(e) => warn!("Dropping unreadable ledger record {}: {}", name, e),
                }
            }
        }

        let mut file_owner = BTreeMap::new();
        if let Some(Value::Object(map)) = root.remove("file_map") {
            for (file, owner) in map {
                if let Value::String(owner) = owner {
                    file_owner.insert(file, owner);
                }
            }
        }

        let ledger = Self {
            path,
            installed,
            file_owner,
        };
        debug!(
            "Loaded ledger with {} packages and {} files",
            ledger.installed.len(),
            ledger.file_owner.len()
        );
        Ok(ledger)
    }

    /// Restore the two-way consistency between records and the owner index
    ///
    /// Owner entries pointing at unknown packages or at files missing from the
    /// owner's record are dropped. Owned files missing from the index are
    /// claimed; a file listed by two packages stays with its indexed owner.
    fn normalize(&mut self) -> usize {
        let mut repaired = 0;

        let installed = &self.installed;
        self.file_owner.retain(|file, owner| {
            let valid = installed
                .get(owner)
                .is_some_and(|record| record.files.contains(file));
            if !valid {
                repaired += 1;
            }
            valid
        });

        for (name, record) in self.installed.iter_mut() {
            record.files.retain(|file| match self.file_owner.get(file) {
                Some(owner) if owner != name => {
                    repaired += 1;
                    false
                }
                Some(_) => true,
                None => {
                    repaired += 1;
                    self.file_owner.insert(file.clone(), name.clone());
                    true
                }
            });
        }

        repaired
    }

    /// Files in `files` already owned by a package other than `package`
    pub fn check_conflicts<I, S>(&self, package: &str, files: I) -> Vec<Conflict>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut conflicts = Vec::new();

        for file in files {
            let file = file.as_ref();
            if !seen.insert(file.to_string()) {
                continue;
            }
            if let Some(owner) = self.file_owner.get(file)
                && owner != package
            {
                conflicts.push(Conflict {
                    file: file.to_string(),
                    existing_owner: owner.clone(),
                    new_owner: package.to_string(),
                });
            }
        }

        conflicts
    }

    /// Merge `files` into `package`'s record and save
    ///
    /// Files owned by another package are transferred to `package`. The
    /// ledger is written once for the whole batch.
    pub fn record_installation<I, S>(&mut self, package: &str, files: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let files: BTreeSet<String> = files.into_iter().map(|f| f.as_ref().to_string()).collect();

        for file in &files {
            self.claim(package, file);
        }

        let record = self
            .installed
            .entry(package.to_string())
            .or_insert_with(|| PackageRecord::new(package));
        record.files.extend(files);
        record.touch();

        info!(
            "Recorded package {} ({} files)",
            package,
            record.files.len()
        );
        self.save()
    }

    /// Replace `package`'s file set with exactly `files` and save
    ///
    /// Returns `Ok(false)` without touching anything when the package is
    /// unknown. Dropped files lose their owner entry only if it still points
    /// at `package`.
    pub fn update_package_files<I, S>(&mut self, package: &str, files: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(record) = self.installed.get(package) else {
            debug!("update_package_files: unknown package {}", package);
            return Ok(false);
        };

        let files: BTreeSet<String> = files.into_iter().map(|f| f.as_ref().to_string()).collect();
        let dropped: Vec<String> = record.files.difference(&files).cloned().collect();

        for file in &dropped {
            if self.file_owner.get(file).map(String::as_str) == Some(package) {
                self.file_owner.remove(file);
            }
        }
        for file in &files {
            self.claim(package, file);
        }

        if let Some(record) = self.installed.get_mut(package) {
            record.files = files;
            record.touch();
        }

        self.save()?;
        Ok(true)
    }

    /// Delete `package` and every owner entry pointing at it
    ///
    /// Removing an absent package succeeds without writing.
    pub fn remove_package(&mut self, package: &str) -> Result<()> {
        let had_record = self.installed.remove(package).is_some();
        let before = self.file_owner.len();
        self.file_owner.retain(|_, owner| owner != package);

        if !had_record && before == self.file_owner.len() {
            debug!("remove_package: {} not installed", package);
            return Ok(());
        }

        info!("Removed package {} from ledger", package);
        self.save()
    }

    /// Forget everything and delete the ledger file
    pub fn clear(&mut self) -> Result<()> {
        self.installed.clear();
        self.file_owner.clear();

        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Deleted ledger {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::LedgerSave(format!(
                "Failed to delete {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Write the ledger to disk atomically
    pub fn save(&self) -> Result<()> {
        let document = LedgerDocument {
            installed_mods: &self.installed,
            file_map: &self.file_owner,
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| Error::LedgerSave(format!("Failed to encode ledger: {}", e)))?;

        persist::atomic_write(&self.path, &json)
            .map_err(|e| Error::LedgerSave(format!("{}: {}", self.path.display(), e)))?;

        debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }

    /// Point `file` at `package`, removing it from any previous owner's record
    fn claim(&mut self, package: &str, file: &str) {
        if let Some(previous) = self.file_owner.get(file)
            && previous != package
        {
            debug!("Transferring {} from {} to {}", file, previous, package);
            if let Some(record) = self.installed.get_mut(previous) {
                record.files.remove(file);
            }
        }
        self.file_owner.insert(file.to_string(), package.to_string());
    }

    pub fn installed_files(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.installed.get(package).map(|record| &record.files)
    }

    pub fn get(&self, package: &str) -> Option<&PackageRecord> {
        self.installed.get(package)
    }

    /// All package records, ordered by name
    pub fn packages(&self) -> impl Iterator<Item = &PackageRecord> {
        self.installed.values()
    }

    pub fn owner_of(&self, file: &str) -> Option<&str> {
        self.file_owner.get(file).map(String::as_str)
    }

    /// Number of installed packages
    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Describe every violation of the record/owner-index consistency rules
    pub fn verify_consistency(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (file, owner) in &self.file_owner {
            match self.installed.get(owner) {
                None => problems.push(format!("{} is owned by unknown package {}", file, owner)),
                Some(record) if !record.files.contains(file) => problems.push(format!(
                    "{} is owned by {} but missing from its record",
                    file, owner
                )),
                Some(_) => {}
            }
        }

        for (name, record) in &self.installed {
            for file in &record.files {
                match self.file_owner.get(file) {
                    None => problems.push(format!("{} lists {} but has no owner entry", name, file)),
                    Some(owner) if owner != name => problems.push(format!(
                        "{} lists {} but it is owned by {}",
                        name, file, owner
                    )),
                    Some(_) => {}
                }
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger() -> (TempDir, OwnershipLedger) {
        let dir = TempDir::new().unwrap();
        let ledger = OwnershipLedger::open(dir.path().join(DEFAULT_LEDGER_FILE));
        (dir, ledger)
    }

    #[test]
    fn test_record_is_idempotent() {
        let (_dir, mut ledger) = ledger();
        let files = ["camo/a.dds", "camo/b.blk"];

        ledger.record_installation("camo", files).unwrap();
        ledger.record_installation("camo", files).unwrap();

        let owned = ledger.installed_files("camo").unwrap();
        assert_eq!(owned.len(), 2);
        for file in files {
            assert_eq!(ledger.owner_of(file), Some("camo"));
        }
        assert!(ledger.verify_consistency().is_empty());
    }

    #[test]
    fn test_record_merges_instead_of_replacing() {
        let (_dir, mut ledger) = ledger();
        ledger.record_installation("camo", ["camo/a.dds"]).unwrap();
        ledger.record_installation("camo", ["camo/b.dds"]).unwrap();

        let owned: Vec<_> = ledger.installed_files("camo").unwrap().iter().collect();
        assert_eq!(owned, vec!["camo/a.dds", "camo/b.dds"]);
    }

    #[test]
    fn test_ownership_transfer() {
        let (_dir, mut ledger) = ledger();
        ledger.record_installation("A", ["x", "y"]).unwrap();
        ledger.record_installation("B", ["x"]).unwrap();

        assert_eq!(ledger.owner_of("x"), Some("B"));
        assert!(!ledger.installed_files("A").unwrap().contains("x"));
        assert!(ledger.installed_files("A").unwrap().contains("y"));
        assert!(ledger.verify_consistency().is_empty());
    }

    #[test]
    fn test_conflicts_exempt_the_owner() {
        let (_dir, mut ledger) = ledger();
        ledger.record_installation("A", ["x"]).unwrap();

        assert!(ledger.check_conflicts("A", ["x"]).is_empty());

        let conflicts = ledger.check_conflicts("B", ["x", "x", "fresh"]);
        assert_eq!(
            conflicts,
            vec![Conflict {
                file: "x".to_string(),
                existing_owner: "A".to_string(),
                new_owner: "B".to_string(),
            }]
        );
    }

    #[test]
    fn test_remove_package_clears_owner_entries() {
        let (_dir, mut ledger) = ledger();
        ledger.record_installation("A", ["a1", "a2"]).unwrap();
        ledger.record_installation("B", ["b1"]).unwrap();

        ledger.remove_package("A").unwrap();

        assert!(ledger.get("A").is_none());
        assert!(ledger.owner_of("a1").is_none());
        assert!(ledger.owner_of("a2").is_none());
        assert_eq!(ledger.owner_of("b1"), Some("B"));

        // absent package is a no-op success
        ledger.remove_package("A").unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_update_replaces_file_set() {
        let (_dir, mut ledger) = ledger();
        ledger.record_installation("A", ["a1", "a2", "shared"]).unwrap();
        ledger.record_installation("B", ["shared"]).unwrap();

        // "shared" now belongs to B; dropping it from A must not unown it
        let updated = ledger.update_package_files("A", ["a1", "a3"]).unwrap();
        assert!(updated);

        let owned: Vec<_> = ledger.installed_files("A").unwrap().iter().collect();
        assert_eq!(owned, vec!["a1", "a3"]);
        assert!(ledger.owner_of("a2").is_none());
        assert_eq!(ledger.owner_of("a3"), Some("A"));
        assert_eq!(ledger.owner_of("shared"), Some("B"));
        assert!(ledger.verify_consistency().is_empty());
    }

    #[test]
    fn test_update_unknown_package_is_refused() {
        let (dir, mut ledger) = ledger();
        assert!(!ledger.update_package_files("ghost", ["x"]).unwrap());
        assert!(ledger.is_empty());
        assert!(ledger.owner_of("x").is_none());
        assert!(!dir.path().join(DEFAULT_LEDGER_FILE).exists());
    }

    #[test]
    fn test_round_trip() {
        let (dir, mut ledger) = ledger();
        ledger.record_installation("A", ["a/1.dds", "a/2.dds"]).unwrap();
        ledger.record_installation("B", ["b/1.blk"]).unwrap();

        let reloaded = OwnershipLedger::load(dir.path().join(DEFAULT_LEDGER_FILE)).unwrap();
        assert_eq!(reloaded.installed, ledger.installed);
        assert_eq!(reloaded.file_owner, ledger.file_owner);
        assert_eq!(reloaded.get("A").unwrap().name, "A");
    }

    #[test]
    fn test_on_disk_format() {
        let (dir, mut ledger) = ledger();
        ledger.record_installation("A", ["a/1.dds"]).unwrap();

        let text = fs::read_to_string(dir.path().join(DEFAULT_LEDGER_FILE)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["installed_mods"]["A"]["files"][0], "a/1.dds");
        assert!(value["installed_mods"]["A"]["install_time"].is_string());
        assert_eq!(value["file_map"]["a/1.dds"], "A");
    }

    #[test]
    fn test_non_object_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_LEDGER_FILE);

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(OwnershipLedger::load(&path), Err(Error::LedgerLoad(_))));
        assert!(OwnershipLedger::open(&path).is_empty());

        fs::write(&path, "{ truncated").unwrap();
        assert!(OwnershipLedger::open(&path).is_empty());
    }

    #[test]
    fn test_missing_keys_load_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_LEDGER_FILE);
        fs::write(&path, r#"{"installed_mods": {"A": {}}}"#).unwrap();

        let ledger = OwnershipLedger::load(&path).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.installed_files("A").unwrap().is_empty());
    }

    #[test]
    fn test_load_repairs_inconsistencies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_LEDGER_FILE);
        fs::write(
            &path,
            r#"{
                "installed_mods": {
                    "A": {"files": ["a", "both"]},
                    "B": {"files": ["both", "orphan"]}
                },
                "file_map": {"a": "A", "both": "A", "stale": "A", "ghost": "Z"}
            }"#,
        )
        .unwrap();

        let ledger = OwnershipLedger::load(&path).unwrap();
        assert!(ledger.verify_consistency().is_empty());
        assert!(ledger.owner_of("stale").is_none());
        assert!(ledger.owner_of("ghost").is_none());
        assert_eq!(ledger.owner_of("orphan"), Some("B"));
        assert_eq!(ledger.owner_of("both"), Some("A"));
        assert!(!ledger.installed_files("B").unwrap().contains("both"));
    }

    #[test]
    fn test_load_unrepaired_reports_stored_problems() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_LEDGER_FILE);
        fs::write(
            &path,
            r#"{
                "installed_mods": {"A": {"files": ["a", "orphan"]}},
                "file_map": {"a": "A", "ghost": "Z"}
            }"#,
        )
        .unwrap();

        let raw = OwnershipLedger::load_unrepaired(&path).unwrap();
        let problems = raw.verify_consistency();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("ghost")));
        assert!(problems.iter().any(|p| p.contains("orphan")));
        assert!(raw.owner_of("orphan").is_none());

        let repaired = OwnershipLedger::load(&path).unwrap();
        assert!(repaired.verify_consistency().is_empty());
        assert_eq!(repaired.owner_of("orphan"), Some("A"));

        // missing file is still an empty ledger
        let missing = OwnershipLedger::load_unrepaired(dir.path().join("none.json")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (dir, mut ledger) = ledger();
        let path = dir.path().join(DEFAULT_LEDGER_FILE);
        ledger.record_installation("A", ["a"]).unwrap();
        assert!(path.exists());

        ledger.clear().unwrap();
        assert!(ledger.is_empty());
        assert!(!path.exists());
        ledger.clear().unwrap();
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger-dir");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        let mut ledger = OwnershipLedger::empty(&path);
        let result = ledger.record_installation("A", ["a"]);

        assert!(matches!(result, Err(Error::LedgerSave(_))));
        assert_eq!(ledger.owner_of("a"), Some("A"));
    }
}
