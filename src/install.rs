// src/install.rs

//! Install and uninstall coordination
//!
//! One install call runs, in order:
//! 1. validation of the entry list and a plan of the final layout
//! 2. a best-effort free-space check
//! 3. extraction into a private staging directory
//! 4. placement of the staged tree under the install root
//! 5. a single ledger update for the whole package
//!
//! Steps 1-4 abort the call on error and leave the ledger untouched. A failed
//! ledger write does not undo the files already placed; it is reported in
//! `InstallReport::ledger_saved`.

use crate::archive::{self, ArchiveValidator, ExtensionPolicy, SafeExtractor, check_disk_space};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filesystem::path::safe_join;
use crate::filesystem::reconcile::{TreeReconciler, plan_layout};
use crate::filesystem::staging::StagingArea;
use crate::ledger::{Conflict, OwnershipLedger};
use crate::logging::{LogLevel, LogSink, TRACING_LOG};
use crate::progress::{ProgressBand, ProgressSink};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Share of the progress scale used by extraction (2% to 87%)
const EXTRACT_BAND: ProgressBand = ProgressBand {
    base: 2.0,
    share: 85.0,
};

/// Per-call install options
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Ledger name for the package (defaults to the installed folder name)
    pub package: Option<String>,
    /// Replace an existing folder of the same name
    pub overwrite: bool,
    /// With `overwrite`, copy into the existing folder instead of replacing it
    pub merge: bool,
    /// Run the free-space estimate before extracting
    pub check_space: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            package: None,
            overwrite: false,
            merge: false,
            check_space: true,
        }
    }
}

/// What an install would do, computed without writing anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub package: String,
    pub folder_name: String,
    pub files: Vec<String>,
    pub conflicts: Vec<Conflict>,
    /// The destination folder already exists under the install root
    pub destination_exists: bool,
}

/// Outcome of a completed install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub package: String,
    pub target_dir: PathBuf,
    pub files: Vec<String>,
    /// Files taken over from other packages
    pub conflicts: Vec<Conflict>,
    pub ledger_saved: bool,
}

/// Outcome of an uninstall or partial removal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    pub package: String,
    pub was_installed: bool,
    /// Files deleted from disk
    pub removed: usize,
    /// Owned files that were already gone
    pub missing: usize,
    /// Files that could not be deleted; they stay in the ledger
    pub failed: Vec<String>,
    /// Ledger entries that do not resolve inside the install root
    pub skipped: Vec<String>,
    pub ledger_saved: bool,
}

#[derive(Debug, Default)]
struct Deletion {
    removed: usize,
    missing: usize,
    failed: Vec<String>,
    skipped: Vec<String>,
}

/// Runs installs and uninstalls against one install root
pub struct Installer<'a> {
    target_root: PathBuf,
    staging_base: Option<PathBuf>,
    validator: ArchiveValidator,
    log: &'a dyn LogSink,
}

impl<'a> Installer<'a> {
    pub fn new(target_root: impl Into<PathBuf>, policy: ExtensionPolicy) -> Self {
        Self {
            target_root: target_root.into(),
            staging_base: None,
            validator: ArchiveValidator::new(policy),
            log: &TRACING_LOG,
        }
    }

    /// Build an installer from the install root, staging dir and policy in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut installer = Self::new(config.install_root()?, config.policy());
        installer.staging_base = config.staging_dir.clone();
        Ok(installer)
    }

    /// Create staging directories under `dir` instead of the system temp dir
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_base = Some(dir.into());
        self
    }

    pub fn with_log(mut self, log: &'a dyn LogSink) -> Self {
        self.log = log;
        self
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Validate `archive_path` and plan the install without touching disk
    pub fn preflight(
        &self,
        archive_path: &Path,
        ledger: &OwnershipLedger,
        options: &InstallOptions,
    ) -> Result<Preflight> {
        let entries = archive::list_entries(archive_path)?;
        self.validator.validate(&entries)?;

        let stem = archive::archive_stem(archive_path)?;
        let layout = plan_layout(&entries, &self.validator, &stem)?;
        if layout.files.is_empty() {
            return Err(Error::InvalidArchive(format!(
                "{} contains no installable files",
                archive_path.display()
            )));
        }

        let package = options
            .package
            .clone()
            .unwrap_or_else(|| layout.folder_name.clone());
        let conflicts = ledger.check_conflicts(&package, &layout.files);
        let destination_exists = fs::symlink_metadata(self.target_root.join(&layout.folder_name)).is_ok();

        Ok(Preflight {
            package,
            folder_name: layout.folder_name,
            files: layout.files,
            conflicts,
            destination_exists,
        })
    }

    /// Install `archive_path` into the install root and record it
    pub fn install(
        &self,
        archive_path: &Path,
        ledger: &mut OwnershipLedger,
        options: &InstallOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<InstallReport> {
        progress.report(1, "Preparing");
        info!("Installing {}", archive_path.display());

        let plan = self.preflight(archive_path, ledger, options)?;
        if plan.destination_exists && !options.overwrite {
            return Err(Error::NameCollision(plan.folder_name));
        }

        if options.check_space {
            check_disk_space(archive_path, &self.target_root, self.log)?;
        }

        fs::create_dir_all(&self.target_root)?;
        let staging = StagingArea::create(self.staging_base.as_deref(), &self.target_root)?;

        let staged = SafeExtractor::new(&self.validator)
            .with_log(self.log)
            .with_band(EXTRACT_BAND)
            .extract(archive_path, staging.path(), progress)?;
        debug!("Staged {} files", staged);

        progress.report(98, "Organizing files");
        let stem = archive::archive_stem(archive_path)?;
        let placed = TreeReconciler::new(&self.target_root)
            .with_log(self.log)
            .with_merge(options.merge)
            .reconcile(staging.path(), &stem, options.overwrite)?;

        if let Err(e) = staging.close() {
            self.log.log(
                &format!("Failed to remove staging directory: {}", e),
                LogLevel::Warn,
            );
        }

        let package = options
            .package
            .clone()
            .unwrap_or_else(|| placed.folder_name.clone());
        let mut ledger_saved = true;
        if placed.replaced {
            ledger_saved = self.forget_replaced(ledger, &placed.folder_name, &placed.files);
        }

        let conflicts = ledger.check_conflicts(&package, &placed.files);
        for conflict in &conflicts {
            self.log.log(
                &format!(
                    "File conflict: {} was owned by {}, now owned by {}",
                    conflict.file, conflict.existing_owner, conflict.new_owner
                ),
                LogLevel::Warn,
            );
        }

        ledger_saved &= self.record(ledger.record_installation(&package, &placed.files));

        progress.report(100, "Done");
        info!(
            "Installed {} ({} files) into {}",
            package,
            placed.files.len(),
            placed.final_dir.display()
        );

        Ok(InstallReport {
            package,
            target_dir: placed.final_dir,
            files: placed.files,
            conflicts,
            ledger_saved,
        })
    }

    /// Drop files of a replaced folder that the new tree no longer contains
    ///
    /// The old folder is gone from disk, so every record listing a file under
    /// `folder_name/` that was not placed again loses that file.
    fn forget_replaced(
        &self,
        ledger: &mut OwnershipLedger,
        folder_name: &str,
        placed: &[String],
    ) -> bool {
        let prefix = format!("{}/", folder_name);
        let placed: BTreeSet<&str> = placed.iter().map(String::as_str).collect();

        let shrunk: Vec<(String, Vec<String>, usize)> = ledger
            .packages()
            .filter_map(|record| {
                let kept: Vec<String> = record
                    .files
                    .iter()
                    .filter(|f| !f.starts_with(&prefix) || placed.contains(f.as_str()))
                    .cloned()
                    .collect();
                let lost = record.files.len() - kept.len();
                (lost > 0).then(|| (record.name.clone(), kept, lost))
            })
            .collect();

        let mut saved = true;
        for (name, kept, lost) in shrunk {
            self.log.log(
                &format!("{} lost {} file(s) when {} was replaced", name, lost, folder_name),
                LogLevel::Info,
            );
            saved &= self.record(ledger.update_package_files(&name, &kept).map(|_| ()));
        }
        saved
    }

    /// Delete every file `package` owns and drop it from the ledger
    ///
    /// Directories left empty are removed. Files that cannot be deleted stay
    /// recorded under the package.
    pub fn uninstall(
        &self,
        package: &str,
        ledger: &mut OwnershipLedger,
    ) -> Result<UninstallReport> {
        let Some(files) = ledger.installed_files(package).cloned() else {
            debug!("uninstall: {} is not installed", package);
            return Ok(UninstallReport {
                package: package.to_string(),
                ..UninstallReport::default()
            });
        };

        let deletion = self.delete_files(&files);
        let outcome = if deletion.failed.is_empty() {
            ledger.remove_package(package)
        } else {
            ledger
                .update_package_files(package, &deletion.failed)
                .map(|_| ())
        };
        let ledger_saved = self.record(outcome);

        info!(
            "Uninstalled {}: {} removed, {} already missing",
            package, deletion.removed, deletion.missing
        );
        Ok(Self::report(package, deletion, ledger_saved))
    }

    /// Delete some of `package`'s files and shrink its record to match
    ///
    /// Names the package does not own are ignored with a warning.
    pub fn remove_files<S: AsRef<str>>(
        &self,
        package: &str,
        files: &[S],
        ledger: &mut OwnershipLedger,
    ) -> Result<UninstallReport> {
        let Some(owned) = ledger.installed_files(package).cloned() else {
            return Ok(UninstallReport {
                package: package.to_string(),
                ..UninstallReport::default()
            });
        };

        let mut targets = BTreeSet::new();
        for file in files {
            let file = file.as_ref();
            if owned.contains(file) {
                targets.insert(file.to_string());
            } else {
                self.log.log(
                    &format!("{} is not owned by {}, leaving it alone", file, package),
                    LogLevel::Warn,
                );
            }
        }

        let deletion = self.delete_files(&targets);
        let removed: BTreeSet<&String> = targets
            .iter()
            .filter(|file| !deletion.failed.contains(*file))
            .collect();
        let remaining: Vec<&String> = owned.iter().filter(|f| !removed.contains(f)).collect();

        let ledger_saved = self.record(
            ledger
                .update_package_files(package, remaining)
                .map(|_| ()),
        );
        Ok(Self::report(package, deletion, ledger_saved))
    }

    fn delete_files(&self, files: &BTreeSet<String>) -> Deletion {
        let mut deletion = Deletion::default();

        for file in files {
            let path = match safe_join(&self.target_root, file) {
                Ok(path) => path,
                Err(e) => {
                    self.log.log(
                        &format!("Not deleting ledger entry {}: {}", file, e),
                        LogLevel::Warn,
                    );
                    deletion.skipped.push(file.clone());
                    continue;
                }
            };

            match fs::remove_file(&path) {
                Ok(()) => {
                    deletion.removed += 1;
                    self.prune_empty_parents(&path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => deletion.missing += 1,
                Err(e) => {
                    self.log.log(
                        &format!("Failed to delete {}: {}", path.display(), e),
                        LogLevel::Error,
                    );
                    deletion.failed.push(file.clone());
                }
            }
        }

        deletion
    }

    /// Remove now-empty directories between `path` and the install root
    fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.target_root || !dir.starts_with(&self.target_root) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            debug!("Removed empty directory {}", dir.display());
            current = dir.parent();
        }
    }

    /// Turn a ledger write result into the `ledger_saved` flag
    fn record(&self, outcome: Result<()>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.log.log(
                    &format!("Ledger not saved, it may be stale on next load: {}", e),
                    LogLevel::Warn,
                );
                false
            }
        }
    }

    fn report(package: &str, deletion: Deletion, ledger_saved: bool) -> UninstallReport {
        UninstallReport {
            package: package.to_string(),
            was_installed: true,
            removed: deletion.removed,
            missing: deletion.missing,
            failed: deletion.failed,
            skipped: deletion.skipped,
            ledger_saved,
        }
    }
}
