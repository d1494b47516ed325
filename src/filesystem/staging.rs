// src/filesystem/staging.rs

//! Private staging directories for in-flight installs

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::debug;

const STAGING_PREFIX: &str = ".packledger-stage-";

/// Directory owned by exactly one install call
///
/// Removed when dropped, on success and on every error path.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a staging directory under `base` (or the system temp dir)
    ///
    /// `target_root` is the public install directory; the staging area must
    /// never live inside it.
    pub fn create(base: Option<&Path>, target_root: &Path) -> Result<Self> {
        let dir = match base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                Builder::new().prefix(STAGING_PREFIX).tempdir_in(base)?
            }
            None => Builder::new().prefix(STAGING_PREFIX).tempdir()?,
        };

        let resolved = dir.path().canonicalize()?;
        if let Ok(root) = target_root.canonicalize()
            && resolved.starts_with(&root)
        {
            return Err(Error::Config(format!(
                "Staging directory {} must not be inside the install root {}",
                resolved.display(),
                root.display()
            )));
        }

        debug!("Created staging area {}", resolved.display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the staging directory now, reporting failures
    pub fn close(self) -> Result<()> {
        let path: PathBuf = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed staging area {}", path.display());
        Ok(())
    }
}
