// src/config.rs

//! Configuration for packledger
//!
//! Values are loaded from, in increasing priority:
//! - hard-coded defaults
//! - a JSON file (`<config_dir>/packledger/config.json` or `--config`)
//! - `PACKLEDGER_*` environment variables
//! - command-line flags (applied by the binary)
//!
//! The library never caches a `Config`; callers read it when they need it.

use crate::archive::ExtensionPolicy;
use crate::archive::validator::DEFAULT_DENIED_EXTENSIONS;
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_folder_name;
use crate::ledger::DEFAULT_LEDGER_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR_NAME: &str = "packledger";
const CONFIG_FILE_NAME: &str = "config.json";

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory packages are installed into
    pub install_root: Option<PathBuf>,
    /// Parent of per-install staging directories (system temp dir if unset)
    pub staging_dir: Option<PathBuf>,
    /// Ledger file name inside the install root
    pub ledger_file: String,
    /// When set, only these extensions may be installed
    pub allowed_extensions: Option<Vec<String>>,
    pub denied_extensions: Vec<String>,
    /// Run the free-space estimate before extracting
    pub check_disk_space: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_root: None,
            staging_dir: None,
            ledger_file: DEFAULT_LEDGER_FILE.to_string(),
            allowed_extensions: None,
            denied_extensions: DEFAULT_DENIED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            check_disk_space: true,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Config("Cannot determine the user configuration directory".to_string())
        })?;
        Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the default configuration file, or defaults if it does not exist
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from `path` if given, otherwise from the default location
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Apply `PACKLEDGER_INSTALL_ROOT` and `PACKLEDGER_STAGING_DIR`
    pub fn merge_env(&mut self) {
        if let Some(root) = std::env::var_os("PACKLEDGER_INSTALL_ROOT") {
            self.install_root = Some(PathBuf::from(root));
        }
        if let Some(staging) = std::env::var_os("PACKLEDGER_STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(staging));
        }
    }

    /// Check values that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        let name = sanitize_folder_name(&self.ledger_file)
            .map_err(|e| Error::Config(format!("ledger_file: {}", e)))?;
        if name != self.ledger_file {
            return Err(Error::Config(format!(
                "ledger_file {:?} has surrounding whitespace",
                self.ledger_file
            )));
        }
        Ok(())
    }

    /// The configured install root
    pub fn install_root(&self) -> Result<&Path> {
        self.install_root.as_deref().ok_or_else(|| {
            Error::Config(
                "No install root configured (set install_root or pass --root)".to_string(),
            )
        })
    }

    /// Ledger file location for `install_root`
    pub fn ledger_path(&self, install_root: &Path) -> PathBuf {
        install_root.join(&self.ledger_file)
    }

    /// Extension rules built from the allow and deny lists
    pub fn policy(&self) -> ExtensionPolicy {
        let policy = ExtensionPolicy::default().with_denied(&self.denied_extensions);
        match &self.allowed_extensions {
            Some(allowed) => policy.with_allowed(allowed),
            None => policy,
        }
    }
}
