// src/ledger/models.rs

//! Data models for ledger entries
//!
//! These map onto the on-disk JSON document:
//!
//! ```text
//! {
//!   "installed_mods": { "<package>": { "files": [...], "install_time": "..." } },
//!   "file_map": { "<file>": "<package>" }
//! }
//! ```

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the ledger knows about one installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name; the map key in the JSON document
    #[serde(skip)]
    pub name: String,
    /// Relative file names the package currently owns
    #[serde(default)]
    pub files: BTreeSet<String>,
    /// Local time of the last record/merge/update
    #[serde(default, deserialize_with = "lenient_time")]
    pub install_time: Option<NaiveDateTime>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeSet::new(),
            install_time: None,
        }
    }

    /// Stamp the record with the current local time
    pub fn touch(&mut self) {
        self.install_time = Some(Local::now().naive_local());
    }
}

/// A pending install would claim a file owned by another package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub file: String,
    pub existing_owner: String,
    pub new_owner: String,
}

/// Borrowed view of the ledger used for serialization
#[derive(Debug, Serialize)]
pub(crate) struct LedgerDocument<'a> {
    pub installed_mods: &'a BTreeMap<String, PackageRecord>,
    pub file_map: &'a BTreeMap<String, String>,
}

/// Accept naive ISO timestamps, RFC 3339 timestamps, or nothing
///
/// Anything else loads as `None` rather than failing the record.
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::String(text)) = raw else {
        return Ok(None);
    };

    if let Ok(naive) = text.parse::<NaiveDateTime>() {
        return Ok(Some(naive));
    }
    if let Ok(aware) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(aware.with_timezone(&Local).naive_local()));
    }
    Ok(None)
}
