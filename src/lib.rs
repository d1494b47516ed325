// src/lib.rs

//! packledger: package installation and ownership ledger
//!
//! Installs asset packages delivered as ZIP archives into a shared directory
//! and records which package owns which installed file.
//!
//! # Architecture
//!
//! - Validate first: every archive entry is checked before any byte is written
//! - Staged installs: extraction goes to a private directory, then moves into place
//! - Ownership ledger: `package -> files` and `file -> owner`, persisted as JSON
//! - Conflict detection: files claimed by a different package are reported
//!   before the new package takes them over

pub mod archive;
pub mod config;
mod error;
pub mod filesystem;
pub mod install;
pub mod ledger;
pub mod logging;
pub mod progress;

pub use error::{Error, Result};
