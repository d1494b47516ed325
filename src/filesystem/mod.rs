// src/filesystem/mod.rs

//! Filesystem operations for package installs
//!
//! Provides path sanitization, private staging directories, and placement of
//! staged trees into the shared install root.

pub mod path;
pub mod reconcile;
pub mod staging;

pub use path::{safe_join, sanitize_folder_name, sanitize_relative};
pub use reconcile::{Layout, Reconciled, TreeReconciler, move_tree, plan_layout};
pub use staging::StagingArea;
