//! Core building blocks shared by every part of release-rail
//!
//! - **config**: `release-please-config.json` and versions manifest parsing
//! - **error**: error types with contextual help messages and exit codes
//! - **logging**: `tracing` subscriber setup
//! - **vcs**: local repository access through the system `git` binary

pub mod config;
pub mod error;
pub mod logging;
pub mod vcs;
