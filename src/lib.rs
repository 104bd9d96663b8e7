//! release-rail: manifest-driven release orchestration
//!
//! Given the commit history of a repository with many release units, decide what to
//! release next, propose it as release pull requests, and tag releases once those are
//! merged.
//!
//! - [`manifest`]: the orchestrator ([`manifest::Manifest`])
//! - [`plugins`]: candidate pipeline stages (merge, linked versions, workspaces, ...)
//! - [`graph`]: dependency ordering shared by workspace plugins
//! - [`strategy`]: per-path release builders
//! - [`release`]: tags, branches, titles, bodies, commits, notes and file updaters
//! - [`host`]: the VCS host interface with in-memory and local git implementations
//! - [`overflow`]: release notes too large for a pull request body
//! - [`core`]: config, errors, logging and local git access

pub mod commands;
pub mod core;
pub mod graph;
pub mod host;
pub mod manifest;
pub mod overflow;
pub mod plugins;
pub mod release;
pub mod strategy;
pub mod ui;

pub use crate::core::error::{ReleaseError, ReleaseResult};
pub use crate::manifest::{Manifest, ManifestOverrides};
