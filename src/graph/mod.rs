//! Dependency graph engine shared by the workspace plugins
//!
//! Format-specific code (cargo, node, maven) reads packages and their dependency names;
//! everything about traversal and ordering lives here.

pub mod dependency_graph;

pub use dependency_graph::{DependencyGraph, DependencyNode, Dependents};
