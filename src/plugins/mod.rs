//! Plugin pipeline
//!
//! Plugins run strictly in configured order, each seeing the previous one's output.
//! There are three hooks, all optional:
//! - `process_commits`: rewrite parsed commits before candidates are built
//! - `preconfigure`: replace strategies (forcing versions) and add synthetic commits
//! - `run`: drop, merge or synthesize candidates
//!
//! Plugins are constructed from [`PluginConfig`] by [`build_plugins`]; embedders add their
//! own through `Manifest::with_plugin`.

pub mod group_priority;
pub mod linked_versions;
pub mod merge;
pub mod sentence_case;
pub mod workspace;

pub use group_priority::GroupPriority;
pub use linked_versions::LinkedVersions;
pub use merge::{Merge, MergeOptions};
pub use sentence_case::SentenceCase;
pub use workspace::{CargoWorkspace, MavenWorkspace, NodeWorkspace, WorkspacePackage, WorkspacePlugin};

use crate::core::config::{PluginConfig, RepositoryConfig};
use crate::core::error::ReleaseResult;
use crate::host::VcsHost;
use crate::release::candidate::{CandidateReleasePullRequest, Release};
use crate::release::commit::{Commit, CommitOverlay, ConventionalCommit};
use crate::strategy::{StrategiesByPath, StrategyFactory};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A stage of the candidate pipeline
#[async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str;

  fn process_commits(&self, commits: Vec<ConventionalCommit>) -> Vec<ConventionalCommit> {
    commits
  }

  /// Returns the (possibly replaced) strategies and synthetic commits to add per path
  async fn preconfigure(
    &self,
    strategies: StrategiesByPath,
    _commits_by_path: &BTreeMap<String, Vec<Commit>>,
    _releases_by_path: &BTreeMap<String, Release>,
  ) -> ReleaseResult<(StrategiesByPath, CommitOverlay)> {
    Ok((strategies, CommitOverlay::new()))
  }

  async fn run(&self, candidates: Vec<CandidateReleasePullRequest>) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    Ok(candidates)
  }
}

/// What every plugin may read about the repository
pub struct PluginContext {
  pub host: Arc<dyn VcsHost>,
  pub target_branch: String,
  pub manifest_path: String,
  pub repository_config: RepositoryConfig,
  /// Labels for pull requests a plugin synthesizes
  pub labels: Vec<String>,
  /// Tag component of each path that has one
  pub components_by_path: BTreeMap<String, String>,
  pub strategy_factory: Arc<dyn StrategyFactory>,
}

impl PluginContext {
  pub fn component_of(&self, path: &str) -> Option<&str> {
    self.components_by_path.get(path).map(String::as_str)
  }
}

/// Instantiate configured plugins in order
pub fn build_plugins(
  configs: &[PluginConfig],
  context: &Arc<PluginContext>,
  separate_pull_requests: bool,
) -> Vec<Box<dyn Plugin>> {
  let workspace_merge = |merge: &Option<bool>| merge.unwrap_or(!separate_pull_requests);
  configs
    .iter()
    .map(|config| -> Box<dyn Plugin> {
      match config {
        PluginConfig::CargoWorkspace { merge } => Box::new(CargoWorkspace::plugin(
          Arc::clone(context),
          true,
          workspace_merge(merge),
        )),
        PluginConfig::NodeWorkspace {
          update_all_packages,
          merge,
        } => Box::new(NodeWorkspace::plugin(
          Arc::clone(context),
          *update_all_packages,
          workspace_merge(merge),
        )),
        PluginConfig::MavenWorkspace {
          consider_all_artifacts,
          merge,
        } => Box::new(MavenWorkspace::plugin(
          Arc::clone(context),
          *consider_all_artifacts,
          workspace_merge(merge),
        )),
        PluginConfig::LinkedVersions {
          group_name,
          components,
          merge,
        } => Box::new(LinkedVersions::new(
          Arc::clone(context),
          group_name.clone(),
          components.clone(),
          *merge,
        )),
        PluginConfig::GroupPriority { groups } => Box::new(GroupPriority::new(groups.clone())),
        PluginConfig::SentenceCase { special_words } => Box::new(SentenceCase::new(special_words.clone())),
        PluginConfig::Merge {
          pull_request_title_pattern,
          pull_request_header,
          head_branch_name,
          force_merge,
        } => Box::new(Merge::new(
          &context.target_branch,
          MergeOptions {
            pull_request_title_pattern: pull_request_title_pattern.clone(),
            pull_request_header: pull_request_header.clone(),
            head_branch_name: head_branch_name.clone(),
            force_merge: *force_merge,
          },
        )),
      }
    })
    .collect()
}
