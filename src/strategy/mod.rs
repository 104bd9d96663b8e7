//! Per-path release builders
//!
//! A [`Strategy`] turns the commits since a path's last release into a release pull
//! request, and a merged release pull request back into host releases. Every release kind
//! shares [`base::BaseStrategy`]; the kind only decides which file carries the version.
//!
//! Plugins that need to force a version (linked versions) rebuild strategies through a
//! [`StrategyFactory`] instead of mutating the ones they were given.

pub mod base;

pub use base::BaseStrategy;

use crate::core::config::{ReleaserConfig, RepositoryConfig};
use crate::core::error::ReleaseResult;
use crate::host::VcsHost;
use crate::release::branch::BranchName;
use crate::release::candidate::{Release, ReleasePullRequest};
use crate::release::commit::ConventionalCommit;
use crate::release::pull_request::PullRequest;
use async_trait::async_trait;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds release pull requests and releases for one configured path
#[async_trait]
pub trait Strategy: Send + Sync {
  fn path(&self) -> &str;

  fn config(&self) -> &ReleaserConfig;

  /// Component used in tags and titles. `None` when tags carry no component.
  async fn component(&self) -> ReleaseResult<Option<String>>;

  /// Component used in the head branch name, regardless of tag settings
  async fn branch_component(&self) -> ReleaseResult<Option<String>>;

  async fn branch_name(&self) -> ReleaseResult<BranchName>;

  /// Candidate for the commits since `latest_release`, or `None` when nothing user
  /// facing changed
  async fn build_release_pull_request(
    &self,
    commits: &[ConventionalCommit],
    latest_release: Option<&Release>,
    draft: bool,
    labels: &[String],
  ) -> ReleaseResult<Option<ReleasePullRequest>>;

  /// Releases to tag for a merged release pull request
  async fn build_releases(
    &self,
    merged: &PullRequest,
    group_title_pattern: Option<&str>,
  ) -> ReleaseResult<Vec<Release>>;

  /// Versions that are never published (snapshots) skip the manifest and host releases
  fn is_published_version(&self, _version: &Version) -> bool {
    true
  }
}

pub type StrategiesByPath = BTreeMap<String, Arc<dyn Strategy>>;

/// Constructs strategies from resolved config
pub trait StrategyFactory: Send + Sync {
  fn build(&self, path: &str, config: &ReleaserConfig) -> ReleaseResult<Arc<dyn Strategy>>;
}

/// Factory for the built-in release kinds
#[derive(Clone)]
pub struct BuiltinStrategies {
  host: Arc<dyn VcsHost>,
  target_branch: String,
}

impl BuiltinStrategies {
  pub fn new(host: Arc<dyn VcsHost>, target_branch: impl Into<String>) -> Self {
    Self {
      host,
      target_branch: target_branch.into(),
    }
  }

  /// Strategies for every configured path
  pub fn build_all(&self, repository_config: &RepositoryConfig) -> ReleaseResult<StrategiesByPath> {
    repository_config
      .iter()
      .map(|(path, config)| Ok((path.clone(), self.build(path, config)?)))
      .collect()
  }
}

impl StrategyFactory for BuiltinStrategies {
  fn build(&self, path: &str, config: &ReleaserConfig) -> ReleaseResult<Arc<dyn Strategy>> {
    Ok(Arc::new(BaseStrategy::new(
      Arc::clone(&self.host),
      &self.target_branch,
      path,
      config.clone(),
    )))
  }
}
