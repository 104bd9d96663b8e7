//! Release a set of components under one shared version
//!
//! Before candidates are built, each linked component's version is computed on its own
//! and the highest wins. Every linked strategy is rebuilt with that version forced, and
//! components without changes of their own get a synthetic `Release-As` commit so they
//! are still released. After building, the linked candidates are merged into one pull
//! request on the group's branch.

use super::merge::{Merge, MergeOptions};
use super::{Plugin, PluginContext};
use crate::core::error::ReleaseResult;
use crate::release::branch::BranchName;
use crate::release::candidate::{CandidateReleasePullRequest, Release};
use crate::release::commit::{Commit, CommitOverlay, parse_conventional_commits};
use crate::strategy::StrategiesByPath;
use async_trait::async_trait;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

pub struct LinkedVersions {
  context: Arc<PluginContext>,
  group_name: String,
  components: BTreeSet<String>,
  merge: bool,
}

impl LinkedVersions {
  pub fn new(context: Arc<PluginContext>, group_name: String, components: Vec<String>, merge: bool) -> Self {
    Self {
      context,
      group_name,
      components: components.into_iter().collect(),
      merge,
    }
  }

  fn sync_commit(&self, component: &str, version: &Version) -> Commit {
    Commit::new(
      "",
      format!(
        "chore({}): Synchronize {} versions\n\nRelease-As: {}",
        component, self.group_name, version
      ),
    )
  }
}

#[async_trait]
impl Plugin for LinkedVersions {
  fn name(&self) -> &'static str {
    "linked-versions"
  }

  async fn preconfigure(
    &self,
    strategies: StrategiesByPath,
    commits_by_path: &BTreeMap<String, Vec<Commit>>,
    releases_by_path: &BTreeMap<String, Release>,
  ) -> ReleaseResult<(StrategiesByPath, CommitOverlay)> {
    let mut group: BTreeMap<String, String> = BTreeMap::new();
    for (path, strategy) in &strategies {
      if let Some(component) = strategy.component().await?
        && self.components.contains(&component)
      {
        group.insert(path.clone(), component);
      }
    }
    info!("found {} components for group '{}'", group.len(), self.group_name);

    let mut versions: BTreeMap<&str, Version> = BTreeMap::new();
    for path in group.keys() {
      let commits = parse_conventional_commits(commits_by_path.get(path).map(Vec::as_slice).unwrap_or(&[]));
      let candidate = strategies[path]
        .build_release_pull_request(&commits, releases_by_path.get(path), false, &[])
        .await?;
      if let Some(version) = candidate.and_then(|c| c.version) {
        versions.insert(path, version);
      }
    }
    let Some(primary) = versions.values().max().cloned() else {
      return Ok((strategies, CommitOverlay::new()));
    };

    let mut overlay = CommitOverlay::new();
    let mut rebuilt = strategies.clone();
    for (path, component) in &group {
      info!("replacing strategy for {} with forced version {}", path, primary);
      let mut config = strategies[path].config().clone();
      config.release_as = Some(primary.clone());
      rebuilt.insert(path.clone(), self.context.strategy_factory.build(path, &config)?);
      if !versions.contains_key(path.as_str()) {
        debug!("appending synchronize commit for {}", path);
        overlay = overlay.with_commit(path.clone(), self.sync_commit(component, &primary));
      }
    }
    Ok((rebuilt, overlay))
  }

  async fn run(&self, candidates: Vec<CandidateReleasePullRequest>) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    if !self.merge {
      return Ok(candidates);
    }
    let (in_scope, mut out_of_scope): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| {
      c.pull_request.version.is_some()
        && self
          .context
          .component_of(&c.path)
          .is_some_and(|component| self.components.contains(component))
    });
    info!("found {} linked-versions candidates", in_scope.len());
    if in_scope.is_empty() {
      return Ok(out_of_scope);
    }

    let merge = Merge::new(
      &self.context.target_branch,
      MergeOptions {
        pull_request_title_pattern: Some(format!("chore${{scope}}: release {} libraries", self.group_name)),
        pull_request_header: None,
        head_branch_name: Some(
          BranchName::of_group_target_branch(&self.group_name, &self.context.target_branch).to_string(),
        ),
        force_merge: true,
      },
    );
    out_of_scope.extend(merge.merge(in_scope));
    Ok(out_of_scope)
  }
}
