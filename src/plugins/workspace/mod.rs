//! Propagate releases through a package manager's workspace
//!
//! When a package is released, every workspace package depending on it must be bumped
//! too, and so on transitively. [`WorkspacePlugin`] does the traversal once for every
//! package manager; a [`WorkspaceKind`] only knows how to read its packages, rewrite a
//! package manifest and list the dependency versions a manifest declares.
//!
//! Steps of a run:
//! 1. split candidates by the kind's scope predicate
//! 2. load packages and build the [`DependencyGraph`]
//! 3. order the seeds (all packages, or those with a candidate) plus their dependents
//! 4. update existing candidates, synthesize patch releases for the rest
//! 5. merge, then record new versions in the versions manifest

pub mod cargo;
pub mod maven;
pub mod node;

pub use cargo::Cargo;
pub use maven::Maven;
pub use node::Node;

use super::merge::{Merge, MergeOptions};
use super::{Plugin, PluginContext};
use crate::core::config::{ReleaseKind, ReleaserConfig};
use crate::core::error::ReleaseResult;
use crate::graph::{DependencyGraph, DependencyNode};
use crate::release::body::{PullRequestBody, ReleaseData};
use crate::release::branch::BranchName;
use crate::release::candidate::{CandidateReleasePullRequest, ReleasePullRequest};
use crate::release::changelog::append_dependencies_section;
use crate::release::title::PullRequestTitle;
use crate::release::updater::{Update, Updater, merge_updates};
use crate::release::version::{VersionBump, VersionsMap};
use crate::strategy::base::add_path;
use async_trait::async_trait;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type CargoWorkspace = WorkspacePlugin<Cargo>;
pub type NodeWorkspace = WorkspacePlugin<Node>;
pub type MavenWorkspace = WorkspacePlugin<Maven>;

/// Dependency versions declared by a manifest, per dependency section
pub type DeclaredDependencies = Vec<(&'static str, BTreeMap<String, String>)>;

/// One package of a workspace, whatever the package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePackage {
  /// Name other packages refer to it by (`groupId:artifactId` for maven)
  pub name: String,
  /// Directory relative to the repository root
  pub path: String,
  pub manifest_path: String,
  pub manifest_content: String,
  pub version: Version,
  /// Every dependency name, workspace or not
  pub deps: Vec<String>,
}

/// What differs between package managers
#[async_trait]
pub trait WorkspaceKind: Send + Sync {
  fn name(&self) -> &'static str;

  /// Release kind given to synthesized candidates
  fn release_kind(&self) -> ReleaseKind;

  fn in_scope(&self, candidate: &CandidateReleasePullRequest) -> bool;

  async fn load_packages(
    &self,
    context: &PluginContext,
    candidates: &[CandidateReleasePullRequest],
  ) -> ReleaseResult<Vec<WorkspacePackage>>;

  fn find_candidate<'a>(
    &self,
    package: &WorkspacePackage,
    candidates: &'a [CandidateReleasePullRequest],
  ) -> Option<&'a CandidateReleasePullRequest> {
    candidates.iter().find(|c| c.path == package.path)
  }

  fn bump_version(&self, version: &Version) -> Version {
    VersionBump::Patch.apply(version)
  }

  /// Whether the version goes into the versions manifest
  fn is_release_version(&self, _version: &Version) -> bool {
    true
  }

  /// Rewrites a package manifest to `version` with workspace dependencies bumped
  fn updater(&self, version: &Version, updated_versions: &VersionsMap) -> Updater;

  fn declared_dependencies(&self, manifest_content: &str) -> ReleaseResult<DeclaredDependencies>;

  /// Last chance to add repository-wide updates (lock files)
  async fn post_process(
    &self,
    _context: &PluginContext,
    candidates: Vec<CandidateReleasePullRequest>,
    _updated_versions: &VersionsMap,
  ) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    Ok(candidates)
  }
}

pub struct WorkspacePlugin<W> {
  context: Arc<PluginContext>,
  kind: W,
  update_all_packages: bool,
  merge: bool,
}

impl<W: WorkspaceKind> WorkspacePlugin<W> {
  pub fn new(context: Arc<PluginContext>, kind: W, update_all_packages: bool, merge: bool) -> Self {
    Self {
      context,
      kind,
      update_all_packages,
      merge,
    }
  }

  /// Versions every ordered package ends up with, and the subset of new releases to
  /// record in the versions manifest
  fn updated_versions(
    &self,
    ordered: &[&DependencyNode<WorkspacePackage>],
    candidates_by_package: &BTreeMap<String, CandidateReleasePullRequest>,
  ) -> (VersionsMap, VersionsMap) {
    let mut updated = VersionsMap::new();
    let mut path_versions = VersionsMap::new();
    for node in ordered {
      let existing = candidates_by_package
        .get(&node.name)
        .and_then(|c| c.pull_request.version.clone());
      match existing {
        Some(version) => {
          debug!("{}: {} from its own release", node.name, version);
          updated.insert(node.name.clone(), version);
        }
        None => {
          let version = self.kind.bump_version(&node.value.version);
          debug!("{}: {} forced bump", node.name, version);
          if self.kind.is_release_version(&version) {
            path_versions.insert(node.value.path.clone(), version.clone());
          }
          updated.insert(node.name.clone(), version);
        }
      }
    }
    (updated, path_versions)
  }

  fn dependency_notes(&self, package: &WorkspacePackage, updated_content: &str) -> ReleaseResult<String> {
    let before = self.kind.declared_dependencies(&package.manifest_content)?;
    let after = self.kind.declared_dependencies(updated_content)?;
    Ok(dependency_notes(&before, &after))
  }

  fn update_candidate(
    &self,
    mut candidate: CandidateReleasePullRequest,
    package: &WorkspacePackage,
    updated_versions: &VersionsMap,
  ) -> ReleaseResult<CandidateReleasePullRequest> {
    let version = updated_versions.get(&package.name).unwrap_or(&package.version);
    let content = self
      .kind
      .updater(version, updated_versions)
      .update_content(Some(&package.manifest_content))?;
    let notes = self.dependency_notes(package, &content)?;

    let pull_request = &mut candidate.pull_request;
    let mut rewritten = false;
    for update in &mut pull_request.updates {
      if update.path == package.manifest_path {
        update.updater = Updater::RawContent {
          content: content.clone(),
        };
        rewritten = true;
      } else if let Updater::Changelog { entry, .. } = &mut update.updater
        && !notes.is_empty()
      {
        *entry = append_dependencies_section(entry, &notes);
      }
    }
    if !rewritten {
      pull_request
        .updates
        .push(Update::new(&package.manifest_path, Updater::RawContent { content }));
    }

    if !notes.is_empty() {
      match pull_request.body.release_data.first_mut() {
        Some(data) => data.notes = append_dependencies_section(&data.notes, &notes),
        None => pull_request.body.release_data.push(ReleaseData::new(
          Some(&package.name),
          pull_request.version.clone(),
          append_dependencies_section("", &notes),
        )),
      }
    }
    Ok(candidate)
  }

  fn new_candidate(
    &self,
    package: &WorkspacePackage,
    updated_versions: &VersionsMap,
  ) -> ReleaseResult<CandidateReleasePullRequest> {
    let version = updated_versions
      .get(&package.name)
      .cloned()
      .unwrap_or_else(|| self.kind.bump_version(&package.version));
    let content = self
      .kind
      .updater(&version, updated_versions)
      .update_content(Some(&package.manifest_content))?;
    let notes = self.dependency_notes(package, &content)?;
    let dependencies_section = append_dependencies_section("", &notes);

    let config = self
      .context
      .repository_config
      .get(&package.path)
      .cloned()
      .unwrap_or_else(|| ReleaserConfig::of_kind(self.kind.release_kind()));
    let component = self.context.component_of(&package.path).unwrap_or(&package.name).to_string();
    let target_branch = &self.context.target_branch;
    let changelog_entry = format!(
      "## {} ({})\n\n{}",
      version,
      chrono::Utc::now().format("%Y-%m-%d"),
      dependencies_section
    );

    let pull_request = ReleasePullRequest {
      title: PullRequestTitle::of_component_target_branch_version(
        &component,
        target_branch,
        &version,
        config.pull_request_title_pattern.as_deref(),
      ),
      body: PullRequestBody::new(vec![ReleaseData::new(
        Some(&component),
        Some(version.clone()),
        dependencies_section,
      )]),
      labels: self.context.labels.clone(),
      head_ref_name: BranchName::of_component_target_branch(&component, target_branch).to_string(),
      version: Some(version.clone()),
      draft: false,
      group: config.group.clone(),
      updates: vec![
        Update::new(&package.manifest_path, Updater::RawContent { content }),
        Update::new(
          add_path(&package.path, &config.changelog_path),
          Updater::Changelog {
            version,
            entry: changelog_entry,
          },
        ),
      ],
    };
    Ok(CandidateReleasePullRequest::new(&package.path, pull_request, config))
  }
}

#[async_trait]
impl<W: WorkspaceKind> Plugin for WorkspacePlugin<W> {
  fn name(&self) -> &'static str {
    self.kind.name()
  }

  async fn run(&self, candidates: Vec<CandidateReleasePullRequest>) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    info!("running {} plugin", self.kind.name());
    let mut in_scope = Vec::new();
    let mut out_of_scope = Vec::new();
    for candidate in candidates {
      if candidate.pull_request.version.is_none() {
        warn!("candidate for {} has no version, leaving it alone", candidate.path);
        out_of_scope.push(candidate);
      } else if self.kind.in_scope(&candidate) {
        in_scope.push(candidate);
      } else {
        out_of_scope.push(candidate);
      }
    }
    if in_scope.is_empty() {
      info!("no {} candidates in scope", self.kind.name());
      return Ok(out_of_scope);
    }

    let packages = self.kind.load_packages(&self.context, &in_scope).await?;
    let mut candidates_by_package: BTreeMap<String, CandidateReleasePullRequest> = BTreeMap::new();
    for package in &packages {
      match self.kind.find_candidate(package, &in_scope) {
        Some(candidate) => {
          candidates_by_package.insert(package.name.clone(), candidate.clone());
        }
        None => debug!("no candidate for {} at {}", package.name, package.path),
      }
    }

    info!("building dependency graph for {} packages", packages.len());
    let graph = DependencyGraph::build(
      packages
        .into_iter()
        .map(|p| DependencyNode::new(p.name.clone(), p.deps.clone(), p)),
    );
    let seeds: Vec<String> = if self.update_all_packages {
      graph.names().into_iter().map(str::to_string).collect()
    } else {
      candidates_by_package.keys().cloned().collect()
    };
    let ordered = graph.order(&seeds)?;
    info!("updating {} packages", ordered.len());

    let (updated_versions, path_versions) = self.updated_versions(&ordered, &candidates_by_package);

    let mut by_name = ordered;
    by_name.sort_by(|a, b| a.name.cmp(&b.name));
    let mut processed_paths: BTreeSet<String> = BTreeSet::new();
    let mut new_candidates = Vec::new();
    for node in by_name {
      let package = &node.value;
      let target_path = candidates_by_package
        .get(&node.name)
        .map(|c| c.path.clone())
        .unwrap_or_else(|| package.path.clone());
      if !processed_paths.insert(target_path.clone()) {
        info!("already updated candidate for path {}, skipping {}", target_path, node.name);
        continue;
      }
      let candidate = match candidates_by_package.get(&node.name) {
        Some(existing) => {
          info!("updating existing candidate for {} at {}", node.name, existing.path);
          self.update_candidate(existing.clone(), package, &updated_versions)?
        }
        None => {
          info!("creating new candidate for {}", node.name);
          self.new_candidate(package, &updated_versions)?
        }
      };
      new_candidates.push(candidate);
    }

    // in-scope candidates whose path is not a workspace package pass through untouched
    for candidate in in_scope {
      if !processed_paths.contains(&candidate.path) {
        debug!("{} is not a {} package", candidate.path, self.kind.name());
        new_candidates.push(candidate);
      }
    }
    if new_candidates.is_empty() {
      return Ok(out_of_scope);
    }

    if self.merge {
      info!("merging {} in-scope candidates", new_candidates.len());
      new_candidates = Merge::new(&self.context.target_branch, MergeOptions::default()).merge(new_candidates);
    }

    if !path_versions.is_empty()
      && let Some(first) = new_candidates.first_mut()
    {
      let updates = &mut first.pull_request.updates;
      updates.push(Update::new(
        &self.context.manifest_path,
        Updater::ReleaseManifest {
          versions_map: path_versions,
        },
      ));
      *updates = merge_updates(std::mem::take(updates));
    }

    info!("post-processing {} in-scope candidates", new_candidates.len());
    let new_candidates = self
      .kind
      .post_process(&self.context, new_candidates, &updated_versions)
      .await?;

    out_of_scope.extend(new_candidates);
    Ok(out_of_scope)
  }
}

/// `* The following workspace dependencies were updated` block listing every declared
/// dependency whose version changed between two manifests
pub fn dependency_notes(before: &DeclaredDependencies, after: &DeclaredDependencies) -> String {
  let mut notes = String::new();
  for (section, deps) in after {
    let original = before.iter().find(|(s, _)| s == section).map(|(_, d)| d);
    let mut lines = String::new();
    for (name, version) in deps {
      let previous = original.and_then(|d| d.get(name));
      if previous == Some(version) {
        continue;
      }
      match previous {
        Some(previous) => lines.push_str(&format!("\n    * {} bumped from {} to {}", name, previous, version)),
        None => lines.push_str(&format!("\n    * {} bumped to {}", name, version)),
      }
    }
    if !lines.is_empty() {
      notes.push_str(&format!("\n  * {}{}", section, lines));
    }
  }
  if notes.is_empty() {
    return notes;
  }
  format!("* The following workspace dependencies were updated{}", notes)
}
