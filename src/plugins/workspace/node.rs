//! Node workspaces
//!
//! Packages are the configured `node` paths. Dependencies come from all four
//! `package.json` dependency maps; range prefixes (`^`, `~`, ...) survive a bump.

use super::{DeclaredDependencies, WorkspaceKind, WorkspacePackage, WorkspacePlugin};
use crate::core::config::{ROOT_PROJECT_PATH, ReleaseKind};
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use crate::plugins::PluginContext;
use crate::release::candidate::CandidateReleasePullRequest;
use crate::release::updater::Updater;
use crate::release::version::{VersionsMap, parse_version};
use crate::strategy::base::add_path;
use async_trait::async_trait;
use semver::Version;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const NODE_DEPENDENCY_SECTIONS: [&str; 4] = [
  "dependencies",
  "devDependencies",
  "peerDependencies",
  "optionalDependencies",
];

pub struct Node;

impl WorkspacePlugin<Node> {
  pub fn plugin(context: Arc<PluginContext>, update_all_packages: bool, merge: bool) -> Self {
    Self::new(context, Node, update_all_packages, merge)
  }
}

fn parse_package(path: &str, manifest_path: &str, content: String) -> ReleaseResult<WorkspacePackage> {
  let parsed: Value = serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", manifest_path))?;
  let field = |key: &str| -> ReleaseResult<&str> {
    parsed
      .get(key)
      .and_then(Value::as_str)
      .ok_or_else(|| ReleaseError::config(manifest_path, format!("missing \"{}\"", key)))
  };
  let name = field("name")?.to_string();
  let version = parse_version(field("version")?)?;

  let mut deps: Vec<String> = NODE_DEPENDENCY_SECTIONS
    .iter()
    .filter_map(|section| parsed.get(*section).and_then(Value::as_object))
    .flat_map(|map| map.keys().cloned())
    .collect();
  deps.sort();
  deps.dedup();

  Ok(WorkspacePackage {
    name,
    path: path.to_string(),
    manifest_path: manifest_path.to_string(),
    manifest_content: content,
    version,
    deps,
  })
}

#[async_trait]
impl WorkspaceKind for Node {
  fn name(&self) -> &'static str {
    "node-workspace"
  }

  fn release_kind(&self) -> ReleaseKind {
    ReleaseKind::Node
  }

  fn in_scope(&self, candidate: &CandidateReleasePullRequest) -> bool {
    candidate.config.release_type == ReleaseKind::Node && candidate.path != ROOT_PROJECT_PATH
  }

  async fn load_packages(
    &self,
    context: &PluginContext,
    _candidates: &[CandidateReleasePullRequest],
  ) -> ReleaseResult<Vec<WorkspacePackage>> {
    let mut packages = Vec::new();
    for (path, config) in &context.repository_config {
      if config.release_type != ReleaseKind::Node || path == ROOT_PROJECT_PATH {
        continue;
      }
      let manifest_path = add_path(path, "package.json");
      debug!("reading {}", manifest_path);
      let content = context
        .host
        .get_file(&manifest_path, &context.target_branch)
        .await
        .with_context(|| format!("Failed to read {}", manifest_path))?;
      packages.push(parse_package(path, &manifest_path, content)?);
    }
    Ok(packages)
  }

  fn updater(&self, version: &Version, updated_versions: &VersionsMap) -> Updater {
    Updater::PackageJson {
      version: version.clone(),
      versions_map: updated_versions.clone(),
    }
  }

  fn declared_dependencies(&self, manifest_content: &str) -> ReleaseResult<DeclaredDependencies> {
    let parsed: Value = serde_json::from_str(manifest_content).context("Failed to parse package.json")?;
    Ok(
      NODE_DEPENDENCY_SECTIONS
        .iter()
        .filter_map(|section| {
          let map = parsed.get(*section)?.as_object()?;
          let versions: BTreeMap<String, String> = map
            .iter()
            .filter_map(|(name, range)| Some((name.clone(), range.as_str()?.to_string())))
            .collect();
          Some((*section, versions))
        })
        .collect(),
    )
  }
}
