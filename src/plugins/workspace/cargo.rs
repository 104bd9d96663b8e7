//! Cargo workspaces
//!
//! Members come from the root `Cargo.toml` `[workspace].members` (a trailing `/*` glob
//! expands to every crate one level below). Every workspace crate is reconsidered on each
//! run, and the root `Cargo.lock` is kept in step with the bumped versions.

use super::{DeclaredDependencies, WorkspaceKind, WorkspacePackage, WorkspacePlugin};
use crate::core::config::{ROOT_PROJECT_PATH, ReleaseKind};
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use crate::host::{VcsHost, get_optional_file};
use crate::plugins::PluginContext;
use crate::release::candidate::CandidateReleasePullRequest;
use crate::release::updater::{Update, Updater, merge_updates};
use crate::release::version::{VersionsMap, parse_version};
use crate::strategy::base::add_path;
use async_trait::async_trait;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;
use toml_edit::{DocumentMut, Item};
use tracing::{debug, info, warn};

const CARGO_DEPENDENCY_SECTIONS: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];
const CARGO_LOCK: &str = "Cargo.lock";

pub struct Cargo;

impl WorkspacePlugin<Cargo> {
  pub fn plugin(context: Arc<PluginContext>, update_all_packages: bool, merge: bool) -> Self {
    Self::new(context, Cargo, update_all_packages, merge)
  }
}

/// Read every member crate of the cargo workspace on `branch`
pub async fn load_workspace(host: &dyn VcsHost, branch: &str) -> ReleaseResult<Vec<WorkspacePackage>> {
  let root = host.get_file("Cargo.toml", branch).await.context("Failed to read root Cargo.toml")?;
  let root_doc: DocumentMut = root.parse().context("Failed to parse root Cargo.toml")?;
  let Some(workspace) = root_doc.get("workspace").and_then(Item::as_table_like) else {
    warn!("root Cargo.toml has no [workspace] table");
    return Ok(Vec::new());
  };
  let workspace_version = workspace
    .get("package")
    .and_then(Item::as_table_like)
    .and_then(|p| p.get("version"))
    .and_then(Item::as_str)
    .map(parse_version)
    .transpose()?;

  let members: Vec<&str> = workspace
    .get("members")
    .and_then(Item::as_array)
    .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
    .unwrap_or_default();
  let excluded: Vec<&str> = workspace
    .get("exclude")
    .and_then(Item::as_array)
    .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
    .unwrap_or_default();

  let mut paths = Vec::new();
  for member in members {
    match member.strip_suffix("/*") {
      Some(parent) => {
        let mut found: Vec<String> = host
          .find_files_by_filename("Cargo.toml", branch, Some(parent))
          .await?
          .into_iter()
          .filter_map(|file| file.strip_suffix("/Cargo.toml").map(str::to_string))
          .filter(|dir| dir.rsplit_once('/').is_some_and(|(p, _)| p == parent))
          .collect();
        found.sort();
        paths.extend(found);
      }
      None => paths.push(member.trim_end_matches('/').to_string()),
    }
  }
  paths.retain(|p| !excluded.contains(&p.as_str()));
  paths.dedup();

  let mut packages = Vec::with_capacity(paths.len());
  for path in paths {
    let manifest_path = add_path(&path, "Cargo.toml");
    let content = host
      .get_file(&manifest_path, branch)
      .await
      .with_context(|| format!("Failed to read workspace member {}", manifest_path))?;
    packages.push(parse_crate(&path, &manifest_path, content, workspace_version.as_ref())?);
  }
  Ok(packages)
}

fn parse_crate(
  path: &str,
  manifest_path: &str,
  content: String,
  workspace_version: Option<&Version>,
) -> ReleaseResult<WorkspacePackage> {
  let doc: DocumentMut = content
    .parse()
    .with_context(|| format!("Failed to parse {}", manifest_path))?;
  let package = doc
    .get("package")
    .and_then(Item::as_table_like)
    .ok_or_else(|| ReleaseError::config(manifest_path, "missing [package] table"))?;
  let name = package
    .get("name")
    .and_then(Item::as_str)
    .ok_or_else(|| ReleaseError::config(manifest_path, "missing package.name"))?
    .to_string();
  let version = match package.get("version").map(Item::as_str) {
    Some(Some(version)) => parse_version(version)?,
    // version.workspace = true
    Some(None) => workspace_version
      .cloned()
      .ok_or_else(|| ReleaseError::config(manifest_path, "inherits a version the workspace does not set"))?,
    None => return Err(ReleaseError::config(manifest_path, "missing package.version")),
  };

  let mut deps = Vec::new();
  for section in CARGO_DEPENDENCY_SECTIONS {
    if let Some(table) = doc.get(section).and_then(Item::as_table_like) {
      deps.extend(table.iter().map(|(dep, _)| dep.to_string()));
    }
  }
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

/// Bump the local (source-less) packages of a lock file
fn update_cargo_lock(content: &str, updated_versions: &VersionsMap) -> ReleaseResult<String> {
  let mut doc: DocumentMut = content.parse().context("Failed to parse Cargo.lock")?;
  let Some(packages) = doc.get_mut("package").and_then(Item::as_array_of_tables_mut) else {
    return Ok(content.to_string());
  };
  for package in packages.iter_mut() {
    if package.contains_key("source") {
      continue;
    }
    let Some(version) = package
      .get("name")
      .and_then(Item::as_str)
      .and_then(|name| updated_versions.get(name))
    else {
      continue;
    };
    debug!("updating {} in Cargo.lock to {}", package.get("name").and_then(Item::as_str).unwrap_or_default(), version);
    package.insert("version", toml_edit::value(version.to_string()));
  }
  Ok(doc.to_string())
}

#[async_trait]
impl WorkspaceKind for Cargo {
  fn name(&self) -> &'static str {
    "cargo-workspace"
  }

  fn release_kind(&self) -> ReleaseKind {
    ReleaseKind::Rust
  }

  fn in_scope(&self, candidate: &CandidateReleasePullRequest) -> bool {
    candidate.config.release_type == ReleaseKind::Rust && candidate.path != ROOT_PROJECT_PATH
  }

  async fn load_packages(
    &self,
    context: &PluginContext,
    _candidates: &[CandidateReleasePullRequest],
  ) -> ReleaseResult<Vec<WorkspacePackage>> {
    load_workspace(context.host.as_ref(), &context.target_branch).await
  }

  fn updater(&self, version: &Version, updated_versions: &VersionsMap) -> Updater {
    Updater::CargoToml {
      version: version.clone(),
      versions_map: updated_versions.clone(),
    }
  }

  fn declared_dependencies(&self, manifest_content: &str) -> ReleaseResult<DeclaredDependencies> {
    let doc: DocumentMut = manifest_content.parse().context("Failed to parse Cargo.toml")?;
    let mut declared = Vec::new();
    for section in CARGO_DEPENDENCY_SECTIONS {
      let Some(table) = doc.get(section).and_then(Item::as_table_like) else {
        continue;
      };
      let versions: BTreeMap<String, String> = table
        .iter()
        .filter_map(|(name, item)| {
          let version = item
            .as_str()
            .or_else(|| item.as_table_like().and_then(|t| t.get("version")).and_then(Item::as_str))?;
          Some((name.to_string(), version.to_string()))
        })
        .collect();
      declared.push((section, versions));
    }
    Ok(declared)
  }

  async fn post_process(
    &self,
    context: &PluginContext,
    mut candidates: Vec<CandidateReleasePullRequest>,
    updated_versions: &VersionsMap,
  ) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    let Some(root) = candidates.iter_mut().find(|c| c.path == ROOT_PROJECT_PATH) else {
      debug!("no root candidate, leaving {} alone", CARGO_LOCK);
      return Ok(candidates);
    };
    let Some(lock) = get_optional_file(context.host.as_ref(), CARGO_LOCK, &context.target_branch).await? else {
      return Ok(candidates);
    };
    info!("updating {} for {} crates", CARGO_LOCK, updated_versions.len());
    let content = update_cargo_lock(&lock, updated_versions)?;
    let updates = &mut root.pull_request.updates;
    updates.push(Update::new(CARGO_LOCK, Updater::RawContent { content }));
    *updates = merge_updates(std::mem::take(updates));
    Ok(candidates)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::memory::InMemoryHost;

  fn crate_toml(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
    let mut toml = format!("[package]\nname = \"{}\"\nversion = \"{}\"\n\n[dependencies]\n", name, version);
    for (dep, dep_version) in deps {
      toml.push_str(&format!("{} = {{ path = \"../{}\", version = \"{}\" }}\n", dep, dep, dep_version));
    }
    toml
  }

  #[tokio::test]
  async fn test_loads_members_and_globs() {
    let host = InMemoryHost::new("acme", "rail", "main");
    host.set_file(
      "main",
      "Cargo.toml",
      "[workspace]\nmembers = [\"crates/*\", \"tools/cli\"]\nexclude = [\"crates/skip\"]\n",
    );
    host.set_file("main", "crates/a/Cargo.toml", &crate_toml("a", "1.0.0", &[]));
    host.set_file("main", "crates/b/Cargo.toml", &crate_toml("b", "0.3.0", &[("a", "1.0.0")]));
    host.set_file("main", "crates/skip/Cargo.toml", &crate_toml("skip", "0.1.0", &[]));
    host.set_file("main", "crates/b/nested/Cargo.toml", &crate_toml("nested", "0.1.0", &[]));
    host.set_file("main", "tools/cli/Cargo.toml", &crate_toml("cli", "2.0.0", &[("b", "0.3.0")]));

    let packages = load_workspace(&host, "main").await.unwrap();
    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "cli"]);
    assert_eq!(packages[1].deps, vec!["a"]);
    assert_eq!(packages[2].path, "tools/cli");
    assert_eq!(packages[2].version, Version::new(2, 0, 0));
  }

  #[tokio::test]
  async fn test_inherited_workspace_version() {
    let host = InMemoryHost::new("acme", "rail", "main");
    host.set_file(
      "main",
      "Cargo.toml",
      "[workspace]\nmembers = [\"a\"]\n\n[workspace.package]\nversion = \"0.9.1\"\n",
    );
    host.set_file("main", "a/Cargo.toml", "[package]\nname = \"a\"\nversion.workspace = true\n");
    let packages = load_workspace(&host, "main").await.unwrap();
    assert_eq!(packages[0].version, Version::new(0, 9, 1));
  }

  #[test]
  fn test_declared_dependencies_reads_both_forms() {
    let content = "[package]\nname = \"b\"\nversion = \"1.0.0\"\n\n[dependencies]\nserde = \"1\"\na = { path = \"../a\", version = \"1.0.0\" }\n\n[dev-dependencies]\nc = { path = \"../c\" }\n";
    let declared = Cargo.declared_dependencies(content).unwrap();
    assert_eq!(declared[0].0, "dependencies");
    assert_eq!(declared[0].1.get("a").map(String::as_str), Some("1.0.0"));
    assert_eq!(declared[0].1.get("serde").map(String::as_str), Some("1"));
    assert!(declared.iter().all(|(_, deps)| !deps.contains_key("c")));
  }

  #[test]
  fn test_lock_only_touches_local_packages() {
    let lock = "version = 3\n\n[[package]]\nname = \"a\"\nversion = \"1.0.0\"\n\n[[package]]\nname = \"serde\"\nversion = \"1.0.0\"\nsource = \"registry+https://github.com/rust-lang/crates.io-index\"\n";
    let mut versions = VersionsMap::new();
    versions.insert("a".to_string(), Version::new(1, 0, 1));
    versions.insert("serde".to_string(), Version::new(9, 9, 9));
    let updated = update_cargo_lock(lock, &versions).unwrap();
    assert!(updated.contains("name = \"a\"\nversion = \"1.0.1\""));
    assert!(updated.contains("name = \"serde\"\nversion = \"1.0.0\""));
  }
}
