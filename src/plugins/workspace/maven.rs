//! Maven multi-module repositories
//!
//! Every `pom.xml` on the target branch is an artifact named `groupId:artifactId`.
//! Snapshot versions release by dropping `-SNAPSHOT` and are never written to the
//! versions manifest.

use super::{DeclaredDependencies, WorkspaceKind, WorkspacePackage, WorkspacePlugin};
use crate::core::config::{ROOT_PROJECT_PATH, ReleaseKind};
use crate::core::error::{ReleaseResult, ResultExt};
use crate::plugins::PluginContext;
use crate::release::candidate::CandidateReleasePullRequest;
use crate::release::updater::Updater;
use crate::release::version::{VersionsMap, is_snapshot, parse_version, snapshot_aware_patch};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Maven {
  consider_all_artifacts: bool,
}

impl WorkspacePlugin<Maven> {
  pub fn plugin(context: Arc<PluginContext>, consider_all_artifacts: bool, merge: bool) -> Self {
    Self::new(context, Maven { consider_all_artifacts }, false, merge)
  }
}

/// Coordinates and declared dependencies of one pom
#[derive(Debug, Default, PartialEq, Eq)]
struct Pom {
  group_id: Option<String>,
  artifact_id: Option<String>,
  version: Option<String>,
  parent_group_id: Option<String>,
  parent_version: Option<String>,
  /// `groupId:artifactId` → version, for dependencies that pin one
  dependencies: BTreeMap<String, String>,
}

#[derive(Default)]
struct DependencyBlock {
  group_id: Option<String>,
  artifact_id: Option<String>,
  version: Option<String>,
}

fn is_dependency_block(path: &[String]) -> bool {
  let names: Vec<&str> = path.iter().map(String::as_str).collect();
  matches!(
    names.as_slice(),
    ["project", "dependencies", "dependency"] | ["project", "dependencyManagement", "dependencies", "dependency"]
  )
}

fn read_pom(content: &str) -> ReleaseResult<Pom> {
  let mut reader = Reader::from_str(content);
  let mut pom = Pom::default();
  let mut path: Vec<String> = Vec::new();
  let mut block: Option<DependencyBlock> = None;

  loop {
    match reader.read_event().context("Failed to parse pom.xml")? {
      Event::Eof => break,
      Event::Start(e) => {
        path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
        if is_dependency_block(&path) {
          block = Some(DependencyBlock::default());
        }
      }
      Event::End(_) => {
        if is_dependency_block(&path)
          && let Some(DependencyBlock {
            group_id: Some(group_id),
            artifact_id: Some(artifact_id),
            version: Some(version),
          }) = block.take()
        {
          pom.dependencies.insert(format!("{}:{}", group_id, artifact_id), version);
        }
        path.pop();
      }
      Event::Text(e) => {
        let text = e.unescape().context("Failed to parse pom.xml")?.trim().to_string();
        if text.is_empty() {
          continue;
        }
        let names: Vec<&str> = path.iter().map(String::as_str).collect();
        match names.as_slice() {
          ["project", "groupId"] => pom.group_id = Some(text),
          ["project", "artifactId"] => pom.artifact_id = Some(text),
          ["project", "version"] => pom.version = Some(text),
          ["project", "parent", "groupId"] => pom.parent_group_id = Some(text),
          ["project", "parent", "version"] => pom.parent_version = Some(text),
          [.., leaf] if path.len() > 1 && is_dependency_block(&path[..path.len() - 1]) => {
            if let Some(current) = block.as_mut() {
              match *leaf {
                "groupId" => current.group_id = Some(text),
                "artifactId" => current.artifact_id = Some(text),
                "version" => current.version = Some(text),
                _ => {}
              }
            }
          }
          _ => {}
        }
      }
      _ => {}
    }
  }
  Ok(pom)
}

fn parse_artifact(pom_path: &str, content: String) -> ReleaseResult<Option<WorkspacePackage>> {
  let pom = read_pom(&content)?;
  let Some(group_id) = pom.group_id.or(pom.parent_group_id) else {
    warn!("missing project.groupId in {}", pom_path);
    return Ok(None);
  };
  let Some(artifact_id) = pom.artifact_id else {
    warn!("missing project.artifactId in {}", pom_path);
    return Ok(None);
  };
  let Some(raw_version) = pom.version.or(pom.parent_version) else {
    warn!("missing project.version in {}", pom_path);
    return Ok(None);
  };
  let version = match parse_version(&raw_version) {
    Ok(version) => version,
    Err(err) => {
      warn!("skipping {}: {}", pom_path, err);
      return Ok(None);
    }
  };
  let path = pom_path
    .rsplit_once('/')
    .map(|(dir, _)| dir.to_string())
    .unwrap_or_else(|| ROOT_PROJECT_PATH.to_string());

  Ok(Some(WorkspacePackage {
    name: format!("{}:{}", group_id, artifact_id),
    path,
    manifest_path: pom_path.to_string(),
    manifest_content: content,
    version,
    deps: pom.dependencies.into_keys().collect(),
  }))
}

#[async_trait]
impl WorkspaceKind for Maven {
  fn name(&self) -> &'static str {
    "maven-workspace"
  }

  fn release_kind(&self) -> ReleaseKind {
    ReleaseKind::Maven
  }

  fn in_scope(&self, candidate: &CandidateReleasePullRequest) -> bool {
    matches!(candidate.config.release_type, ReleaseKind::Maven | ReleaseKind::Java)
  }

  async fn load_packages(
    &self,
    context: &PluginContext,
    _candidates: &[CandidateReleasePullRequest],
  ) -> ReleaseResult<Vec<WorkspacePackage>> {
    let mut pom_files = context
      .host
      .find_files_by_filename("pom.xml", &context.target_branch, None)
      .await?;
    pom_files.sort();

    let mut packages = Vec::new();
    for pom_file in pom_files {
      let dir = pom_file.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(ROOT_PROJECT_PATH);
      if !context.repository_config.contains_key(dir) {
        if !self.consider_all_artifacts {
          info!("path '{}' not configured, ignoring '{}'", dir, pom_file);
          continue;
        }
        debug!("path '{}' not configured, but considering all artifacts", dir);
      }
      let content = context
        .host
        .get_file(&pom_file, &context.target_branch)
        .await
        .with_context(|| format!("Failed to read {}", pom_file))?;
      if let Some(package) = parse_artifact(&pom_file, content)? {
        packages.push(package);
      }
    }
    Ok(packages)
  }

  /// Exact path first, then the nearest enclosing candidate
  fn find_candidate<'a>(
    &self,
    package: &WorkspacePackage,
    candidates: &'a [CandidateReleasePullRequest],
  ) -> Option<&'a CandidateReleasePullRequest> {
    candidates.iter().find(|c| c.path == package.path).or_else(|| {
      candidates
        .iter()
        .filter(|c| c.path == ROOT_PROJECT_PATH || package.path.starts_with(&format!("{}/", c.path)))
        .max_by_key(|c| c.path.len())
    })
  }

  fn bump_version(&self, version: &Version) -> Version {
    snapshot_aware_patch(version)
  }

  fn is_release_version(&self, version: &Version) -> bool {
    !is_snapshot(version)
  }

  fn updater(&self, version: &Version, updated_versions: &VersionsMap) -> Updater {
    Updater::PomXml {
      version: version.clone(),
      versions_map: updated_versions.clone(),
    }
  }

  fn declared_dependencies(&self, manifest_content: &str) -> ReleaseResult<DeclaredDependencies> {
    Ok(vec![("dependencies", read_pom(manifest_content)?.dependencies)])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MODULE_POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <parent>
    <groupId>com.acme</groupId>
    <artifactId>parent</artifactId>
    <version>1.2.0-SNAPSHOT</version>
  </parent>
  <artifactId>core</artifactId>
  <dependencies>
    <dependency>
      <groupId>com.acme</groupId>
      <artifactId>api</artifactId>
      <version>1.2.0-SNAPSHOT</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>
"#;

  #[test]
  fn test_inherits_coordinates_from_parent() {
    let package = parse_artifact("modules/core/pom.xml", MODULE_POM.to_string())
      .unwrap()
      .unwrap();
    assert_eq!(package.name, "com.acme:core");
    assert_eq!(package.path, "modules/core");
    assert_eq!(package.version.to_string(), "1.2.0-SNAPSHOT");
    assert_eq!(package.deps, vec!["com.acme:api"]);
  }

  #[test]
  fn test_pom_without_artifact_is_skipped() {
    let pom = "<project><groupId>a</groupId><version>1.0.0</version></project>";
    assert_eq!(parse_artifact("pom.xml", pom.to_string()).unwrap(), None);
  }

  #[test]
  fn test_snapshot_bump_and_release_check() {
    let maven = Maven {
      consider_all_artifacts: true,
    };
    let snapshot = parse_version("1.2.0-SNAPSHOT").unwrap();
    assert_eq!(maven.bump_version(&snapshot), Version::new(1, 2, 0));
    assert!(!maven.is_release_version(&snapshot));
    assert_eq!(maven.bump_version(&Version::new(1, 2, 0)), Version::new(1, 2, 1));
  }
}
