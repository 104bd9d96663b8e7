//! Release builder shared by every release kind
//!
//! | Kind | Version file |
//! |---|---|
//! | simple | `version.txt` |
//! | rust | `Cargo.toml` |
//! | node | `package.json` |
//! | maven, java | `pom.xml` |
//!
//! The changelog and any configured extra files are updated for every kind.

use super::Strategy;
use crate::core::config::{MANIFEST_PULL_REQUEST_TITLE_PATTERN, ROOT_PROJECT_PATH, ReleaseKind, ReleaserConfig};
use crate::core::error::{ReleaseResult, ResultExt};
use crate::host::{VcsHost, get_optional_file};
use crate::release::body::{BodyOptions, PullRequestBody, ReleaseData};
use crate::release::branch::BranchName;
use crate::release::candidate::{Release, ReleasePullRequest};
use crate::release::changelog::{NotesOptions, build_notes, default_sections, is_empty_notes};
use crate::release::commit::{ConventionalCommit, RELEASE_AS_NOTE};
use crate::release::labels::union_labels;
use crate::release::pull_request::PullRequest;
use crate::release::tag::TagName;
use crate::release::title::PullRequestTitle;
use crate::release::updater::{Update, Updater, merge_updates};
use crate::release::version::{VersionBump, VersionsMap, is_snapshot};
use async_trait::async_trait;
use semver::Version;
use std::sync::Arc;
use tokio::sync::OnceCell;
use toml_edit::{DocumentMut, Item};
use tracing::{debug, error, info, warn};

/// `file` relative to the repository root for a package at `path`
pub fn add_path(path: &str, file: &str) -> String {
  if path.is_empty() || path == ROOT_PROJECT_PATH {
    file.to_string()
  } else {
    format!("{}/{}", path.trim_end_matches('/'), file)
  }
}

fn initial_version() -> Version {
  Version::new(1, 0, 0)
}

/// Strategy for one configured path
pub struct BaseStrategy {
  host: Arc<dyn VcsHost>,
  target_branch: String,
  path: String,
  config: ReleaserConfig,
  /// Component before tag settings apply; read from package files at most once
  package_component: OnceCell<Option<String>>,
}

impl BaseStrategy {
  pub fn new(host: Arc<dyn VcsHost>, target_branch: &str, path: &str, config: ReleaserConfig) -> Self {
    Self {
      host,
      target_branch: target_branch.to_string(),
      path: path.to_string(),
      config,
      package_component: OnceCell::new(),
    }
  }

  fn add_path(&self, file: &str) -> String {
    add_path(&self.path, file)
  }

  async fn package_component(&self) -> ReleaseResult<Option<String>> {
    self
      .package_component
      .get_or_try_init(|| self.read_package_component())
      .await
      .cloned()
  }

  async fn read_package_component(&self) -> ReleaseResult<Option<String>> {
    if let Some(component) = self.config.component.as_ref().filter(|c| !c.is_empty()) {
      return Ok(Some(component.clone()));
    }
    let name = match &self.config.package_name {
      Some(name) => Some(name.clone()),
      None => self.read_default_package_name().await?,
    };
    let name = match self.config.release_type {
      ReleaseKind::Node => name.map(|n| strip_npm_scope(&n).to_string()),
      _ => name,
    };
    Ok(name.filter(|n| !n.is_empty()))
  }

  async fn read_default_package_name(&self) -> ReleaseResult<Option<String>> {
    match self.config.release_type {
      ReleaseKind::Rust => {
        let path = self.add_path("Cargo.toml");
        let Some(content) = get_optional_file(self.host.as_ref(), &path, &self.target_branch).await? else {
          warn!("{} not found, no default component for {}", path, self.path);
          return Ok(None);
        };
        let doc: DocumentMut = content.parse().with_context(|| format!("Failed to parse {}", path))?;
        Ok(
          doc
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(Item::as_str)
            .map(str::to_string),
        )
      }
      ReleaseKind::Node => {
        let path = self.add_path("package.json");
        let Some(content) = get_optional_file(self.host.as_ref(), &path, &self.target_branch).await? else {
          warn!("{} not found, no default component for {}", path, self.path);
          return Ok(None);
        };
        let parsed: serde_json::Value =
          serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path))?;
        Ok(parsed.get("name").and_then(|n| n.as_str()).map(str::to_string))
      }
      _ => Ok(None),
    }
  }

  fn next_version(&self, commits: &[ConventionalCommit], latest_release: Option<&Release>) -> Version {
    if let Some(forced) = &self.config.release_as {
      info!("setting version for {} from release-as configuration", self.path);
      return forced.clone();
    }
    match latest_release {
      Some(latest) => self.config.versioning.bump(&latest.tag.version, commits),
      None => match self.config.versioning.determine_bump(&initial_version(), commits) {
        VersionBump::Custom(version) => version,
        _ => initial_version(),
      },
    }
  }

  fn build_updates(&self, version: &Version, notes: &str) -> Vec<Update> {
    let mut updates = Vec::new();
    if !self.config.skip_changelog {
      updates.push(Update::creating(
        self.add_path(&self.config.changelog_path),
        Updater::Changelog {
          version: version.clone(),
          entry: notes.to_string(),
        },
      ));
    }

    let version = version.clone();
    let versions_map = VersionsMap::new();
    updates.push(match self.config.release_type {
      ReleaseKind::Simple => Update::new(
        self.add_path("version.txt"),
        Updater::VersionFile {
          version: version.clone(),
        },
      ),
      ReleaseKind::Rust => Update::new(
        self.add_path("Cargo.toml"),
        Updater::CargoToml {
          version: version.clone(),
          versions_map,
        },
      ),
      ReleaseKind::Node => Update::new(
        self.add_path("package.json"),
        Updater::PackageJson {
          version: version.clone(),
          versions_map,
        },
      ),
      ReleaseKind::Maven | ReleaseKind::Java => Update::new(
        self.add_path("pom.xml"),
        Updater::PomXml {
          version: version.clone(),
          versions_map,
        },
      ),
    });

    for extra in &self.config.extra_files {
      updates.push(Update::new(
        self.add_path(extra.trim_start_matches('/')),
        Updater::Generic { version: version.clone() },
      ));
    }
    merge_updates(updates)
  }
}

/// `@scope/name` -> `name`
fn strip_npm_scope(name: &str) -> &str {
  match name.strip_prefix('@') {
    Some(scoped) => scoped.split_once('/').map(|(_, n)| n).unwrap_or(scoped),
    None => name,
  }
}

fn carries_release_as(commits: &[ConventionalCommit]) -> bool {
  commits
    .iter()
    .any(|c| c.notes.iter().any(|n| n.title == RELEASE_AS_NOTE))
}

fn same_component(a: Option<&str>, b: Option<&str>) -> bool {
  a.unwrap_or_default() == b.unwrap_or_default()
}

#[async_trait]
impl Strategy for BaseStrategy {
  fn path(&self) -> &str {
    &self.path
  }

  fn config(&self) -> &ReleaserConfig {
    &self.config
  }

  async fn component(&self) -> ReleaseResult<Option<String>> {
    if !self.config.include_component_in_tag {
      return Ok(None);
    }
    self.package_component().await
  }

  async fn branch_component(&self) -> ReleaseResult<Option<String>> {
    self.package_component().await
  }

  async fn branch_name(&self) -> ReleaseResult<BranchName> {
    Ok(match self.branch_component().await? {
      Some(component) => BranchName::of_component_target_branch(&component, &self.target_branch),
      None => BranchName::of_target_branch(&self.target_branch),
    })
  }

  async fn build_release_pull_request(
    &self,
    commits: &[ConventionalCommit],
    latest_release: Option<&Release>,
    draft: bool,
    labels: &[String],
  ) -> ReleaseResult<Option<ReleasePullRequest>> {
    let version = self.next_version(commits, latest_release);
    let component = self.component().await?;
    debug!("path: {}, component: {:?}, version: {}", self.path, component, version);

    let tag = TagName::new(
      version.clone(),
      component.as_deref(),
      self.config.tag_separator.as_deref(),
      self.config.include_v_in_tag,
    );
    let title = PullRequestTitle::of_component_target_branch_version(
      component.as_deref().unwrap_or_default(),
      &self.target_branch,
      &version,
      self.config.pull_request_title_pattern.as_deref(),
    );
    let branch = self.branch_name().await?;

    let sections = self.config.changelog_sections.clone().unwrap_or_else(default_sections);
    let notes = build_notes(
      commits,
      &NotesOptions {
        version: &version,
        previous_tag: latest_release.map(|r| r.tag.to_string()),
        current_tag: tag.to_string(),
        repository: self.host.repository(),
        date: None,
        sections: &sections,
      },
    );
    if is_empty_notes(&notes) && !carries_release_as(commits) {
      info!(
        "no user facing commits found since {} for {}, skipping",
        latest_release.map(|r| r.sha.as_str()).filter(|s| !s.is_empty()).unwrap_or("beginning of time"),
        self.path
      );
      return Ok(None);
    }

    let body = PullRequestBody::with_options(
      vec![ReleaseData::new(component.as_deref(), Some(version.clone()), notes.as_str())],
      BodyOptions {
        header: self.config.pull_request_header.clone(),
        footer: self.config.pull_request_footer.clone(),
        ..Default::default()
      },
    );

    Ok(Some(ReleasePullRequest {
      title,
      body,
      labels: union_labels([labels, self.config.extra_labels.as_slice()]),
      head_ref_name: branch.to_string(),
      updates: self.build_updates(&version, &notes),
      version: Some(version),
      draft,
      group: self.config.group.clone(),
    }))
  }

  async fn build_releases(
    &self,
    merged: &PullRequest,
    group_title_pattern: Option<&str>,
  ) -> ReleaseResult<Vec<Release>> {
    if self.config.skip_github_release {
      info!("release skipped from config for {}", self.path);
      return Ok(Vec::new());
    }
    let Some(sha) = merged.merge_commit_sha.as_deref() else {
      error!("pull request #{} should have been merged", merged.number);
      return Ok(Vec::new());
    };

    let title = PullRequestTitle::parse(&merged.title, self.config.pull_request_title_pattern.as_deref()).or_else(|| {
      PullRequestTitle::parse(
        &merged.title,
        Some(group_title_pattern.unwrap_or(MANIFEST_PULL_REQUEST_TITLE_PATTERN)),
      )
    });
    let Some(title) = title else {
      error!("bad pull request title: '{}'", merged.title);
      return Ok(Vec::new());
    };
    let Some(branch) = BranchName::parse(&merged.head_branch_name) else {
      error!("bad branch name: {}", merged.head_branch_name);
      return Ok(Vec::new());
    };
    let Some(body) = PullRequestBody::parse(&merged.body) else {
      error!("could not parse pull request #{} body as a release body", merged.number);
      return Ok(Vec::new());
    };

    let component = self.component().await?;
    let release_data = if body.release_data.len() == 1 && body.release_data[0].component.is_none() {
      // standalone release pull request: only the path owning the branch releases it
      let branch_component = self.branch_component().await?;
      if !same_component(branch.component(), branch_component.as_deref()) {
        debug!(
          "pull request branch component {:?} does not match {:?}, skipping {}",
          branch.component(),
          branch_component,
          self.path
        );
        return Ok(Vec::new());
      }
      Some(&body.release_data[0])
    } else {
      body
        .release_data
        .iter()
        .find(|data| same_component(data.component.as_deref(), component.as_deref()))
    };

    let Some(release_data) = release_data else {
      debug!("no release notes for {} in pull request #{}", self.path, merged.number);
      return Ok(Vec::new());
    };
    let Some(version) = release_data.version.clone().or(title.version) else {
      error!("pull request #{} should have included a version", merged.number);
      return Ok(Vec::new());
    };
    if !self.is_published_version(&version) {
      info!("version {} of {} is not published", version, self.path);
      return Ok(Vec::new());
    }

    let tag = TagName::new(
      version.clone(),
      component.as_deref(),
      self.config.tag_separator.as_deref(),
      self.config.include_v_in_tag,
    );
    let name = match &component {
      Some(component) => format!("{}: v{}", component, version),
      None => format!("v{}", version),
    };
    Ok(vec![Release {
      name: Some(name),
      tag,
      sha: sha.to_string(),
      notes: release_data.notes.clone(),
    }])
  }

  fn is_published_version(&self, version: &Version) -> bool {
    match self.config.release_type {
      ReleaseKind::Maven | ReleaseKind::Java => !is_snapshot(version),
      _ => true,
    }
  }
}
