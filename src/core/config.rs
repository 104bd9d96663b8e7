//! Release configuration
//!
//! Two documents live on the target branch:
//! - `release-please-config.json`: release settings. Top-level fields are defaults every
//!   package inherits; `packages` maps a path to its overrides.
//! - `.release-please-manifest.json`: path -> last released version.
//!
//! Both are parsed here into typed values. Plugin entries (a bare name or an object with
//! a `type`) are resolved into [`PluginConfig`] so nothing past this module sees raw JSON.

use crate::core::error::{ConfigError, ReleaseError, ReleaseResult};
use crate::release::changelog::ChangelogSection;
use crate::release::labels;
use crate::release::version::{VersioningKind, VersioningStrategy, VersionsMap, parse_version};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Path of the component that covers the whole repository
pub const ROOT_PROJECT_PATH: &str = ".";
/// Default location of the release config on the target branch
pub const DEFAULT_CONFIG_FILE: &str = "release-please-config.json";
/// Default location of the versions manifest on the target branch
pub const DEFAULT_MANIFEST_FILE: &str = ".release-please-manifest.json";
/// Title pattern for merged (multi-component) release pull requests
pub const MANIFEST_PULL_REQUEST_TITLE_PATTERN: &str = "chore: release ${branch}";
pub const DEFAULT_RELEASE_SEARCH_DEPTH: usize = 400;
pub const DEFAULT_COMMIT_SEARCH_DEPTH: usize = 500;
pub const DEFAULT_CHANGELOG_PATH: &str = "CHANGELOG.md";

/// Release kinds known to the strategy factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
  #[default]
  Simple,
  Rust,
  Node,
  Maven,
  Java,
}

impl FromStr for ReleaseKind {
  type Err = ReleaseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "simple" => Ok(ReleaseKind::Simple),
      "rust" => Ok(ReleaseKind::Rust),
      "node" => Ok(ReleaseKind::Node),
      "maven" => Ok(ReleaseKind::Maven),
      "java" => Ok(ReleaseKind::Java),
      other => Err(ReleaseError::Config(ConfigError::UnknownReleaseType {
        name: other.to_string(),
      })),
    }
  }
}

impl fmt::Display for ReleaseKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ReleaseKind::Simple => "simple",
      ReleaseKind::Rust => "rust",
      ReleaseKind::Node => "node",
      ReleaseKind::Maven => "maven",
      ReleaseKind::Java => "java",
    };
    write!(f, "{}", name)
  }
}

/// Per-package settings as written in the config file. Every field is optional so
/// package entries can override top-level defaults field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ComponentConfig {
  pub release_type: Option<String>,
  pub versioning: Option<VersioningKind>,
  pub bump_minor_pre_major: Option<bool>,
  pub bump_patch_for_minor_pre_major: Option<bool>,
  pub release_as: Option<String>,
  pub skip_github_release: Option<bool>,
  pub draft: Option<bool>,
  pub prerelease: Option<bool>,
  pub draft_pull_request: Option<bool>,
  pub component: Option<String>,
  pub package_name: Option<String>,
  pub include_component_in_tag: Option<bool>,
  pub include_v_in_tag: Option<bool>,
  pub tag_separator: Option<String>,
  pub pull_request_title_pattern: Option<String>,
  pub pull_request_header: Option<String>,
  pub pull_request_footer: Option<String>,
  pub changelog_path: Option<String>,
  pub changelog_sections: Option<Vec<ChangelogSection>>,
  pub skip_changelog: Option<bool>,
  pub extra_files: Option<Vec<String>>,
  /// Comma separated labels added to this component's pull request
  pub extra_label: Option<String>,
  pub separate_pull_requests: Option<bool>,
  pub group: Option<String>,
}

impl ComponentConfig {
  /// Fields set on `self` win over `defaults`
  fn or(self, defaults: &ComponentConfig) -> ComponentConfig {
    ComponentConfig {
      release_type: self.release_type.or_else(|| defaults.release_type.clone()),
      versioning: self.versioning.or(defaults.versioning),
      bump_minor_pre_major: self.bump_minor_pre_major.or(defaults.bump_minor_pre_major),
      bump_patch_for_minor_pre_major: self
        .bump_patch_for_minor_pre_major
        .or(defaults.bump_patch_for_minor_pre_major),
      release_as: self.release_as.or_else(|| defaults.release_as.clone()),
      skip_github_release: self.skip_github_release.or(defaults.skip_github_release),
      draft: self.draft.or(defaults.draft),
      prerelease: self.prerelease.or(defaults.prerelease),
      draft_pull_request: self.draft_pull_request.or(defaults.draft_pull_request),
      // identity fields are never inherited
      component: self.component,
      package_name: self.package_name,
      include_component_in_tag: self.include_component_in_tag.or(defaults.include_component_in_tag),
      include_v_in_tag: self.include_v_in_tag.or(defaults.include_v_in_tag),
      tag_separator: self.tag_separator.or_else(|| defaults.tag_separator.clone()),
      pull_request_title_pattern: self
        .pull_request_title_pattern
        .or_else(|| defaults.pull_request_title_pattern.clone()),
      pull_request_header: self.pull_request_header.or_else(|| defaults.pull_request_header.clone()),
      pull_request_footer: self.pull_request_footer.or_else(|| defaults.pull_request_footer.clone()),
      changelog_path: self.changelog_path.or_else(|| defaults.changelog_path.clone()),
      changelog_sections: self.changelog_sections.or_else(|| defaults.changelog_sections.clone()),
      skip_changelog: self.skip_changelog.or(defaults.skip_changelog),
      extra_files: self.extra_files.or_else(|| defaults.extra_files.clone()),
      extra_label: self.extra_label.or_else(|| defaults.extra_label.clone()),
      separate_pull_requests: self.separate_pull_requests.or(defaults.separate_pull_requests),
      group: self.group.or_else(|| defaults.group.clone()),
    }
  }

  /// Resolve into a complete releaser config
  fn resolve(self, path: &str) -> ReleaseResult<ReleaserConfig> {
    let release_type = match self.release_type.as_deref() {
      Some(name) => name.parse::<ReleaseKind>()?,
      None => ReleaseKind::Simple,
    };
    let release_as = match self.release_as.as_deref().map(str::trim) {
      Some("") | None => None,
      Some(text) => Some(
        parse_version(text).map_err(|e| ReleaseError::config(path, format!("invalid release-as: {}", e)))?,
      ),
    };
    Ok(ReleaserConfig {
      release_type,
      versioning: VersioningStrategy {
        kind: self.versioning.unwrap_or_default(),
        bump_minor_pre_major: self.bump_minor_pre_major.unwrap_or(false),
        bump_patch_for_minor_pre_major: self.bump_patch_for_minor_pre_major.unwrap_or(false),
      },
      release_as,
      skip_github_release: self.skip_github_release.unwrap_or(false),
      draft: self.draft.unwrap_or(false),
      prerelease: self.prerelease.unwrap_or(false),
      draft_pull_request: self.draft_pull_request.unwrap_or(false),
      component: self.component,
      package_name: self.package_name,
      include_component_in_tag: self.include_component_in_tag.unwrap_or(true),
      include_v_in_tag: self.include_v_in_tag.unwrap_or(true),
      tag_separator: self.tag_separator,
      pull_request_title_pattern: self.pull_request_title_pattern,
      pull_request_header: self.pull_request_header,
      pull_request_footer: self.pull_request_footer,
      changelog_path: self.changelog_path.unwrap_or_else(|| DEFAULT_CHANGELOG_PATH.to_string()),
      changelog_sections: self.changelog_sections,
      skip_changelog: self.skip_changelog.unwrap_or(false),
      extra_files: self.extra_files.unwrap_or_default(),
      extra_labels: split_labels(self.extra_label.as_deref()).unwrap_or_default(),
      separate_pull_requests: self.separate_pull_requests,
      group: self.group,
    })
  }
}

/// Fully resolved settings for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaserConfig {
  pub release_type: ReleaseKind,
  pub versioning: VersioningStrategy,
  pub release_as: Option<Version>,
  pub skip_github_release: bool,
  pub draft: bool,
  pub prerelease: bool,
  pub draft_pull_request: bool,
  pub component: Option<String>,
  pub package_name: Option<String>,
  pub include_component_in_tag: bool,
  pub include_v_in_tag: bool,
  pub tag_separator: Option<String>,
  pub pull_request_title_pattern: Option<String>,
  pub pull_request_header: Option<String>,
  pub pull_request_footer: Option<String>,
  pub changelog_path: String,
  pub changelog_sections: Option<Vec<ChangelogSection>>,
  pub skip_changelog: bool,
  pub extra_files: Vec<String>,
  pub extra_labels: Vec<String>,
  pub separate_pull_requests: Option<bool>,
  pub group: Option<String>,
}

impl Default for ReleaserConfig {
  fn default() -> Self {
    Self {
      release_type: ReleaseKind::Simple,
      versioning: VersioningStrategy::default(),
      release_as: None,
      skip_github_release: false,
      draft: false,
      prerelease: false,
      draft_pull_request: false,
      component: None,
      package_name: None,
      include_component_in_tag: true,
      include_v_in_tag: true,
      tag_separator: None,
      pull_request_title_pattern: None,
      pull_request_header: None,
      pull_request_footer: None,
      changelog_path: DEFAULT_CHANGELOG_PATH.to_string(),
      changelog_sections: None,
      skip_changelog: false,
      extra_files: Vec::new(),
      extra_labels: Vec::new(),
      separate_pull_requests: None,
      group: None,
    }
  }
}

impl ReleaserConfig {
  pub fn of_kind(release_type: ReleaseKind) -> Self {
    Self {
      release_type,
      ..Default::default()
    }
  }
}

/// Resolved config for every configured path
pub type RepositoryConfig = BTreeMap<String, ReleaserConfig>;

/// Built-in plugins, resolved from config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginConfig {
  NodeWorkspace { update_all_packages: bool, merge: Option<bool> },
  CargoWorkspace { merge: Option<bool> },
  MavenWorkspace { consider_all_artifacts: bool, merge: Option<bool> },
  LinkedVersions {
    group_name: String,
    components: Vec<String>,
    merge: bool,
  },
  GroupPriority { groups: Vec<String> },
  SentenceCase { special_words: Option<Vec<String>> },
  Merge {
    pull_request_title_pattern: Option<String>,
    pull_request_header: Option<String>,
    head_branch_name: Option<String>,
    force_merge: bool,
  },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPluginOptions {
  update_all_packages: Option<bool>,
  merge: Option<bool>,
  consider_all_artifacts: Option<bool>,
  group_name: Option<String>,
  components: Option<Vec<String>>,
  groups: Option<Vec<String>>,
  special_words: Option<Vec<String>>,
  pull_request_title_pattern: Option<String>,
  pull_request_header: Option<String>,
  head_branch_name: Option<String>,
  force_merge: Option<bool>,
}

impl PluginConfig {
  /// Resolve a plugin entry: a bare name or an object with a `type` field
  pub fn from_value(value: &serde_json::Value) -> ReleaseResult<Self> {
    let (kind, options) = match value {
      serde_json::Value::String(name) => (name.clone(), RawPluginOptions::default()),
      serde_json::Value::Object(map) => {
        let kind = map
          .get("type")
          .and_then(|t| t.as_str())
          .ok_or_else(|| ReleaseError::config("plugins", "plugin object is missing a string `type`"))?
          .to_string();
        let options: RawPluginOptions = serde_json::from_value(value.clone())
          .map_err(|e| ReleaseError::config("plugins", format!("invalid options for {}: {}", kind, e)))?;
        (kind, options)
      }
      other => {
        return Err(ReleaseError::config(
          "plugins",
          format!("plugin entry must be a string or an object, got {}", other),
        ));
      }
    };

    let plugin = match kind.as_str() {
      "node-workspace" => PluginConfig::NodeWorkspace {
        update_all_packages: options.update_all_packages.unwrap_or(false),
        merge: options.merge,
      },
      "cargo-workspace" => PluginConfig::CargoWorkspace { merge: options.merge },
      "maven-workspace" => PluginConfig::MavenWorkspace {
        consider_all_artifacts: options.consider_all_artifacts.unwrap_or(true),
        merge: options.merge,
      },
      "linked-versions" => PluginConfig::LinkedVersions {
        group_name: options
          .group_name
          .ok_or_else(|| ReleaseError::config("plugins", "linked-versions requires `groupName`"))?,
        components: options.components.unwrap_or_default(),
        merge: options.merge.unwrap_or(true),
      },
      "group-priority" => PluginConfig::GroupPriority {
        groups: options.groups.unwrap_or_default(),
      },
      "sentence-case" => PluginConfig::SentenceCase {
        special_words: options.special_words,
      },
      "merge" => PluginConfig::Merge {
        pull_request_title_pattern: options.pull_request_title_pattern,
        pull_request_header: options.pull_request_header,
        head_branch_name: options.head_branch_name,
        force_merge: options.force_merge.unwrap_or(false),
      },
      unknown => {
        return Err(ReleaseError::config("plugins", format!("Unknown plugin type: {}", unknown)));
      }
    };
    Ok(plugin)
  }
}

/// Settings that apply to the whole orchestration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestOptions {
  pub bootstrap_sha: Option<String>,
  pub last_release_sha: Option<String>,
  pub separate_pull_requests: bool,
  pub plugins: Vec<PluginConfig>,
  pub labels: Vec<String>,
  pub release_labels: Vec<String>,
  pub snapshot_labels: Vec<String>,
  pub prerelease_labels: Vec<String>,
  pub skip_labeling: bool,
  pub sequential_calls: bool,
  pub release_search_depth: usize,
  pub commit_search_depth: usize,
  pub group_pull_request_title_pattern: Option<String>,
  pub draft: bool,
  pub prerelease: bool,
  pub draft_pull_request: bool,
}

impl Default for ManifestOptions {
  fn default() -> Self {
    Self {
      bootstrap_sha: None,
      last_release_sha: None,
      separate_pull_requests: false,
      plugins: Vec::new(),
      labels: labels::to_owned_labels(labels::DEFAULT_LABELS),
      release_labels: labels::to_owned_labels(labels::DEFAULT_RELEASE_LABELS),
      snapshot_labels: labels::to_owned_labels(labels::DEFAULT_SNAPSHOT_LABELS),
      prerelease_labels: labels::to_owned_labels(labels::DEFAULT_PRERELEASE_LABELS),
      skip_labeling: false,
      sequential_calls: false,
      release_search_depth: DEFAULT_RELEASE_SEARCH_DEPTH,
      commit_search_depth: DEFAULT_COMMIT_SEARCH_DEPTH,
      group_pull_request_title_pattern: None,
      draft: false,
      prerelease: false,
      draft_pull_request: false,
    }
  }
}

/// The config document as written
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ManifestConfig {
  #[serde(flatten)]
  pub defaults: ComponentConfig,
  pub packages: BTreeMap<String, ComponentConfig>,
  pub plugins: Vec<serde_json::Value>,
  pub bootstrap_sha: Option<String>,
  pub last_release_sha: Option<String>,
  pub label: Option<String>,
  pub release_label: Option<String>,
  pub snapshot_label: Option<String>,
  pub prerelease_label: Option<String>,
  pub skip_labeling: Option<bool>,
  pub sequential_calls: Option<bool>,
  pub release_search_depth: Option<usize>,
  pub commit_search_depth: Option<usize>,
  pub group_pull_request_title_pattern: Option<String>,
}

impl ManifestConfig {
  /// Parse the config document. `source` names the file in errors.
  pub fn parse(content: &str, source: &str) -> ReleaseResult<Self> {
    serde_json::from_str(content).map_err(|e| ReleaseError::config(source, format!("invalid JSON: {}", e)))
  }

  /// Resolve packages and run-wide options
  pub fn resolve(self) -> ReleaseResult<(RepositoryConfig, ManifestOptions)> {
    if self.packages.is_empty() {
      return Err(ReleaseError::config("packages", "at least one package must be configured"));
    }

    let mut repository_config = RepositoryConfig::new();
    for (path, package) in self.packages {
      let resolved = package.or(&self.defaults).resolve(&path)?;
      repository_config.insert(path, resolved);
    }

    let plugins = self
      .plugins
      .iter()
      .map(PluginConfig::from_value)
      .collect::<ReleaseResult<Vec<_>>>()?;

    let defaults = ManifestOptions::default();
    let options = ManifestOptions {
      bootstrap_sha: self.bootstrap_sha,
      last_release_sha: self.last_release_sha,
      separate_pull_requests: self.defaults.separate_pull_requests.unwrap_or(false),
      plugins,
      labels: split_labels(self.label.as_deref()).unwrap_or(defaults.labels),
      release_labels: split_labels(self.release_label.as_deref()).unwrap_or(defaults.release_labels),
      snapshot_labels: split_labels(self.snapshot_label.as_deref()).unwrap_or(defaults.snapshot_labels),
      prerelease_labels: split_labels(self.prerelease_label.as_deref()).unwrap_or(defaults.prerelease_labels),
      skip_labeling: self.skip_labeling.unwrap_or(false),
      sequential_calls: self.sequential_calls.unwrap_or(false),
      release_search_depth: self.release_search_depth.unwrap_or(DEFAULT_RELEASE_SEARCH_DEPTH),
      commit_search_depth: self.commit_search_depth.unwrap_or(DEFAULT_COMMIT_SEARCH_DEPTH),
      group_pull_request_title_pattern: self.group_pull_request_title_pattern,
      draft: self.defaults.draft.unwrap_or(false),
      prerelease: self.defaults.prerelease.unwrap_or(false),
      draft_pull_request: self.defaults.draft_pull_request.unwrap_or(false),
    };
    Ok((repository_config, options))
  }
}

/// Parse the versions manifest (path -> version string)
pub fn parse_versions_manifest(content: &str, source: &str) -> ReleaseResult<VersionsMap> {
  let raw: BTreeMap<String, String> =
    serde_json::from_str(content).map_err(|e| ReleaseError::config(source, format!("invalid JSON: {}", e)))?;
  raw
    .into_iter()
    .map(|(path, version)| {
      let parsed = parse_version(&version)
        .map_err(|e| ReleaseError::config(source, format!("invalid version for {}: {}", path, e)))?;
      Ok((path, parsed))
    })
    .collect()
}

/// Comma separated label list; `None` when unset
fn split_labels(text: Option<&str>) -> Option<Vec<String>> {
  text.map(|t| {
    t.split(',')
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .map(str::to_string)
      .collect()
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  const CONFIG: &str = r#"{
    "release-type": "node",
    "bump-minor-pre-major": true,
    "label": "autorelease: pending,release",
    "plugins": [
      "cargo-workspace",
      {"type": "linked-versions", "groupName": "core libs", "components": ["a", "b"]},
      {"type": "sentence-case", "specialWords": ["gRPC"]}
    ],
    "packages": {
      "packages/a": {"component": "a"},
      "crates/b": {"release-type": "rust", "include-v-in-tag": false, "extra-label": "x, y"}
    }
  }"#;

  #[test]
  fn test_defaults_are_inherited() {
    let (repo, options) = ManifestConfig::parse(CONFIG, "config").unwrap().resolve().unwrap();
    let a = &repo["packages/a"];
    assert_eq!(a.release_type, ReleaseKind::Node);
    assert!(a.versioning.bump_minor_pre_major);
    assert_eq!(a.component.as_deref(), Some("a"));
    assert!(a.include_v_in_tag);

    let b = &repo["crates/b"];
    assert_eq!(b.release_type, ReleaseKind::Rust);
    assert!(!b.include_v_in_tag);
    assert_eq!(b.extra_labels, vec!["x", "y"]);
    assert!(b.component.is_none());

    assert_eq!(options.labels, vec!["autorelease: pending", "release"]);
    assert_eq!(options.release_labels, vec!["autorelease: tagged"]);
    assert_eq!(options.commit_search_depth, DEFAULT_COMMIT_SEARCH_DEPTH);
  }

  #[test]
  fn test_plugins_resolved() {
    let (_, options) = ManifestConfig::parse(CONFIG, "config").unwrap().resolve().unwrap();
    assert_eq!(options.plugins.len(), 3);
    assert_eq!(options.plugins[0], PluginConfig::CargoWorkspace { merge: None });
    assert_eq!(
      options.plugins[1],
      PluginConfig::LinkedVersions {
        group_name: "core libs".to_string(),
        components: vec!["a".to_string(), "b".to_string()],
        merge: true,
      }
    );
  }

  #[test]
  fn test_unknown_plugin_is_config_error() {
    let err = PluginConfig::from_value(&serde_json::json!("go-workspace")).unwrap_err();
    assert!(matches!(err, ReleaseError::Config(_)));
    assert!(err.to_string().contains("Unknown plugin type: go-workspace"));
  }

  #[test]
  fn test_unknown_release_type() {
    let config = r#"{"packages": {".": {"release-type": "cobol"}}}"#;
    let err = ManifestConfig::parse(config, "config").unwrap().resolve().unwrap_err();
    assert!(matches!(err, ReleaseError::Config(ConfigError::UnknownReleaseType { .. })));
  }

  #[test]
  fn test_bad_json_is_config_error() {
    let err = ManifestConfig::parse("{", "release-please-config.json").unwrap_err();
    assert!(err.to_string().starts_with("release-please-config.json: invalid JSON"));
  }

  #[test]
  fn test_versions_manifest() {
    let versions = parse_versions_manifest(r#"{".": "1.2.3", "packages/a": "0.1.0-beta.1"}"#, "manifest").unwrap();
    assert_eq!(versions["."], Version::new(1, 2, 3));
    assert_eq!(versions["packages/a"].pre.as_str(), "beta.1");
  }
}
