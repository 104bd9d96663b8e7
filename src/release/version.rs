//! Version parsing and bump policies
//!
//! Versions are plain `semver::Version`s. Parsing is lenient about a leading `v` and
//! about surrounding text, since versions are recovered from tags, titles and bodies.

use crate::core::error::{ReleaseError, ReleaseResult};
use crate::release::commit::ConventionalCommit;
use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Package name (or path) to version
pub type VersionsMap = BTreeMap<String, Version>;

static VERSION_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)(?:-([^+\s]+))?(?:\+(\S*))?").expect("static regex"));

/// Parse a version out of `text`, tolerating a `v` prefix
pub fn parse_version(text: &str) -> ReleaseResult<Version> {
  let caps = VERSION_PATTERN
    .captures(text.trim())
    .ok_or_else(|| ReleaseError::message(format!("Invalid version: '{}'", text)))?;

  let number = |i: usize| -> ReleaseResult<u64> {
    caps[i]
      .parse::<u64>()
      .map_err(|e| ReleaseError::message(format!("Invalid version '{}': {}", text, e)))
  };

  let mut version = Version::new(number(1)?, number(2)?, number(3)?);
  if let Some(pre) = caps.get(4) {
    version.pre = Prerelease::new(pre.as_str())?;
  }
  if let Some(build) = caps.get(5).filter(|b| !b.as_str().is_empty()) {
    version.build = BuildMetadata::new(build.as_str())?;
  }
  Ok(version)
}

/// `0.0.0` marks a path that has never been released
pub fn is_unreleased_marker(version: &Version) -> bool {
  version.major == 0 && version.minor == 0 && version.patch == 0 && version.pre.is_empty()
}

/// Maven-style snapshot versions are never published
pub fn is_snapshot(version: &Version) -> bool {
  version.pre.as_str().contains("SNAPSHOT")
}

/// Version bump type derived from commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionBump {
  /// Major version bump (breaking changes)
  Major,
  /// Minor version bump (new features)
  Minor,
  /// Patch version bump (bug fixes)
  Patch,
  /// Explicit version from a `Release-As` footer
  Custom(Version),
}

impl VersionBump {
  /// Apply bump to a semver version
  pub fn apply(&self, version: &Version) -> Version {
    match self {
      VersionBump::Major => Version::new(version.major + 1, 0, 0),
      VersionBump::Minor => Version::new(version.major, version.minor + 1, 0),
      VersionBump::Patch => Version::new(version.major, version.minor, version.patch + 1),
      VersionBump::Custom(custom) => custom.clone(),
    }
  }
}

/// How the next version is derived from the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersioningKind {
  #[default]
  Default,
  AlwaysBumpPatch,
  AlwaysBumpMinor,
  AlwaysBumpMajor,
}

/// Versioning policy applied by strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersioningStrategy {
  pub kind: VersioningKind,
  /// Breaking changes bump minor while major is 0
  pub bump_minor_pre_major: bool,
  /// Features bump patch while major is 0
  pub bump_patch_for_minor_pre_major: bool,
}

impl VersioningStrategy {
  /// Pick the bump for `version` given the commits since the last release
  pub fn determine_bump(&self, version: &Version, commits: &[ConventionalCommit]) -> VersionBump {
    if let Some(custom) = release_as(commits) {
      return VersionBump::Custom(custom);
    }

    match self.kind {
      VersioningKind::AlwaysBumpPatch => return VersionBump::Patch,
      VersioningKind::AlwaysBumpMinor => return VersionBump::Minor,
      VersioningKind::AlwaysBumpMajor => return VersionBump::Major,
      VersioningKind::Default => {}
    }

    let breaking = commits.iter().any(|c| c.breaking);
    let features = commits
      .iter()
      .any(|c| !c.breaking && (c.commit_type == "feat" || c.commit_type == "feature"));

    if breaking {
      if version.major < 1 && self.bump_minor_pre_major {
        VersionBump::Minor
      } else {
        VersionBump::Major
      }
    } else if features {
      if version.major < 1 && self.bump_patch_for_minor_pre_major {
        VersionBump::Patch
      } else {
        VersionBump::Minor
      }
    } else {
      VersionBump::Patch
    }
  }

  /// Next version after `version`
  pub fn bump(&self, version: &Version, commits: &[ConventionalCommit]) -> Version {
    self.determine_bump(version, commits).apply(version)
  }
}

/// Last `Release-As` footer among the commits, newest commit first
fn release_as(commits: &[ConventionalCommit]) -> Option<Version> {
  commits
    .iter()
    .flat_map(|c| c.notes.iter())
    .filter(|n| n.title == crate::release::commit::RELEASE_AS_NOTE)
    .find_map(|n| parse_version(&n.text).ok())
}

/// Snapshot-aware patch bump: `1.2.3-SNAPSHOT` releases as `1.2.3`, anything else bumps patch
pub fn snapshot_aware_patch(version: &Version) -> Version {
  if is_snapshot(version) {
    Version::new(version.major, version.minor, version.patch)
  } else {
    VersionBump::Patch.apply(version)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::commit::{Commit, parse_conventional_commits};

  fn commits(messages: &[&str]) -> Vec<ConventionalCommit> {
    let raw: Vec<Commit> = messages
      .iter()
      .enumerate()
      .map(|(i, m)| Commit::new(format!("sha{}", i), *m))
      .collect();
    parse_conventional_commits(&raw)
  }

  #[test]
  fn test_parse_lenient() {
    assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
    assert_eq!(parse_version("1.2.3-beta.1").unwrap().pre.as_str(), "beta.1");
    assert_eq!(parse_version("2.0.0+build.7").unwrap().build.as_str(), "build.7");
    assert!(parse_version("not a version").is_err());
  }

  #[test]
  fn test_default_bumps() {
    let strategy = VersioningStrategy::default();
    let v = Version::new(1, 0, 0);
    assert_eq!(strategy.bump(&v, &commits(&["fix: a"])), Version::new(1, 0, 1));
    assert_eq!(strategy.bump(&v, &commits(&["feat: a", "fix: b"])), Version::new(1, 1, 0));
    assert_eq!(strategy.bump(&v, &commits(&["feat!: a"])), Version::new(2, 0, 0));
  }

  #[test]
  fn test_pre_major_options() {
    let strategy = VersioningStrategy {
      kind: VersioningKind::Default,
      bump_minor_pre_major: true,
      bump_patch_for_minor_pre_major: true,
    };
    let v = Version::new(0, 2, 3);
    assert_eq!(strategy.bump(&v, &commits(&["feat!: a"])), Version::new(0, 3, 0));
    assert_eq!(strategy.bump(&v, &commits(&["feat: a"])), Version::new(0, 2, 4));
  }

  #[test]
  fn test_release_as_wins() {
    let strategy = VersioningStrategy {
      kind: VersioningKind::AlwaysBumpMajor,
      ..Default::default()
    };
    let bumped = strategy.bump(
      &Version::new(1, 0, 0),
      &commits(&["chore: sync\n\nRelease-As: 3.1.4"]),
    );
    assert_eq!(bumped, Version::new(3, 1, 4));
  }

  #[test]
  fn test_snapshot_handling() {
    let snap = parse_version("1.2.3-SNAPSHOT").unwrap();
    assert!(is_snapshot(&snap));
    assert_eq!(snapshot_aware_patch(&snap), Version::new(1, 2, 3));
    assert_eq!(snapshot_aware_patch(&Version::new(1, 2, 3)), Version::new(1, 2, 4));
    assert!(is_unreleased_marker(&Version::new(0, 0, 0)));
  }
}
