//! Find the last release of each configured path
//!
//! A release only counts when its SHA is part of the scanned history of the branch.
//! Tags pointing elsewhere (another branch, a rewritten history) are ignored even when
//! they carry a higher version.

use crate::core::config::{ReleaserConfig, RepositoryConfig};
use crate::core::error::ReleaseResult;
use crate::host::VcsHost;
use crate::release::branch::BranchName;
use crate::release::candidate::Release;
use crate::release::tag::TagName;
use crate::release::title::PullRequestTitle;
use crate::release::version::VersionsMap;
use crate::strategy::StrategiesByPath;
use futures::TryStreamExt;
use semver::Version;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, trace, warn};

/// Commits scanned when bootstrapping a single component
pub const LATEST_RELEASE_SCAN_DEPTH: usize = 250;

/// Whether `tag` belongs to a component released with these tag settings
pub fn tag_matches_config(tag: &TagName, branch_component: Option<&str>, include_component_in_tag: bool) -> bool {
  if include_component_in_tag {
    tag.component.as_deref() == branch_component
  } else {
    tag.component.is_none()
  }
}

/// Highest released version for a single component on `branch`.
///
/// Looks at the most recent merged release pull request for the component, then at host
/// releases, and only when both come up empty at raw tags. `prefix` is the branch
/// component; a trailing `-` is ignored.
pub async fn latest_release_version<F>(
  host: &dyn VcsHost,
  branch: &str,
  config: &ReleaserConfig,
  prefix: Option<&str>,
  is_published: F,
) -> ReleaseResult<Option<Version>>
where
  F: Fn(&Version) -> bool,
{
  let branch_prefix = prefix.map(|p| p.strip_suffix('-').unwrap_or(p));
  info!("looking for latest release on branch {} with prefix {:?}", branch, branch_prefix);

  // only releases at or after the latest release pull request are considered
  let mut shas: HashSet<String> = HashSet::new();
  let mut versions: Vec<Version> = Vec::new();

  let mut commits = host.commits(branch, Some(LATEST_RELEASE_SCAN_DEPTH));
  while let Some(commit) = commits.try_next().await? {
    shas.insert(commit.sha.clone());
    let Some(pull_request) = commit.pull_request.as_ref() else {
      continue;
    };
    let Some(branch_name) = BranchName::parse(&pull_request.head_branch_name) else {
      trace!("skipping {}: unrecognized branch {}", commit.sha, pull_request.head_branch_name);
      continue;
    };
    if branch_name.component() != branch_prefix {
      continue;
    }
    let Some(title) = PullRequestTitle::parse(&pull_request.title, config.pull_request_title_pattern.as_deref()) else {
      trace!("skipping {}: unparseable title {}", commit.sha, pull_request.title);
      continue;
    };
    if let Some(version) = title.version.filter(|v| is_published(v)) {
      debug!("found latest release pull request #{} at {}", pull_request.number, version);
      versions.push(version);
      break;
    }
  }
  drop(commits);

  let mut releases = host.releases(None);
  while let Some(release) = releases.try_next().await? {
    let Some(tag) = TagName::parse(&release.tag_name) else {
      continue;
    };
    if !tag_matches_config(&tag, branch_prefix, config.include_component_in_tag) {
      continue;
    }
    if !shas.contains(&release.sha) {
      debug!("release {} is not on branch {}, skipping", release.tag_name, branch);
      continue;
    }
    versions.push(tag.version);
  }
  drop(releases);
  if let Some(max) = versions.into_iter().max() {
    return Ok(Some(max));
  }

  let mut tag_versions: Vec<Version> = Vec::new();
  let mut tags = host.tags(None);
  while let Some(host_tag) = tags.try_next().await? {
    let Some(tag) = TagName::parse(&host_tag.name) else {
      continue;
    };
    if tag_matches_config(&tag, branch_prefix, config.include_component_in_tag) && shas.contains(&host_tag.sha) {
      tag_versions.push(tag.version);
    }
  }
  debug!("found {} possible tags", tag_versions.len());
  Ok(tag_versions.into_iter().max())
}

/// Path of each tag component (`""` for componentless tags)
pub async fn paths_by_component(strategies: &StrategiesByPath) -> ReleaseResult<HashMap<String, String>> {
  let mut paths: HashMap<String, String> = HashMap::new();
  for (path, strategy) in strategies {
    let component = strategy.component().await?.unwrap_or_default();
    if let Some(previous) = paths.get(&component) {
      warn!("multiple paths for component '{}': {}, {}", component, previous, path);
    }
    paths.insert(component, path.clone());
  }
  Ok(paths)
}

/// Releases matching the versions manifest, keyed by path.
///
/// Host releases are walked newest first until every path is found. A release maps to a
/// path when its tag component belongs to that path and its version is the one recorded
/// in the manifest. Paths still missing are looked up among raw tags by their expected
/// tag name.
pub async fn releases_by_path(
  host: &dyn VcsHost,
  strategies: &StrategiesByPath,
  repository_config: &RepositoryConfig,
  released_versions: &VersionsMap,
  release_search_depth: usize,
) -> ReleaseResult<BTreeMap<String, Release>> {
  let paths = paths_by_component(strategies).await?;
  let expected = strategies.len();
  let mut found: BTreeMap<String, Release> = BTreeMap::new();

  let mut releases = host.releases(Some(release_search_depth));
  while let Some(release) = releases.try_next().await? {
    let Some(tag) = TagName::parse(&release.tag_name) else {
      warn!("unable to parse release tag {}", release.tag_name);
      continue;
    };
    let component = tag.component.clone().unwrap_or_default();
    let Some(path) = paths.get(&component) else {
      debug!("release tag component '{}' is not configured", component);
      continue;
    };
    let Some(expected_version) = released_versions.get(path) else {
      debug!("no version for path '{}' in manifest", path);
      continue;
    };
    if *expected_version == tag.version && !found.contains_key(path) {
      debug!("found release for path {}: {}", path, release.tag_name);
      found.insert(
        path.clone(),
        Release {
          name: release.name.clone(),
          tag,
          sha: release.sha.clone(),
          notes: release.notes.clone().unwrap_or_default(),
        },
      );
    }
    if found.len() >= expected {
      break;
    }
  }
  drop(releases);

  if found.len() < expected {
    let missing: Vec<&String> = strategies.keys().filter(|p| !found.contains_key(*p)).collect();
    warn!("expected {} releases, found {}; missing {:?}", expected, found.len(), missing);
    let backfilled = backfill_from_tags(host, &missing, strategies, repository_config, released_versions).await?;
    found.extend(backfilled);
  }
  Ok(found)
}

async fn backfill_from_tags(
  host: &dyn VcsHost,
  missing: &[&String],
  strategies: &StrategiesByPath,
  repository_config: &RepositoryConfig,
  released_versions: &VersionsMap,
) -> ReleaseResult<BTreeMap<String, Release>> {
  let mut all_tags: HashMap<String, String> = HashMap::new();
  let mut tags = host.tags(None);
  while let Some(tag) = tags.try_next().await? {
    all_tags.entry(tag.name).or_insert(tag.sha);
  }
  drop(tags);

  let mut backfilled = BTreeMap::new();
  for path in missing {
    let (Some(version), Some(config), Some(strategy)) = (
      released_versions.get(*path),
      repository_config.get(*path),
      strategies.get(*path),
    ) else {
      continue;
    };
    let component = strategy.component().await?;
    let expected = TagName::new(
      version.clone(),
      component.as_deref(),
      config.tag_separator.as_deref(),
      config.include_v_in_tag,
    );
    let expected_name = expected.to_string();
    if let Some(sha) = all_tags.get(&expected_name) {
      debug!("found tag {} at {}", expected_name, sha);
      backfilled.insert(
        path.to_string(),
        Release {
          name: Some(expected_name),
          tag: expected,
          sha: sha.clone(),
          notes: String::new(),
        },
      );
    }
  }
  Ok(backfilled)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::config::ReleaseKind;
  use crate::host::InMemoryHost;
  use crate::release::commit::Commit;
  use crate::release::pull_request::{PullRequest, PullRequestState};

  fn tag(name: &str) -> TagName {
    TagName::parse(name).unwrap()
  }

  #[test]
  fn test_tag_matches_config() {
    assert!(tag_matches_config(&tag("pkg-v1.0.0"), Some("pkg"), true));
    assert!(!tag_matches_config(&tag("other-v1.0.0"), Some("pkg"), true));
    assert!(tag_matches_config(&tag("v1.0.0"), Some("pkg"), false));
    assert!(!tag_matches_config(&tag("pkg-v1.0.0"), Some("pkg"), false));
    assert!(tag_matches_config(&tag("v1.0.0"), None, true));
  }

  #[tokio::test]
  async fn test_releases_before_the_release_pull_request_are_ignored() {
    let host = InMemoryHost::new("o", "r", "main");
    let config = ReleaserConfig {
      component: Some("pkg1".to_string()),
      ..ReleaserConfig::of_kind(ReleaseKind::Simple)
    };
    let title = PullRequestTitle::of_component_target_branch_version("pkg1", "main", &Version::new(1, 2, 0), None);
    let mut merge = Commit::new("m1", format!("{} (#3)", title));
    merge.pull_request = Some(PullRequest {
      number: 3,
      title: title.to_string(),
      body: String::new(),
      head_branch_name: "release-please--branches--main--components--pkg1".to_string(),
      base_branch_name: "main".to_string(),
      labels: vec![],
      merge_commit_sha: Some("m1".to_string()),
      state: PullRequestState::Merged,
      draft: false,
    });
    host.add_commit("main", Commit::new("old", "fix: old"));
    host.add_commit("main", merge);
    host.add_commit("main", Commit::new("new", "fix: new"));
    host.add_release("pkg1-v5.0.0", "old", None);
    host.add_release("pkg1-v1.1.0", "new", None);

    let latest = latest_release_version(&host, "main", &config, Some("pkg1"), |_| true)
      .await
      .unwrap();
    assert_eq!(latest, Some(Version::new(1, 2, 0)));
  }
}
