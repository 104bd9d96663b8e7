//! Tagging merged release pull requests

use crate::helpers::{MAIN, PENDING, TAGGED, commit, hosted_repo, load_manifest};
use anyhow::Result;
use release_rail::core::config::{DEFAULT_MANIFEST_FILE, parse_versions_manifest};
use release_rail::host::InMemoryHost;
use semver::Version;
use std::sync::Arc;

const MERGED_CONFIG: &str = r#"{"packages": {"path/a": {"component": "pkg1"}, "path/b": {"component": "pkg2"}}}"#;

fn repo_with_changes(config: &str) -> Arc<InMemoryHost> {
  let host = hosted_repo(config, r#"{"path/a": "1.0.0", "path/b": "0.2.3"}"#);
  host.set_file(MAIN, "path/a/version.txt", "1.0.0");
  host.set_file(MAIN, "path/b/version.txt", "0.2.3");
  host.add_commit(MAIN, commit("r1", "chore: release main", &["path/a/version.txt", "path/b/version.txt"]));
  host.add_release("pkg1-v1.0.0", "r1", None);
  host.add_release("pkg2-v0.2.3", "r1", None);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));
  host.add_commit(MAIN, commit("c2", "fix: handle empty gadget", &["path/b/src/gadget.rs"]));
  host
}

#[tokio::test]
async fn test_full_cycle_converges() -> Result<()> {
  let host = repo_with_changes(MERGED_CONFIG);

  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  assert_eq!(opened.len(), 1);
  let number = opened[0].number;
  assert_eq!(opened[0].title, "chore: release main");
  assert!(opened[0].labels.iter().any(|l| l == PENDING));
  host.merge_pull_request(number, "m1")?;

  assert_eq!(host.file(MAIN, "path/a/version.txt").as_deref(), Some("1.0.1"));
  let manifest_on_main = host.file(MAIN, DEFAULT_MANIFEST_FILE).expect("versions manifest");
  let versions = parse_versions_manifest(&manifest_on_main, DEFAULT_MANIFEST_FILE)?;
  assert_eq!(versions.get("path/a"), Some(&Version::new(1, 0, 1)));
  assert_eq!(versions.get("path/b"), Some(&Version::new(0, 2, 4)));

  let blocked = load_manifest(&host).await?.create_pull_requests().await.unwrap_err();
  assert!(blocked.to_string().contains(&format!("untagged, merged release PRs outstanding: #{}", number)));

  let created = load_manifest(&host).await?.create_releases().await?;
  let mut tags: Vec<&str> = created.iter().map(|r| r.tag_name.as_str()).collect();
  tags.sort();
  assert_eq!(tags, vec!["pkg1-v1.0.1", "pkg2-v0.2.4"]);
  assert!(created.iter().all(|r| r.sha == "m1"));

  let merged = host.pull_request(number).expect("merged pull request");
  assert!(merged.has_label(TAGGED));
  assert!(!merged.has_label(PENDING));
  let comments = host.comments();
  assert_eq!(comments.len(), 2);
  assert!(comments.iter().all(|(n, body)| *n == number && body.starts_with(":robot: Release is at")));

  let reloaded = load_manifest(&host).await?;
  assert!(reloaded.build_pull_requests().await?.is_empty());
  assert!(reloaded.create_releases().await?.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_release_names_and_notes() -> Result<()> {
  let host = repo_with_changes(MERGED_CONFIG);
  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  host.merge_pull_request(opened[0].number, "m1")?;

  let releases = load_manifest(&host).await?.build_releases().await?;
  assert_eq!(releases.len(), 2);
  let pkg1 = releases.iter().find(|r| r.path == "path/a").expect("release for path/a");
  assert_eq!(pkg1.release.name.as_deref(), Some("pkg1: v1.0.1"));
  assert_eq!(pkg1.release.tag.to_string(), "pkg1-v1.0.1");
  assert!(pkg1.release.notes.contains("handle empty widget"));
  assert!(!pkg1.release.notes.contains("handle empty gadget"));
  assert!(!pkg1.draft);
  assert!(!pkg1.prerelease);
  Ok(())
}

#[tokio::test]
async fn test_all_duplicates_still_move_labels() -> Result<()> {
  let host = repo_with_changes(MERGED_CONFIG);
  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  let number = opened[0].number;
  host.merge_pull_request(number, "m1")?;
  host.add_tag("pkg1-v1.0.1", "m1");
  host.add_tag("pkg2-v0.2.4", "m1");

  let err = load_manifest(&host).await?.create_releases().await.unwrap_err();
  assert!(err.is_duplicate_release());
  let merged = host.pull_request(number).expect("merged pull request");
  assert!(merged.has_label(TAGGED));
  assert!(!merged.has_label(PENDING));
  assert!(host.comments().is_empty());
  Ok(())
}

#[tokio::test]
async fn test_partial_duplicates_create_the_rest() -> Result<()> {
  let host = repo_with_changes(MERGED_CONFIG);
  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  host.merge_pull_request(opened[0].number, "m1")?;
  host.add_tag("pkg1-v1.0.1", "m1");

  let created = load_manifest(&host).await?.create_releases().await?;
  assert_eq!(created.len(), 1);
  assert_eq!(created[0].tag_name, "pkg2-v0.2.4");
  Ok(())
}

#[tokio::test]
async fn test_skip_github_release() -> Result<()> {
  let host = repo_with_changes(
    r#"{"packages": {"path/a": {"component": "pkg1", "skip-github-release": true}, "path/b": {"component": "pkg2"}}}"#,
  );
  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  host.merge_pull_request(opened[0].number, "m1")?;

  let created = load_manifest(&host).await?.create_releases().await?;
  assert_eq!(created.len(), 1);
  assert_eq!(created[0].tag_name, "pkg2-v0.2.4");
  Ok(())
}

#[tokio::test]
async fn test_prerelease_flag_for_pre_major_versions() -> Result<()> {
  let host = repo_with_changes(
    r#"{"separate-pull-requests": true, "packages": {"path/b": {"component": "pkg2", "prerelease": true}}}"#,
  );
  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  assert_eq!(opened.len(), 1);
  host.merge_pull_request(opened[0].number, "m1")?;

  load_manifest(&host).await?.create_releases().await?;
  let release = host
    .releases_snapshot()
    .into_iter()
    .find(|r| r.tag_name == "pkg2-v0.2.4")
    .expect("created release");
  assert!(release.prerelease);
  let merged = host.pull_request(opened[0].number).expect("merged pull request");
  assert!(merged.has_label("autorelease: pre-release"));
  Ok(())
}
