//! Building and reconciling release pull requests against an in-memory host

use crate::helpers::{MAIN, PENDING, commit, hosted_repo, load_manifest};
use anyhow::Result;
use release_rail::Manifest;
use release_rail::core::config::{ReleaseKind, ReleaserConfig};
use release_rail::manifest::resolver::latest_release_version;
use release_rail::release::labels::SNOOZE_LABEL;
use release_rail::release::{PullRequest, PullRequestState, PullRequestTitle};
use semver::Version;
use std::sync::Arc;

const TWO_PACKAGES_SEPARATE: &str = r#"{
  "separate-pull-requests": true,
  "packages": {
    "path/a": {"component": "pkg1"},
    "path/b": {"component": "pkg2"}
  }
}"#;

const TWO_PACKAGES_MANIFEST: &str = r#"{"path/a": "1.0.0", "path/b": "0.2.3"}"#;

fn released_repo(config: &str) -> Arc<release_rail::host::InMemoryHost> {
  let host = hosted_repo(config, TWO_PACKAGES_MANIFEST);
  host.add_commit(MAIN, commit("r1", "chore: release main", &["path/a/version.txt", "path/b/version.txt"]));
  host.add_release("pkg1-v1.0.0", "r1", None);
  host.add_release("pkg2-v0.2.3", "r1", None);
  host
}

#[tokio::test]
async fn test_separate_pull_requests_per_component() -> Result<()> {
  let host = released_repo(TWO_PACKAGES_SEPARATE);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));
  host.add_commit(MAIN, commit("c2", "fix: handle empty gadget", &["path/b/src/gadget.rs"]));

  let manifest = load_manifest(&host).await?;
  let candidates = manifest.build_pull_requests().await?;
  assert_eq!(candidates.len(), 2);

  let a = candidates.iter().find(|c| c.path == "path/a").expect("candidate for path/a");
  let b = candidates.iter().find(|c| c.path == "path/b").expect("candidate for path/b");
  assert_eq!(a.pull_request.version, Some(Version::new(1, 0, 1)));
  assert_eq!(b.pull_request.version, Some(Version::new(0, 2, 4)));
  assert_eq!(a.pull_request.head_ref_name, "release-please--branches--main--components--pkg1");
  assert_eq!(b.pull_request.head_ref_name, "release-please--branches--main--components--pkg2");
  assert!(a.pull_request.labels.iter().any(|l| l == PENDING));
  assert!(
    a.pull_request
      .updates
      .iter()
      .any(|u| u.path == ".release-please-manifest.json")
  );
  assert!(a.pull_request.body.to_string().contains("handle empty widget"));
  assert!(!a.pull_request.body.to_string().contains("handle empty gadget"));
  Ok(())
}

#[tokio::test]
async fn test_untouched_paths_have_no_candidate() -> Result<()> {
  let host = released_repo(TWO_PACKAGES_SEPARATE);
  host.add_commit(MAIN, commit("c1", "feat: shiny widget", &["path/a/src/widget.rs"]));
  host.add_commit(MAIN, commit("c2", "docs: typo", &["README.md"]));

  let candidates = load_manifest(&host).await?.build_pull_requests().await?;
  assert_eq!(candidates.len(), 1);
  assert_eq!(candidates[0].path, "path/a");
  assert_eq!(candidates[0].pull_request.version, Some(Version::new(1, 1, 0)));
  Ok(())
}

#[tokio::test]
async fn test_merged_pull_request_for_all_components() -> Result<()> {
  let host = released_repo(r#"{"packages": {"path/a": {"component": "pkg1"}, "path/b": {"component": "pkg2"}}}"#);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));
  host.add_commit(MAIN, commit("c2", "feat: gadget colors", &["path/b/src/gadget.rs"]));

  let candidates = load_manifest(&host).await?.build_pull_requests().await?;
  assert_eq!(candidates.len(), 1);
  let merged = &candidates[0].pull_request;
  assert_eq!(merged.title.to_string(), "chore: release main");
  assert_eq!(merged.head_ref_name, "release-please--branches--main");
  let components: Vec<Option<&str>> = merged
    .body
    .release_data
    .iter()
    .map(|d| d.component.as_deref())
    .collect();
  assert_eq!(components, vec![Some("pkg1"), Some("pkg2")]);
  Ok(())
}

#[tokio::test]
async fn test_open_pull_request_is_not_touched_when_unchanged() -> Result<()> {
  let host = released_repo(TWO_PACKAGES_SEPARATE);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));

  let manifest = load_manifest(&host).await?;
  let opened = manifest.create_pull_requests().await?;
  assert_eq!(opened.len(), 1);
  assert!(host.created_labels().iter().any(|l| l == PENDING));

  let again = load_manifest(&host).await?.create_pull_requests().await?;
  assert!(again.is_empty());
  assert_eq!(host.pull_requests_snapshot().len(), 1);

  host.add_commit(MAIN, commit("c2", "fix: handle full widget", &["path/a/src/widget.rs"]));
  let updated = load_manifest(&host).await?.create_pull_requests().await?;
  assert_eq!(updated.len(), 1);
  assert_eq!(updated[0].number, opened[0].number);
  assert!(updated[0].body.contains("handle full widget"));
  Ok(())
}

#[tokio::test]
async fn test_snoozed_pull_request_stays_closed_until_it_changes() -> Result<()> {
  let host = released_repo(TWO_PACKAGES_SEPARATE);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));

  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  let number = opened[0].number;
  host.close_pull_request(number, &[SNOOZE_LABEL]);

  let unchanged = load_manifest(&host).await?.create_pull_requests().await?;
  assert!(unchanged.is_empty());
  let snoozed = host.pull_request(number).expect("snoozed pull request");
  assert_eq!(snoozed.state, PullRequestState::Closed);
  assert!(snoozed.has_label(SNOOZE_LABEL));

  host.add_commit(MAIN, commit("c2", "fix: handle full widget", &["path/a/src/widget.rs"]));
  let reopened = load_manifest(&host).await?.create_pull_requests().await?;
  assert_eq!(reopened.len(), 1);
  let current = host.pull_request(number).expect("reopened pull request");
  assert_eq!(current.state, PullRequestState::Open);
  assert!(!current.has_label(SNOOZE_LABEL));
  assert_eq!(host.pull_requests_snapshot().len(), 1);
  Ok(())
}

#[tokio::test]
async fn test_oversized_body_moves_to_side_branch() -> Result<()> {
  let host = hosted_repo(
    r#"{"separate-pull-requests": true, "packages": {"path/a": {"component": "pkg1"}}}"#,
    r#"{"path/a": "1.0.0"}"#,
  );
  host.set_file(MAIN, "path/a/version.txt", "1.0.0");
  host.add_commit(MAIN, commit("r1", "chore: release main", &["path/a/version.txt"]));
  host.add_release("pkg1-v1.0.0", "r1", None);
  let padding = "x".repeat(280);
  for i in 0..300 {
    host.add_commit(
      MAIN,
      commit(&format!("c{:03}", i), &format!("fix: repair widget {} {}", i, padding), &["path/a/src/widget.rs"]),
    );
  }

  let opened = load_manifest(&host).await?.create_pull_requests().await?;
  assert_eq!(opened.len(), 1);
  assert!(opened[0].body.starts_with("This release is too large to preview"));
  let side_branch = "release-please--branches--main--components--pkg1--release-notes";
  let notes = host.file(side_branch, "release-notes.md").expect("overflowed notes on side branch");
  assert!(notes.contains("repair widget 299"));
  // side branch is cut from the target branch, since the head did not exist yet
  assert_eq!(host.file(side_branch, "path/a/version.txt").as_deref(), Some("1.0.0"));

  let again = load_manifest(&host).await?.create_pull_requests().await?;
  assert!(again.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_failed_overflow_write_does_not_block_siblings() -> Result<()> {
  let host = released_repo(TWO_PACKAGES_SEPARATE);
  let padding = "x".repeat(280);
  for i in 0..300 {
    host.add_commit(
      MAIN,
      commit(&format!("c{:03}", i), &format!("fix: repair widget {} {}", i, padding), &["path/a/src/widget.rs"]),
    );
  }
  host.add_commit(MAIN, commit("g1", "fix: handle empty gadget", &["path/b/src/gadget.rs"]));
  host.fail_writes_to("release-please--branches--main--components--pkg1--release-notes");

  let err = load_manifest(&host).await?.create_pull_requests().await.unwrap_err();
  assert!(err.to_string().contains("Reference update failed"), "{}", err);
  let opened: Vec<String> = host
    .pull_requests_snapshot()
    .into_iter()
    .map(|pr| pr.head_branch_name)
    .collect();
  assert_eq!(opened, vec!["release-please--branches--main--components--pkg2"]);
  Ok(())
}

#[tokio::test]
async fn test_transient_listing_failures_are_retried() -> Result<()> {
  let host = released_repo(TWO_PACKAGES_SEPARATE);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));
  let manifest = load_manifest(&host).await?;

  host.fail_next_pages(2, 502);
  assert_eq!(manifest.build_pull_requests().await?.len(), 1);

  host.fail_next_pages(6, 503);
  let err = manifest.build_pull_requests().await.unwrap_err();
  assert!(err.is_retryable());

  host.fail_next_pages(1, 404);
  let err = manifest.build_pull_requests().await.unwrap_err();
  assert!(!err.is_retryable());

  assert_eq!(manifest.build_pull_requests().await?.len(), 1);
  Ok(())
}

#[tokio::test]
async fn test_latest_release_ignores_releases_off_branch() -> Result<()> {
  let host = hosted_repo("{}", "{}");
  let config = ReleaserConfig {
    component: Some("pkg1".to_string()),
    ..ReleaserConfig::of_kind(ReleaseKind::Simple)
  };
  let title = PullRequestTitle::of_component_target_branch_version("pkg1", MAIN, &Version::new(1, 2, 0), None);
  let merged = PullRequest {
    number: 7,
    title: title.to_string(),
    body: String::new(),
    head_branch_name: "release-please--branches--main--components--pkg1".to_string(),
    base_branch_name: MAIN.to_string(),
    labels: vec!["autorelease: tagged".to_string()],
    merge_commit_sha: Some("m7".to_string()),
    state: PullRequestState::Merged,
    draft: false,
  };
  host.add_commit(MAIN, commit("old", "fix: first", &["src/lib.rs"]));
  let mut merge_commit = commit("m7", &format!("{} (#7)", title), &["version.txt"]);
  merge_commit.pull_request = Some(merged);
  host.add_commit(MAIN, merge_commit);
  host.add_commit(MAIN, commit("new", "fix: later", &["src/lib.rs"]));

  host.add_release("pkg1-v1.1.0", "old", None);
  host.add_release("pkg1-v9.0.0", "elsewhere", None);

  let latest = latest_release_version(host.as_ref(), MAIN, &config, Some("pkg1"), |_| true).await?;
  assert_eq!(latest, Some(Version::new(1, 2, 0)));

  let manifest = Manifest::from_config(host.clone(), MAIN, config, ".").await?;
  let candidates = manifest.build_pull_requests().await?;
  assert_eq!(candidates.len(), 1);
  assert_eq!(candidates[0].pull_request.version, Some(Version::new(1, 2, 1)));
  Ok(())
}

#[tokio::test]
async fn test_tags_are_the_last_resort() -> Result<()> {
  let host = hosted_repo("{}", "{}");
  host.add_commit(MAIN, commit("t1", "feat: first", &["src/lib.rs"]));
  host.add_tag("v0.4.0", "t1");
  host.add_tag("v0.9.0", "unreachable");
  let config = ReleaserConfig {
    include_component_in_tag: false,
    ..ReleaserConfig::default()
  };
  let latest = latest_release_version(host.as_ref(), MAIN, &config, None, |_| true).await?;
  assert_eq!(latest, Some(Version::new(0, 4, 0)));
  Ok(())
}
