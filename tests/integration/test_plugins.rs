//! Plugin pipeline behavior through the orchestrator

use crate::helpers::{MAIN, commit, hosted_repo, load_manifest};
use anyhow::Result;
use release_rail::core::config::ROOT_PROJECT_PATH;
use release_rail::release::Updater;
use semver::Version;

fn crate_toml(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
  let mut toml = format!("[package]\nname = \"{}\"\nversion = \"{}\"\n\n[dependencies]\n", name, version);
  for (dep, dep_version) in deps {
    toml.push_str(&format!("{} = {{ path = \"../{}\", version = \"{}\" }}\n", dep, dep, dep_version));
  }
  toml
}

#[tokio::test]
async fn test_linked_versions_release_together() -> Result<()> {
  let host = hosted_repo(
    r#"{
      "separate-pull-requests": true,
      "plugins": [{"type": "linked-versions", "groupName": "group", "components": ["pkg2", "pkg3"]}],
      "packages": {
        "path/a": {"component": "pkg1"},
        "path/b": {"component": "pkg2"},
        "path/c": {"component": "pkg3"}
      }
    }"#,
    r#"{"path/a": "1.0.0", "path/b": "1.9.0", "path/c": "1.5.0"}"#,
  );
  host.add_commit(MAIN, commit("r1", "chore: release main", &["path/b/version.txt"]));
  host.add_release("pkg1-v1.0.0", "r1", None);
  host.add_release("pkg2-v1.9.0", "r1", None);
  host.add_release("pkg3-v1.5.0", "r1", None);
  host.add_commit(MAIN, commit("c1", "feat!: new widget api", &["path/b/src/api.rs"]));
  host.add_commit(MAIN, commit("c2", "fix: unrelated", &["path/a/src/lib.rs"]));

  let candidates = load_manifest(&host).await?.build_pull_requests().await?;
  assert_eq!(candidates.len(), 2);

  let linked = candidates
    .iter()
    .find(|c| c.pull_request.head_ref_name == "release-please--branches--main--groups--group")
    .expect("linked candidate");
  assert_eq!(linked.path, ROOT_PROJECT_PATH);
  assert_eq!(linked.pull_request.title.to_string(), "chore(main): release group libraries");
  let versions: Vec<(Option<&str>, Option<&Version>)> = linked
    .pull_request
    .body
    .release_data
    .iter()
    .map(|d| (d.component.as_deref(), d.version.as_ref()))
    .collect();
  let two = Version::new(2, 0, 0);
  assert_eq!(versions, vec![(Some("pkg2"), Some(&two)), (Some("pkg3"), Some(&two))]);

  let standalone = candidates.iter().find(|c| c.path == "path/a").expect("pkg1 candidate");
  assert_eq!(standalone.pull_request.version, Some(Version::new(1, 0, 1)));
  assert_eq!(standalone.pull_request.head_ref_name, "release-please--branches--main--components--pkg1");
  Ok(())
}

#[tokio::test]
async fn test_linked_versions_without_changes_is_a_no_op() -> Result<()> {
  let host = hosted_repo(
    r#"{
      "plugins": [{"type": "linked-versions", "groupName": "group", "components": ["pkg2", "pkg3"]}],
      "packages": {"path/b": {"component": "pkg2"}, "path/c": {"component": "pkg3"}}
    }"#,
    r#"{"path/b": "1.9.0", "path/c": "1.5.0"}"#,
  );
  host.add_commit(MAIN, commit("r1", "chore: release main", &["path/b/version.txt"]));
  host.add_release("pkg2-v1.9.0", "r1", None);
  host.add_release("pkg3-v1.5.0", "r1", None);
  host.add_commit(MAIN, commit("c1", "docs: readme", &["README.md"]));

  assert!(load_manifest(&host).await?.build_pull_requests().await?.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_cargo_workspace_bumps_dependents() -> Result<()> {
  let host = hosted_repo(
    r#"{
      "release-type": "rust",
      "separate-pull-requests": true,
      "plugins": ["cargo-workspace"],
      "packages": {"crates/a": {}, "crates/b": {}, "crates/c": {}}
    }"#,
    r#"{"crates/a": "1.0.0", "crates/b": "2.0.0", "crates/c": "3.0.0"}"#,
  );
  host.set_file(MAIN, "Cargo.toml", "[workspace]\nmembers = [\"crates/*\"]\n");
  host.set_file(MAIN, "crates/a/Cargo.toml", &crate_toml("a", "1.0.0", &[]));
  host.set_file(MAIN, "crates/b/Cargo.toml", &crate_toml("b", "2.0.0", &[("a", "1.0.0")]));
  host.set_file(MAIN, "crates/c/Cargo.toml", &crate_toml("c", "3.0.0", &[("b", "2.0.0")]));
  host.add_commit(MAIN, commit("r1", "chore: release main", &["crates/a/Cargo.toml"]));
  host.add_release("a-v1.0.0", "r1", None);
  host.add_release("b-v2.0.0", "r1", None);
  host.add_release("c-v3.0.0", "r1", None);
  host.add_commit(MAIN, commit("c1", "fix: correct rounding", &["crates/a/src/lib.rs"]));

  let candidates = load_manifest(&host).await?.build_pull_requests().await?;
  let summary: Vec<(&str, String, &str)> = candidates
    .iter()
    .map(|c| {
      (
        c.path.as_str(),
        c.pull_request.version.as_ref().map(ToString::to_string).unwrap_or_default(),
        c.pull_request.head_ref_name.as_str(),
      )
    })
    .collect();
  assert_eq!(
    summary,
    vec![
      ("crates/a", "1.0.1".to_string(), "release-please--branches--main--components--a"),
      ("crates/b", "2.0.1".to_string(), "release-please--branches--main--components--b"),
      ("crates/c", "3.0.1".to_string(), "release-please--branches--main--components--c"),
    ]
  );

  let c = &candidates[2];
  let manifest_update = c
    .pull_request
    .updates
    .iter()
    .find(|u| u.path == "crates/c/Cargo.toml")
    .expect("Cargo.toml update for c");
  let Updater::RawContent { content } = &manifest_update.updater else {
    panic!("expected raw Cargo.toml content, got {:?}", manifest_update.updater);
  };
  assert!(content.contains("version = \"3.0.1\""));
  assert!(content.contains("b = { path = \"../b\", version = \"2.0.1\" }"));
  assert!(c.pull_request.body.to_string().contains("b bumped from 2.0.0 to 2.0.1"));

  let versions_update = candidates[0]
    .pull_request
    .updates
    .iter()
    .find(|u| u.path == ".release-please-manifest.json")
    .expect("versions manifest update");
  let written = versions_update.updater.update_content(Some("{}"))?;
  assert!(written.contains("\"crates/b\": \"2.0.1\""));
  assert!(written.contains("\"crates/c\": \"3.0.1\""));
  Ok(())
}

#[tokio::test]
async fn test_cargo_workspace_cycle_is_reported() -> Result<()> {
  let host = hosted_repo(
    r#"{"release-type": "rust", "plugins": ["cargo-workspace"], "packages": {"crates/a": {}, "crates/b": {}}}"#,
    r#"{"crates/a": "1.0.0", "crates/b": "1.0.0"}"#,
  );
  host.set_file(MAIN, "Cargo.toml", "[workspace]\nmembers = [\"crates/a\", \"crates/b\"]\n");
  host.set_file(MAIN, "crates/a/Cargo.toml", &crate_toml("a", "1.0.0", &[("b", "1.0.0")]));
  host.set_file(MAIN, "crates/b/Cargo.toml", &crate_toml("b", "1.0.0", &[("a", "1.0.0")]));
  host.add_commit(MAIN, commit("c1", "fix: loop", &["crates/a/src/lib.rs"]));

  let err = load_manifest(&host).await?.build_pull_requests().await.unwrap_err();
  let message = err.to_string();
  assert!(message.starts_with("found cycle in dependency graph: "), "{}", message);
  assert!(message.contains("a -> b") || message.contains("b -> a"), "{}", message);
  Ok(())
}

#[tokio::test]
async fn test_sentence_case_rewrites_notes() -> Result<()> {
  let host = hosted_repo(
    r#"{"separate-pull-requests": true, "plugins": ["sentence-case"], "packages": {"path/a": {"component": "pkg1"}}}"#,
    r#"{"path/a": "1.0.0"}"#,
  );
  host.add_commit(MAIN, commit("r1", "chore: release main", &["path/a/version.txt"]));
  host.add_release("pkg1-v1.0.0", "r1", None);
  host.add_commit(MAIN, commit("c1", "fix: handle empty widget", &["path/a/src/widget.rs"]));

  let candidates = load_manifest(&host).await?.build_pull_requests().await?;
  assert!(candidates[0].pull_request.body.to_string().contains("Handle empty widget"));
  Ok(())
}
