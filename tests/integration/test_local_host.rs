//! Planning against a real git checkout

use crate::helpers::{TestWorkspace, run_release_rail};
use anyhow::Result;
use release_rail::core::config::{DEFAULT_CONFIG_FILE, DEFAULT_MANIFEST_FILE};
use release_rail::host::{LocalGitHost, VcsHost};
use release_rail::{Manifest, ManifestOverrides};
use semver::Version;
use std::sync::Arc;

const CONFIG: &str = r#"{
  "release-type": "rust",
  "separate-pull-requests": true,
  "packages": {"crates/core": {}, "crates/cli": {}}
}"#;

/// Two released crates, then a fix to `core`
fn released_workspace() -> Result<TestWorkspace> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("core", "1.0.0", &[])?;
  ws.add_crate("cli", "0.4.0", &[("core", "1.0.0")])?;
  ws.write_file(DEFAULT_CONFIG_FILE, CONFIG)?;
  ws.write_file(DEFAULT_MANIFEST_FILE, r#"{"crates/core": "1.0.0", "crates/cli": "0.4.0"}"#)?;
  ws.commit("chore: release main")?;
  ws.tag("core-v1.0.0")?;
  ws.tag("cli-v0.4.0")?;

  ws.write_file("crates/core/src/lib.rs", "//! core crate\n\npub fn answer() -> u32 {\n  42\n}\n")?;
  ws.commit("fix: return the right answer")?;
  Ok(ws)
}

#[tokio::test]
async fn test_plan_from_local_checkout() -> Result<()> {
  let ws = released_workspace()?;
  let host = Arc::new(LocalGitHost::open(&ws.path, None)?);
  assert_eq!(host.repository().default_branch, "main");

  let manifest = Manifest::from_config_files(
    host.clone(),
    "main",
    DEFAULT_CONFIG_FILE,
    DEFAULT_MANIFEST_FILE,
    ManifestOverrides::default(),
  )
  .await?;

  let versions = manifest.latest_versions().await?;
  assert_eq!(versions.get("crates/core"), Some(&Some(Version::new(1, 0, 0))));

  let candidates = manifest.build_pull_requests().await?;
  assert_eq!(candidates.len(), 1);
  assert_eq!(candidates[0].path, "crates/core");
  assert_eq!(candidates[0].pull_request.version, Some(Version::new(1, 0, 1)));
  assert_eq!(
    candidates[0].pull_request.head_ref_name,
    "release-please--branches--main--components--core"
  );
  Ok(())
}

#[tokio::test]
async fn test_local_host_refuses_writes() -> Result<()> {
  let ws = released_workspace()?;
  let host = Arc::new(LocalGitHost::open(&ws.path, Some("main"))?);
  let manifest = Manifest::from_config_files(
    host,
    "main",
    DEFAULT_CONFIG_FILE,
    DEFAULT_MANIFEST_FILE,
    ManifestOverrides::default(),
  )
  .await?;

  let err = manifest.create_pull_requests().await.unwrap_err();
  assert!(err.to_string().contains("read-only"), "{}", err);
  Ok(())
}

#[test]
fn test_cli_plan_json() -> Result<()> {
  let ws = released_workspace()?;
  let output = run_release_rail(&ws.path, &["plan", "--json"])?;
  let planned: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  let planned = planned.as_array().expect("array of planned pull requests");
  assert_eq!(planned.len(), 1);
  assert_eq!(planned[0]["version"], "1.0.1");
  assert_eq!(planned[0]["head_branch"], "release-please--branches--main--components--core");
  let updates: Vec<&str> = planned[0]["updates"]
    .as_array()
    .expect("updates")
    .iter()
    .filter_map(|u| u.as_str())
    .collect();
  assert!(updates.contains(&"crates/core/Cargo.toml"));
  assert!(updates.contains(&".release-please-manifest.json"));
  Ok(())
}

#[test]
fn test_cli_versions_json() -> Result<()> {
  let ws = released_workspace()?;
  let output = run_release_rail(&ws.path, &["versions", "--json"])?;
  let versions: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(versions["crates/core"], "1.0.0");
  assert_eq!(versions["crates/cli"], "0.4.0");
  Ok(())
}

#[test]
fn test_cli_graph_orders_dependencies_first() -> Result<()> {
  let ws = released_workspace()?;
  let output = run_release_rail(&ws.path, &["graph", "--json", "core"])?;
  let ordered: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  let names: Vec<&str> = ordered
    .as_array()
    .expect("ordered packages")
    .iter()
    .filter_map(|p| p["name"].as_str())
    .collect();
  assert_eq!(names, vec!["core", "cli"]);
  assert_eq!(ordered[1]["depends_on"][0], "core");
  Ok(())
}

#[test]
fn test_cli_nothing_to_release() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("core", "1.0.0", &[])?;
  ws.write_file(DEFAULT_CONFIG_FILE, r#"{"release-type": "rust", "packages": {"crates/core": {}}}"#)?;
  ws.write_file(DEFAULT_MANIFEST_FILE, r#"{"crates/core": "1.0.0"}"#)?;
  ws.commit("chore: release main")?;
  ws.tag("core-v1.0.0")?;

  let output = run_release_rail(&ws.path, &["plan"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Nothing to release on main"), "{}", stdout);
  Ok(())
}
