//! `release-rail versions`: last released version per configured path

use super::RepoArgs;
use crate::core::error::ReleaseResult;
use crate::manifest::ManifestOverrides;
use std::collections::BTreeMap;

pub async fn run_versions(args: &RepoArgs, json: bool) -> ReleaseResult<()> {
  let (_host, manifest) = args.load_manifest(ManifestOverrides::default()).await?;
  let versions = manifest.latest_versions().await?;

  if json {
    let rendered: BTreeMap<&str, Option<String>> = versions
      .iter()
      .map(|(path, version)| (path.as_str(), version.as_ref().map(ToString::to_string)))
      .collect();
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    return Ok(());
  }

  println!("{:<40} VERSION", "PATH");
  println!("{:-<60}", "");
  for (path, version) in &versions {
    let shown = version.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string());
    println!("{:<40} {}", path, shown);
  }
  Ok(())
}
