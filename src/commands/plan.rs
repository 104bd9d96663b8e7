//! `release-rail plan`: release pull requests the next cycle would open

use super::RepoArgs;
use crate::core::error::ReleaseResult;
use crate::manifest::ManifestOverrides;
use crate::release::candidate::CandidateReleasePullRequest;
use serde::Serialize;

/// One planned release pull request
#[derive(Debug, Clone, Serialize)]
pub struct PlannedPullRequest {
  pub title: String,
  pub head_branch: String,
  pub version: Option<String>,
  pub draft: bool,
  pub labels: Vec<String>,
  /// Files the pull request would change
  pub updates: Vec<String>,
}

impl From<&CandidateReleasePullRequest> for PlannedPullRequest {
  fn from(candidate: &CandidateReleasePullRequest) -> Self {
    let pull_request = &candidate.pull_request;
    Self {
      title: pull_request.title.to_string(),
      head_branch: pull_request.head_ref_name.clone(),
      version: pull_request.version.as_ref().map(ToString::to_string),
      draft: pull_request.draft,
      labels: pull_request.labels.clone(),
      updates: pull_request.updates.iter().map(|u| u.path.clone()).collect(),
    }
  }
}

/// Run the plan command
pub async fn run_plan(args: &RepoArgs, separate_pull_requests: bool, json: bool) -> ReleaseResult<()> {
  let overrides = ManifestOverrides {
    separate_pull_requests: separate_pull_requests.then_some(true),
    ..Default::default()
  };
  let (_host, manifest) = args.load_manifest(overrides).await?;
  let manifest = manifest.with_progress(!json);
  let candidates = manifest.build_pull_requests().await?;
  let planned: Vec<PlannedPullRequest> = candidates.iter().map(PlannedPullRequest::from).collect();

  if json {
    println!("{}", serde_json::to_string_pretty(&planned)?);
    return Ok(());
  }

  if planned.is_empty() {
    println!("Nothing to release on {}", manifest.target_branch());
    return Ok(());
  }
  println!(
    "\nRelease plan for {} ({} pull request{})\n",
    manifest.target_branch(),
    planned.len(),
    if planned.len() == 1 { "" } else { "s" }
  );
  for pr in &planned {
    println!("{}{}", pr.title, if pr.draft { " [draft]" } else { "" });
    println!("  branch:  {}", pr.head_branch);
    if let Some(version) = &pr.version {
      println!("  version: {}", version);
    }
    println!("  labels:  {}", pr.labels.join(", "));
    println!("  updates:");
    for path in &pr.updates {
      println!("    {}", path);
    }
    println!();
  }
  Ok(())
}
