//! Fold candidates into a single release pull request

use super::Plugin;
use crate::core::config::{MANIFEST_PULL_REQUEST_TITLE_PATTERN, ROOT_PROJECT_PATH, ReleaseKind, ReleaserConfig};
use crate::core::error::ReleaseResult;
use crate::release::body::{BodyOptions, PullRequestBody};
use crate::release::branch::BranchName;
use crate::release::candidate::{CandidateReleasePullRequest, ReleasePullRequest};
use crate::release::labels::union_labels;
use crate::release::title::PullRequestTitle;
use crate::release::updater::merge_updates;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
  /// Defaults to `chore: release ${branch}`
  pub pull_request_title_pattern: Option<String>,
  pub pull_request_header: Option<String>,
  /// Defaults to the target branch's release branch
  pub head_branch_name: Option<String>,
  /// Also merge candidates configured for separate pull requests
  pub force_merge: bool,
}

pub struct Merge {
  target_branch: String,
  options: MergeOptions,
}

impl Merge {
  pub fn new(target_branch: &str, options: MergeOptions) -> Self {
    Self {
      target_branch: target_branch.to_string(),
      options,
    }
  }

  /// Merge all in-scope candidates. The merged candidate comes first, followed by the
  /// candidates that asked for their own pull request.
  pub fn merge(&self, candidates: Vec<CandidateReleasePullRequest>) -> Vec<CandidateReleasePullRequest> {
    let (in_scope, out_of_scope): (Vec<_>, Vec<_>) = candidates
      .into_iter()
      .partition(|c| self.options.force_merge || !c.config.separate_pull_requests.unwrap_or(false));
    if in_scope.is_empty() {
      return out_of_scope;
    }
    info!("merging {} pull requests", in_scope.len());

    let root = in_scope.iter().find(|c| c.path == ROOT_PROJECT_PATH);
    let pattern = self
      .options
      .pull_request_title_pattern
      .as_deref()
      .unwrap_or(MANIFEST_PULL_REQUEST_TITLE_PATTERN);
    let title = match root.and_then(|r| r.pull_request.version.as_ref().map(|v| (r, v))) {
      Some((root, version)) => PullRequestTitle::of_component_target_branch_version(
        root.pull_request.title.component.as_deref().unwrap_or_default(),
        &self.target_branch,
        version,
        Some(pattern),
      ),
      None => PullRequestTitle::of_target_branch(&self.target_branch, Some(pattern)),
    };
    let version = root.and_then(|r| r.pull_request.version.clone());

    let labels = union_labels(in_scope.iter().map(|c| c.pull_request.labels.as_slice()));
    let draft = in_scope.iter().any(|c| c.pull_request.draft);
    let first_kind = in_scope[0].config.release_type;
    let release_type = if in_scope.iter().all(|c| c.config.release_type == first_kind) {
      first_kind
    } else {
      ReleaseKind::Simple
    };

    let mut release_data = Vec::new();
    let mut updates = Vec::new();
    for candidate in in_scope {
      release_data.extend(candidate.pull_request.body.release_data);
      updates.extend(candidate.pull_request.updates);
    }

    // a lone unnamed release renders flat
    let use_components = !(release_data.len() == 1 && release_data[0].component.is_none());
    let pull_request = ReleasePullRequest {
      title,
      body: PullRequestBody::with_options(
        release_data,
        BodyOptions {
          header: self.options.pull_request_header.clone(),
          use_components: Some(use_components),
          ..Default::default()
        },
      ),
      labels,
      head_ref_name: self
        .options
        .head_branch_name
        .clone()
        .unwrap_or_else(|| BranchName::of_target_branch(&self.target_branch).to_string()),
      version,
      draft,
      group: None,
      updates: merge_updates(updates),
    };

    let mut merged = vec![CandidateReleasePullRequest::new(
      ROOT_PROJECT_PATH,
      pull_request,
      ReleaserConfig::of_kind(release_type),
    )];
    merged.extend(out_of_scope);
    merged
  }
}

#[async_trait]
impl Plugin for Merge {
  fn name(&self) -> &'static str {
    "merge"
  }

  async fn run(&self, candidates: Vec<CandidateReleasePullRequest>) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    Ok(self.merge(candidates))
  }
}
