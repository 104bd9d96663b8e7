//! Reconcile candidates with release pull requests on the host

use super::{Manifest, collect_results};
use crate::core::error::{ReleaseError, ReleaseResult};
use crate::host::PullRequestPayload;
use crate::overflow::OverflowHandler;
use crate::release::body::PullRequestBody;
use crate::release::branch::BranchName;
use crate::release::candidate::ReleasePullRequest;
use crate::release::labels::{SNOOZE_LABEL, union_labels};
use crate::release::pull_request::{PullRequest, PullRequestState};
use futures::TryStreamExt;
use tracing::{debug, info};

/// Merged pull requests scanned for untagged releases
pub(super) const MERGED_PULL_REQUEST_SCAN_DEPTH: usize = 200;
/// Closed pull requests scanned for snoozed releases
const SNOOZED_PULL_REQUEST_SCAN_DEPTH: usize = 200;

/// A release pull request already on the host, with its full body
struct ExistingPullRequest {
  pull_request: PullRequest,
  body: PullRequestBody,
}

impl ExistingPullRequest {
  /// Unchanged title and full body. The candidate body goes through the same
  /// render/parse cycle as the stored one.
  fn matches(&self, candidate: &ReleasePullRequest) -> bool {
    self.pull_request.title == candidate.title.to_string()
      && PullRequestBody::parse(&candidate.body.to_string())
        .is_some_and(|body| body.to_string() == self.body.to_string())
  }
}

impl Manifest {
  /// Build candidates and open, update or reopen their pull requests. Returns the pull
  /// requests that were created or changed.
  ///
  /// Fails before touching anything while merged release pull requests are still
  /// waiting to be tagged.
  pub async fn create_pull_requests(&self) -> ReleaseResult<Vec<PullRequest>> {
    let candidates = self.build_pull_requests().await?;
    if candidates.is_empty() {
      info!("no release pull requests to open");
      return Ok(Vec::new());
    }

    if !self.options.skip_labeling {
      let labels = union_labels([
        self.options.labels.as_slice(),
        self.options.release_labels.as_slice(),
        self.options.snapshot_labels.as_slice(),
        self.options.prerelease_labels.as_slice(),
      ]);
      self.host.create_labels(&labels).await?;
    }

    let pending = self.merged_pending_pull_requests().await?;
    if !pending.is_empty() {
      let numbers: Vec<String> = pending.iter().map(|p| format!("#{}", p.number)).collect();
      return Err(ReleaseError::with_help(
        format!("There are untagged, merged release PRs outstanding: {}", numbers.join(", ")),
        "Create the releases for merged pull requests before opening new release pull requests.",
      ));
    }

    let open = self.open_release_pull_requests().await?;
    let snoozed = self.snoozed_release_pull_requests().await?;
    let overflow = OverflowHandler::new(self.host.as_ref());

    let jobs: Vec<_> = candidates
      .iter()
      .map(|candidate| self.create_or_update(&candidate.pull_request, &open, &snoozed, &overflow))
      .collect();
    let results = collect_results(self.run_all(jobs).await)?;
    Ok(results.into_iter().flatten().collect())
  }

  /// Merged pull requests still carrying every pending label
  pub(super) async fn merged_pending_pull_requests(&self) -> ReleaseResult<Vec<PullRequest>> {
    let mut pending = Vec::new();
    let mut stream = self.host.pull_requests(
      &self.target_branch,
      PullRequestState::Merged,
      Some(MERGED_PULL_REQUEST_SCAN_DEPTH),
    );
    while let Some(pull_request) = stream.try_next().await? {
      if !pull_request.has_all_labels(&self.options.labels) {
        continue;
      }
      if BranchName::parse(&pull_request.head_branch_name).is_none() {
        debug!("pull request #{} is not a release branch", pull_request.number);
        continue;
      }
      pending.push(pull_request);
    }
    Ok(pending)
  }

  async fn open_release_pull_requests(&self) -> ReleaseResult<Vec<ExistingPullRequest>> {
    let overflow = OverflowHandler::new(self.host.as_ref());
    let mut open = Vec::new();
    let mut stream = self.host.pull_requests(&self.target_branch, PullRequestState::Open, None);
    while let Some(pull_request) = stream.try_next().await? {
      if !pull_request.has_all_labels(&self.options.labels)
        && !pull_request.has_all_labels(&self.options.snapshot_labels)
      {
        continue;
      }
      if BranchName::parse(&pull_request.head_branch_name).is_none() {
        continue;
      }
      if let Some(body) = overflow.parse_overflow(&pull_request).await? {
        debug!("found open release pull request #{}", pull_request.number);
        open.push(ExistingPullRequest { pull_request, body });
      }
    }
    info!("found {} open release pull requests", open.len());
    Ok(open)
  }

  async fn snoozed_release_pull_requests(&self) -> ReleaseResult<Vec<ExistingPullRequest>> {
    let overflow = OverflowHandler::new(self.host.as_ref());
    let mut snoozed = Vec::new();
    let mut stream = self.host.pull_requests(
      &self.target_branch,
      PullRequestState::Closed,
      Some(SNOOZED_PULL_REQUEST_SCAN_DEPTH),
    );
    while let Some(pull_request) = stream.try_next().await? {
      if !pull_request.has_label(SNOOZE_LABEL) || BranchName::parse(&pull_request.head_branch_name).is_none() {
        continue;
      }
      if let Some(body) = overflow.parse_overflow(&pull_request).await? {
        debug!("found snoozed release pull request #{}", pull_request.number);
        snoozed.push(ExistingPullRequest { pull_request, body });
      }
    }
    info!("found {} snoozed release pull requests", snoozed.len());
    Ok(snoozed)
  }

  async fn create_or_update(
    &self,
    candidate: &ReleasePullRequest,
    open: &[ExistingPullRequest],
    snoozed: &[ExistingPullRequest],
    overflow: &OverflowHandler<'_>,
  ) -> ReleaseResult<Option<PullRequest>> {
    let same_branch =
      |existing: &&ExistingPullRequest| existing.pull_request.head_branch_name == candidate.head_ref_name;

    if let Some(existing) = open.iter().find(same_branch) {
      if existing.matches(candidate) {
        info!("pull request #{} unchanged", existing.pull_request.number);
        return Ok(None);
      }
      let updated = self
        .update(existing, candidate, overflow, &existing.pull_request.head_branch_name)
        .await?;
      return Ok(Some(updated));
    }

    if let Some(existing) = snoozed.iter().find(same_branch) {
      if existing.matches(candidate) {
        info!("pull request #{} is snoozed and unchanged, leaving it closed", existing.pull_request.number);
        return Ok(None);
      }
      // a closed pull request's head branch may already be gone
      let updated = self.update(existing, candidate, overflow, &self.target_branch).await?;
      self
        .host
        .remove_issue_labels(&[SNOOZE_LABEL.to_string()], updated.number)
        .await?;
      return Ok(Some(updated));
    }

    // the head branch does not exist until the pull request is created
    let payload = PullRequestPayload {
      title: candidate.title.to_string(),
      body: overflow.handle_overflow(candidate, &self.target_branch).await?,
      head_branch_name: candidate.head_ref_name.clone(),
      labels: candidate.labels.clone(),
      draft: candidate.draft,
      updates: candidate.updates.clone(),
    };
    let created = self
      .host
      .create_pull_request(&payload, &self.target_branch, &payload.title)
      .await?;
    info!("opened pull request #{}: {}", created.number, created.title);
    Ok(Some(created))
  }

  async fn update(
    &self,
    existing: &ExistingPullRequest,
    candidate: &ReleasePullRequest,
    overflow: &OverflowHandler<'_>,
    overflow_base: &str,
  ) -> ReleaseResult<PullRequest> {
    let payload = PullRequestPayload {
      title: candidate.title.to_string(),
      body: overflow.handle_overflow(candidate, overflow_base).await?,
      head_branch_name: candidate.head_ref_name.clone(),
      labels: candidate.labels.clone(),
      draft: candidate.draft,
      updates: candidate.updates.clone(),
    };
    let updated = self
      .host
      .update_pull_request(existing.pull_request.number, &payload, &self.target_branch, &payload.title)
      .await?;
    info!("updated pull request #{}", updated.number);
    Ok(updated)
  }
}
