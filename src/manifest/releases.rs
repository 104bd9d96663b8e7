//! Tag releases for merged release pull requests

use super::pull_requests::MERGED_PULL_REQUEST_SCAN_DEPTH;
use super::{Manifest, collect_results};
use crate::core::config::MANIFEST_PULL_REQUEST_TITLE_PATTERN;
use crate::core::error::{ReleaseError, ReleaseResult};
use crate::host::ReleasePayload;
use crate::overflow::OverflowHandler;
use crate::release::branch::BranchName;
use crate::release::candidate::{CandidateRelease, CreatedRelease};
use crate::release::labels::union_labels;
use crate::release::pull_request::{PullRequest, PullRequestState};
use futures::TryStreamExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl Manifest {
  /// Releases to create for merged release pull requests that are still pending
  pub async fn build_releases(&self) -> ReleaseResult<Vec<CandidateRelease>> {
    info!("building releases for {}", self.target_branch);
    let strategies = self.build_strategies()?;
    let overflow = OverflowHandler::new(self.host.as_ref());
    let group_title_pattern = self
      .options
      .group_pull_request_title_pattern
      .as_deref()
      .unwrap_or(MANIFEST_PULL_REQUEST_TITLE_PATTERN);

    let mut candidates = Vec::new();
    let mut stream = self.host.pull_requests(
      &self.target_branch,
      PullRequestState::Merged,
      Some(MERGED_PULL_REQUEST_SCAN_DEPTH),
    );
    while let Some(mut pull_request) = stream.try_next().await? {
      if !pull_request.has_all_labels(&self.options.labels) {
        continue;
      }
      if BranchName::parse(&pull_request.head_branch_name).is_none() {
        debug!("pull request #{} is not a release branch", pull_request.number);
        continue;
      }
      info!("found pull request #{}: '{}'", pull_request.number, pull_request.title);

      match overflow.parse_overflow(&pull_request).await? {
        Some(body) => pull_request.body = body.to_string(),
        None => {
          warn!("pull request #{} body is not a release body, skipping", pull_request.number);
          continue;
        }
      }

      let prerelease_label = pull_request.has_all_labels(&self.options.prerelease_labels);
      for (path, strategy) in &strategies {
        let config = strategy.config();
        for release in strategy.build_releases(&pull_request, Some(group_title_pattern)).await? {
          let version = &release.tag.version;
          let prerelease =
            prerelease_label || (config.prerelease && (!version.pre.is_empty() || version.major == 0));
          candidates.push(CandidateRelease {
            release,
            path: path.clone(),
            pull_request: pull_request.clone(),
            draft: config.draft || self.options.draft,
            prerelease,
          });
        }
      }
    }
    info!("built {} releases", candidates.len());
    Ok(candidates)
  }

  /// Create host releases, then move each pull request from pending to tagged.
  ///
  /// Tags that already exist are skipped. When every release of one pull request already
  /// exists, its labels are still moved and the duplicate error is returned.
  pub async fn create_releases(&self) -> ReleaseResult<Vec<CreatedRelease>> {
    let mut by_pull_request: BTreeMap<u64, (PullRequest, Vec<CandidateRelease>)> = BTreeMap::new();
    for candidate in self.build_releases().await? {
      by_pull_request
        .entry(candidate.pull_request.number)
        .or_insert_with(|| (candidate.pull_request.clone(), Vec::new()))
        .1
        .push(candidate);
    }

    let jobs: Vec<_> = by_pull_request
      .values()
      .map(|(pull_request, releases)| self.create_releases_for_pull_request(pull_request, releases))
      .collect();
    let created = collect_results(self.run_all(jobs).await)?;
    Ok(created.into_iter().flatten().collect())
  }

  async fn create_releases_for_pull_request(
    &self,
    pull_request: &PullRequest,
    releases: &[CandidateRelease],
  ) -> ReleaseResult<Vec<CreatedRelease>> {
    let mut created = Vec::new();
    let mut duplicates: Vec<ReleaseError> = Vec::new();
    for release in releases {
      match self.create_release(release).await {
        Ok(host_release) => created.push(host_release),
        Err(err) if err.is_duplicate_release() => {
          warn!("{}, skipping", err);
          duplicates.push(err);
        }
        Err(err) => return Err(err),
      }
    }

    if !self.options.skip_labeling {
      let single_prerelease = releases.len() == 1 && releases[0].prerelease;
      let tagged = if single_prerelease {
        union_labels([
          self.options.release_labels.as_slice(),
          self.options.prerelease_labels.as_slice(),
        ])
      } else {
        self.options.release_labels.clone()
      };
      self
        .host
        .remove_issue_labels(&self.options.labels, pull_request.number)
        .await?;
      self.host.add_issue_labels(&tagged, pull_request.number).await?;
    }

    if created.is_empty()
      && let Some(first) = duplicates.into_iter().next()
    {
      return Err(first);
    }
    Ok(created)
  }

  async fn create_release(&self, candidate: &CandidateRelease) -> ReleaseResult<CreatedRelease> {
    let release = &candidate.release;
    let payload = ReleasePayload {
      name: release.name.clone(),
      tag_name: release.tag.to_string(),
      sha: release.sha.clone(),
      notes: release.notes.clone(),
      draft: candidate.draft,
      prerelease: candidate.prerelease,
    };
    let host_release = self.host.create_release(&payload).await?;
    info!("created release {} for {}", host_release.tag_name, candidate.path);

    let comment = format!(":robot: Release is at {} :sunflower:", host_release.url);
    self
      .host
      .comment_on_issue(&comment, candidate.pull_request.number)
      .await?;

    Ok(CreatedRelease {
      id: host_release.id,
      tag_name: host_release.tag_name,
      sha: host_release.sha,
      notes: host_release.notes.unwrap_or_default(),
      url: host_release.url,
      draft: host_release.draft,
    })
  }
}
