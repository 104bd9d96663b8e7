//! Oversized pull request bodies
//!
//! Hosts cap issue bodies at 64 KiB. A larger release body is written to
//! `release-notes.md` on a side branch named `{head}--release-notes`, and the visible
//! body becomes a link to it. Reading reverses this, so no-op detection always compares
//! full bodies.

use crate::core::error::ReleaseResult;
use crate::host::{VcsHost, get_optional_file};
use crate::release::body::PullRequestBody;
use crate::release::candidate::ReleasePullRequest;
use crate::release::pull_request::PullRequest;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

pub const MAX_ISSUE_BODY_SIZE: usize = 65536;
pub const RELEASE_NOTES_FILENAME: &str = "release-notes.md";
const OVERFLOW_MESSAGE: &str =
  "This release is too large to preview in the pull request body. View the full release notes here:";

static OVERFLOW_MESSAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!("{} (?P<url>.*)", regex::escape(OVERFLOW_MESSAGE))).expect("static regex")
});
static FILE_PATH_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"blob/(?P<branchName>.*)/release-notes\.md").expect("static regex"));

/// Side branch holding the full notes for `head_branch`
pub fn notes_branch_name(head_branch: &str) -> String {
  format!("{}--release-notes", head_branch)
}

/// Stores and recovers release bodies that do not fit in a pull request
pub struct OverflowHandler<'a> {
  host: &'a dyn VcsHost,
  max_size: usize,
}

impl<'a> OverflowHandler<'a> {
  pub fn new(host: &'a dyn VcsHost) -> Self {
    Self {
      host,
      max_size: MAX_ISSUE_BODY_SIZE,
    }
  }

  pub fn with_max_size(mut self, max_size: usize) -> Self {
    self.max_size = max_size;
    self
  }

  /// Body to send to the host for `pull_request`. Bodies over the size limit are
  /// force-written to the side branch, created from `base_branch`, and replaced by a
  /// link. A failed write is returned to the caller.
  ///
  /// `base_branch` must already exist on the host: the target branch for a new pull
  /// request, the head branch for one that is already open.
  pub async fn handle_overflow(
    &self,
    pull_request: &ReleasePullRequest,
    base_branch: &str,
  ) -> ReleaseResult<String> {
    let notes = pull_request.body.to_string();
    if notes.len() <= self.max_size {
      return Ok(notes);
    }

    let branch = notes_branch_name(&pull_request.head_ref_name);
    info!(
      "pull request body is {} bytes (limit {}), writing it to {} from {}",
      notes.len(),
      self.max_size,
      branch,
      base_branch
    );
    let url = self
      .host
      .create_file_on_new_branch(RELEASE_NOTES_FILENAME, &notes, &branch, base_branch)
      .await?;
    Ok(format!("{} {}", OVERFLOW_MESSAGE, url))
  }

  /// Full body of an existing pull request, following an overflow link when present.
  /// `None` when the body is not a release body.
  pub async fn parse_overflow(&self, pull_request: &PullRequest) -> ReleaseResult<Option<PullRequestBody>> {
    let Some(caps) = OVERFLOW_MESSAGE_PATTERN.captures(&pull_request.body) else {
      return Ok(PullRequestBody::parse(&pull_request.body));
    };
    let url = caps["url"].trim();
    info!("pull request body overflows, parsing full body from {}", url);

    if let Some(path_caps) = FILE_PATH_PATTERN.captures(url) {
      let branch = &path_caps["branchName"];
      if let Some(content) = get_optional_file(self.host, RELEASE_NOTES_FILENAME, branch).await? {
        return Ok(PullRequestBody::parse(&content));
      }
    }
    warn!("could not read overflowed release notes from {}", url);
    Ok(PullRequestBody::parse(&pull_request.body))
  }
}
