//! VCS host interface
//!
//! The orchestrator never talks HTTP. Everything it needs from the hosted repository
//! goes through [`VcsHost`]:
//! - paged listings (commits, pull requests, releases, tags) as lazy newest-first streams
//! - file reads at a branch and file-set writes onto a pull request branch
//! - pull request, release, label and comment mutations
//!
//! Two implementations ship with the crate: [`memory::InMemoryHost`] (fully functional,
//! used by tests and embedders) and [`local::LocalGitHost`] (read-only, over a checkout).

pub mod local;
pub mod memory;
pub mod paginate;

use crate::core::error::ReleaseResult;
use crate::release::commit::Commit;
use crate::release::pull_request::{PullRequest, PullRequestState};
use crate::release::updater::Update;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use local::LocalGitHost;
pub use memory::InMemoryHost;
pub use paginate::{Page, RetryPolicy, paginate, with_retry};

/// Owner/name of the hosted repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
  pub owner: String,
  pub repo: String,
  pub default_branch: String,
}

impl Repository {
  pub fn new(owner: impl Into<String>, repo: impl Into<String>, default_branch: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      repo: repo.into(),
      default_branch: default_branch.into(),
    }
  }

  /// Browser URL of the repository
  pub fn html_url(&self) -> String {
    format!("https://github.com/{}/{}", self.owner, self.repo)
  }
}

/// A release object on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRelease {
  pub id: u64,
  pub name: Option<String>,
  pub tag_name: String,
  pub sha: String,
  pub notes: Option<String>,
  pub url: String,
  pub draft: bool,
  pub prerelease: bool,
}

/// A raw tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTag {
  pub name: String,
  pub sha: String,
}

/// Content of a pull request to open or update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestPayload {
  pub title: String,
  pub body: String,
  pub head_branch_name: String,
  pub labels: Vec<String>,
  pub draft: bool,
  /// File updates committed onto the head branch, based on the target branch
  pub updates: Vec<Update>,
}

/// A release to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePayload {
  pub name: Option<String>,
  pub tag_name: String,
  pub sha: String,
  pub notes: String,
  pub draft: bool,
  pub prerelease: bool,
}

/// Hosted VCS operations used by the orchestrator
#[async_trait]
pub trait VcsHost: Send + Sync {
  fn repository(&self) -> &Repository;

  /// First-parent commits of `branch`, newest first
  fn commits<'a>(&'a self, branch: &'a str, max_results: Option<usize>) -> BoxStream<'a, ReleaseResult<Commit>>;

  /// Pull requests targeting `branch` in `state`, most recently updated first
  fn pull_requests<'a>(
    &'a self,
    branch: &'a str,
    state: PullRequestState,
    max_results: Option<usize>,
  ) -> BoxStream<'a, ReleaseResult<PullRequest>>;

  /// Releases, newest first
  fn releases(&self, max_results: Option<usize>) -> BoxStream<'_, ReleaseResult<HostRelease>>;

  /// Tags, newest first
  fn tags(&self, max_results: Option<usize>) -> BoxStream<'_, ReleaseResult<HostTag>>;

  /// File content at the tip of `branch`. Missing files are `HostError::FileNotFound`.
  async fn get_file(&self, path: &str, branch: &str) -> ReleaseResult<String>;

  /// Paths of files named `filename` on `branch`, optionally under `prefix`
  async fn find_files_by_filename(&self, filename: &str, branch: &str, prefix: Option<&str>)
  -> ReleaseResult<Vec<String>>;

  /// Force-write one file onto `branch`, recreating it from the tip of `base_branch`.
  /// Returns the blob URL of the written file.
  async fn create_file_on_new_branch(&self, path: &str, content: &str, branch: &str, base_branch: &str)
  -> ReleaseResult<String>;

  async fn create_pull_request(&self, payload: &PullRequestPayload, target_branch: &str, message: &str)
  -> ReleaseResult<PullRequest>;

  async fn update_pull_request(
    &self,
    number: u64,
    payload: &PullRequestPayload,
    target_branch: &str,
    message: &str,
  ) -> ReleaseResult<PullRequest>;

  /// Fails with `HostError::DuplicateRelease` when the tag already exists
  async fn create_release(&self, release: &ReleasePayload) -> ReleaseResult<HostRelease>;

  async fn add_issue_labels(&self, labels: &[String], number: u64) -> ReleaseResult<()>;

  async fn remove_issue_labels(&self, labels: &[String], number: u64) -> ReleaseResult<()>;

  /// Returns the comment URL
  async fn comment_on_issue(&self, comment: &str, number: u64) -> ReleaseResult<String>;

  /// Ensure labels exist on the repository
  async fn create_labels(&self, labels: &[String]) -> ReleaseResult<()>;
}

/// Read a file, mapping "not found" to `None`
pub async fn get_optional_file(host: &dyn VcsHost, path: &str, branch: &str) -> ReleaseResult<Option<String>> {
  match host.get_file(path, branch).await {
    Ok(content) => Ok(Some(content)),
    Err(err) if err.is_file_not_found() => Ok(None),
    Err(err) => Err(err),
  }
}
