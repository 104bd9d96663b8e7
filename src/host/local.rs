//! Read-only host over a local checkout
//!
//! Commits, tags and file contents come from the `git` binary. There are no pull
//! requests or release objects locally, so those listings are empty and every write
//! fails with an explanation.

use super::{HostRelease, HostTag, PullRequestPayload, ReleasePayload, Repository, VcsHost};
use crate::core::error::{HostError, ReleaseError, ReleaseResult};
use crate::core::vcs::SystemGit;
use crate::core::vcs::system_git::parse_remote_slug;
use crate::release::commit::Commit;
use crate::release::pull_request::{PullRequest, PullRequestState};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::Path;
use tracing::debug;

/// Host backed by a local git repository
pub struct LocalGitHost {
  git: SystemGit,
  repository: Repository,
}

impl LocalGitHost {
  /// Open the checkout at `path`. Owner and name come from the `origin` remote when it
  /// points at a hosted repository, otherwise from the directory name.
  pub fn open(path: &Path, default_branch: Option<&str>) -> ReleaseResult<Self> {
    let git = SystemGit::open(path)?;
    let branch = match default_branch {
      Some(branch) => branch.to_string(),
      None => git.current_branch()?,
    };
    let (owner, repo) = git
      .remote_url("origin")?
      .as_deref()
      .and_then(parse_remote_slug)
      .unwrap_or_else(|| {
        let name = git
          .work_tree()
          .file_name()
          .map(|n| n.to_string_lossy().to_string())
          .unwrap_or_else(|| "repository".to_string());
        ("local".to_string(), name)
      });
    debug!("opened local host {}/{} on {}", owner, repo, branch);
    Ok(Self {
      git,
      repository: Repository::new(owner, repo, branch),
    })
  }

  pub fn git(&self) -> &SystemGit {
    &self.git
  }

  fn read_only(operation: &str) -> ReleaseError {
    ReleaseError::with_help(
      format!("Cannot {}: the local git host is read-only", operation),
      "Local checkouts support planning only (`release-rail plan`, `versions`).",
    )
  }
}

#[async_trait]
impl VcsHost for LocalGitHost {
  fn repository(&self) -> &Repository {
    &self.repository
  }

  fn commits<'a>(&'a self, branch: &'a str, max_results: Option<usize>) -> BoxStream<'a, ReleaseResult<Commit>> {
    match self.git.get_commits(branch, max_results) {
      Ok(infos) => stream::iter(
        infos
          .into_iter()
          .map(|info| Ok(Commit::new(info.sha, info.message).with_files(info.files))),
      )
      .boxed(),
      Err(err) => stream::iter([Err(err)]).boxed(),
    }
  }

  fn pull_requests<'a>(
    &'a self,
    _branch: &'a str,
    _state: PullRequestState,
    _max_results: Option<usize>,
  ) -> BoxStream<'a, ReleaseResult<PullRequest>> {
    stream::empty().boxed()
  }

  fn releases(&self, _max_results: Option<usize>) -> BoxStream<'_, ReleaseResult<HostRelease>> {
    stream::empty().boxed()
  }

  fn tags(&self, max_results: Option<usize>) -> BoxStream<'_, ReleaseResult<HostTag>> {
    match self.git.list_tags() {
      Ok(tags) => stream::iter(
        tags
          .into_iter()
          .take(max_results.unwrap_or(usize::MAX))
          .map(|t| Ok(HostTag { name: t.name, sha: t.sha })),
      )
      .boxed(),
      Err(err) => stream::iter([Err(err)]).boxed(),
    }
  }

  async fn get_file(&self, path: &str, branch: &str) -> ReleaseResult<String> {
    self
      .git
      .read_file_at(branch, path)?
      .ok_or_else(|| ReleaseError::Host(HostError::FileNotFound { path: path.to_string() }))
  }

  async fn find_files_by_filename(
    &self,
    filename: &str,
    branch: &str,
    prefix: Option<&str>,
  ) -> ReleaseResult<Vec<String>> {
    let prefix = prefix.map(|p| format!("{}/", p.trim_end_matches('/')));
    Ok(
      self
        .git
        .list_files(branch)?
        .into_iter()
        .filter(|path| path.rsplit('/').next() == Some(filename))
        .filter(|path| prefix.as_ref().is_none_or(|p| path.starts_with(p.as_str())))
        .collect(),
    )
  }

  async fn create_file_on_new_branch(
    &self,
    _path: &str,
    _content: &str,
    branch: &str,
    _base_branch: &str,
  ) -> ReleaseResult<String> {
    Err(Self::read_only(&format!("write to branch {}", branch)))
  }

  async fn create_pull_request(
    &self,
    payload: &PullRequestPayload,
    _target_branch: &str,
    _message: &str,
  ) -> ReleaseResult<PullRequest> {
    Err(Self::read_only(&format!("open pull request {}", payload.head_branch_name)))
  }

  async fn update_pull_request(
    &self,
    number: u64,
    _payload: &PullRequestPayload,
    _target_branch: &str,
    _message: &str,
  ) -> ReleaseResult<PullRequest> {
    Err(Self::read_only(&format!("update pull request #{}", number)))
  }

  async fn create_release(&self, release: &ReleasePayload) -> ReleaseResult<HostRelease> {
    Err(Self::read_only(&format!("create release {}", release.tag_name)))
  }

  async fn add_issue_labels(&self, _labels: &[String], number: u64) -> ReleaseResult<()> {
    Err(Self::read_only(&format!("label #{}", number)))
  }

  async fn remove_issue_labels(&self, _labels: &[String], number: u64) -> ReleaseResult<()> {
    Err(Self::read_only(&format!("label #{}", number)))
  }

  async fn comment_on_issue(&self, _comment: &str, number: u64) -> ReleaseResult<String> {
    Err(Self::read_only(&format!("comment on #{}", number)))
  }

  async fn create_labels(&self, _labels: &[String]) -> ReleaseResult<()> {
    Err(Self::read_only("create labels"))
  }
}
