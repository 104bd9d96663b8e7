//! In-process host
//!
//! Keeps commits, files per branch, pull requests, releases, tags, labels and comments
//! in memory and behaves like a hosted repository: pull request updates are committed
//! onto head branches, merges land on the base branch, duplicate tags are rejected.
//! Listing page fetches can be made to fail to exercise retry handling.

use super::paginate::{Page, RetryPolicy, paginate};
use super::{HostRelease, HostTag, PullRequestPayload, ReleasePayload, Repository, VcsHost};
use crate::core::error::{HostError, ReleaseError, ReleaseResult};
use crate::release::commit::Commit;
use crate::release::pull_request::{PullRequest, PullRequestState};
use crate::release::updater::Update;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Default)]
struct State {
  /// Newest first per branch
  commits: BTreeMap<String, Vec<Commit>>,
  /// branch -> path -> content
  files: BTreeMap<String, BTreeMap<String, String>>,
  pull_requests: Vec<PullRequest>,
  /// Newest first
  releases: Vec<HostRelease>,
  /// Newest first
  tags: Vec<HostTag>,
  comments: Vec<(u64, String)>,
  labels: Vec<String>,
  next_number: u64,
  next_release_id: u64,
  page_failures: VecDeque<u16>,
  failing_branches: Vec<String>,
}

/// A fully functional host kept in memory
#[derive(Debug)]
pub struct InMemoryHost {
  repository: Repository,
  state: Mutex<State>,
  page_size: usize,
  retry: RetryPolicy,
}

impl InMemoryHost {
  pub fn new(owner: &str, repo: &str, default_branch: &str) -> Self {
    Self {
      repository: Repository::new(owner, repo, default_branch),
      state: Mutex::new(State {
        next_number: 1,
        next_release_id: 1,
        ..Default::default()
      }),
      page_size: DEFAULT_PAGE_SIZE,
      retry: RetryPolicy::immediate(),
    }
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Add a commit on top of `branch`
  pub fn add_commit(&self, branch: &str, commit: Commit) {
    self.state().commits.entry(branch.to_string()).or_default().insert(0, commit);
  }

  pub fn set_file(&self, branch: &str, path: &str, content: &str) {
    self
      .state()
      .files
      .entry(branch.to_string())
      .or_default()
      .insert(path.to_string(), content.to_string());
  }

  pub fn file(&self, branch: &str, path: &str) -> Option<String> {
    self.state().files.get(branch).and_then(|f| f.get(path)).cloned()
  }

  /// Register an existing pull request. A zero `number` is replaced with the next free one.
  pub fn add_pull_request(&self, mut pull_request: PullRequest) -> u64 {
    let mut state = self.state();
    if pull_request.number == 0 {
      pull_request.number = state.next_number;
    }
    state.next_number = state.next_number.max(pull_request.number + 1);
    let number = pull_request.number;
    state.pull_requests.push(pull_request);
    number
  }

  pub fn pull_request(&self, number: u64) -> Option<PullRequest> {
    self.state().pull_requests.iter().find(|p| p.number == number).cloned()
  }

  pub fn pull_requests_snapshot(&self) -> Vec<PullRequest> {
    self.state().pull_requests.clone()
  }

  /// Register an existing release and its tag
  pub fn add_release(&self, tag_name: &str, sha: &str, notes: Option<&str>) {
    let mut state = self.state();
    let id = state.next_release_id;
    state.next_release_id += 1;
    let url = format!("{}/releases/tag/{}", self.repository.html_url(), tag_name);
    state.releases.insert(
      0,
      HostRelease {
        id,
        name: Some(tag_name.to_string()),
        tag_name: tag_name.to_string(),
        sha: sha.to_string(),
        notes: notes.map(str::to_string),
        url,
        draft: false,
        prerelease: false,
      },
    );
    state.tags.insert(
      0,
      HostTag {
        name: tag_name.to_string(),
        sha: sha.to_string(),
      },
    );
  }

  /// Register a bare tag with no release object
  pub fn add_tag(&self, name: &str, sha: &str) {
    self.state().tags.insert(
      0,
      HostTag {
        name: name.to_string(),
        sha: sha.to_string(),
      },
    );
  }

  pub fn releases_snapshot(&self) -> Vec<HostRelease> {
    self.state().releases.clone()
  }

  pub fn comments(&self) -> Vec<(u64, String)> {
    self.state().comments.clone()
  }

  pub fn created_labels(&self) -> Vec<String> {
    self.state().labels.clone()
  }

  /// Make the next `count` listing page fetches fail with `status`
  pub fn fail_next_pages(&self, count: usize, status: u16) {
    let mut state = self.state();
    for _ in 0..count {
      state.page_failures.push_back(status);
    }
  }

  /// Reject file writes to `branch`
  pub fn fail_writes_to(&self, branch: &str) {
    self.state().failing_branches.push(branch.to_string());
  }

  /// Merge an open pull request: its head branch files land on the base branch together
  /// with a merge commit `sha` that links back to the pull request.
  pub fn merge_pull_request(&self, number: u64, sha: &str) -> ReleaseResult<()> {
    let mut state = self.state();
    let index = state
      .pull_requests
      .iter()
      .position(|p| p.number == number)
      .ok_or_else(|| not_found(format!("pull request #{}", number)))?;
    let pull_request = state.pull_requests[index].clone();
    let head_files = state.files.get(&pull_request.head_branch_name).cloned().unwrap_or_default();
    let base_files = state.files.entry(pull_request.base_branch_name.clone()).or_default();
    let mut changed = Vec::new();
    for (path, content) in head_files {
      if base_files.get(&path) != Some(&content) {
        changed.push(path.clone());
        base_files.insert(path, content);
      }
    }

    let merged = &mut state.pull_requests[index];
    merged.state = PullRequestState::Merged;
    merged.merge_commit_sha = Some(sha.to_string());
    let linked = merged.clone();

    let commit = Commit {
      sha: sha.to_string(),
      message: format!("{} (#{})", linked.title, linked.number),
      files: changed,
      pull_request: Some(linked.clone()),
    };
    state
      .commits
      .entry(linked.base_branch_name.clone())
      .or_default()
      .insert(0, commit);
    Ok(())
  }

  /// Close a pull request, optionally adding labels (e.g. snooze)
  pub fn close_pull_request(&self, number: u64, labels: &[&str]) {
    let mut state = self.state();
    if let Some(pr) = state.pull_requests.iter_mut().find(|p| p.number == number) {
      pr.state = PullRequestState::Closed;
      for label in labels {
        if !pr.has_label(label) {
          pr.labels.push(label.to_string());
        }
      }
    }
  }

  fn page<T: Clone>(&self, items: &[T], cursor: Option<String>) -> ReleaseResult<Page<T>> {
    if let Some(status) = self.state().page_failures.pop_front() {
      return Err(ReleaseError::Host(HostError::Api {
        status,
        message: "injected page failure".to_string(),
      }));
    }
    let start: usize = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
    let end = (start + self.page_size).min(items.len());
    Ok(Page {
      items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
      next_cursor: (end < items.len()).then(|| end.to_string()),
    })
  }

  /// Files of `target_branch` with `updates` applied
  fn apply_updates(&self, target_branch: &str, updates: &[Update]) -> ReleaseResult<BTreeMap<String, String>> {
    let mut files = self.state().files.get(target_branch).cloned().unwrap_or_default();
    for update in updates {
      let existing = files.get(&update.path).map(String::as_str);
      if existing.is_none() && !update.create_if_missing {
        debug!("file {} does not exist, skipping update", update.path);
        continue;
      }
      let content = update.updater.update_content(existing)?;
      files.insert(update.path.clone(), content);
    }
    Ok(files)
  }
}

fn not_found(what: String) -> ReleaseError {
  ReleaseError::Host(HostError::Api {
    status: 404,
    message: format!("{} not found", what),
  })
}

#[async_trait]
impl VcsHost for InMemoryHost {
  fn repository(&self) -> &Repository {
    &self.repository
  }

  fn commits<'a>(&'a self, branch: &'a str, max_results: Option<usize>) -> BoxStream<'a, ReleaseResult<Commit>> {
    paginate(self.retry, max_results, move |cursor| async move {
      let commits = self.state().commits.get(branch).cloned().unwrap_or_default();
      self.page(&commits, cursor)
    })
  }

  fn pull_requests<'a>(
    &'a self,
    branch: &'a str,
    state: PullRequestState,
    max_results: Option<usize>,
  ) -> BoxStream<'a, ReleaseResult<PullRequest>> {
    paginate(self.retry, max_results, move |cursor| async move {
      let mut matching: Vec<PullRequest> = self
        .state()
        .pull_requests
        .iter()
        .filter(|p| p.base_branch_name == branch && p.state == state)
        .cloned()
        .collect();
      matching.sort_by(|a, b| b.number.cmp(&a.number));
      self.page(&matching, cursor)
    })
  }

  fn releases(&self, max_results: Option<usize>) -> BoxStream<'_, ReleaseResult<HostRelease>> {
    paginate(self.retry, max_results, move |cursor| async move {
      let releases = self.state().releases.clone();
      self.page(&releases, cursor)
    })
  }

  fn tags(&self, max_results: Option<usize>) -> BoxStream<'_, ReleaseResult<HostTag>> {
    paginate(self.retry, max_results, move |cursor| async move {
      let tags = self.state().tags.clone();
      self.page(&tags, cursor)
    })
  }

  async fn get_file(&self, path: &str, branch: &str) -> ReleaseResult<String> {
    self
      .file(branch, path.trim_start_matches("./"))
      .ok_or_else(|| ReleaseError::Host(HostError::FileNotFound { path: path.to_string() }))
  }

  async fn find_files_by_filename(
    &self,
    filename: &str,
    branch: &str,
    prefix: Option<&str>,
  ) -> ReleaseResult<Vec<String>> {
    let prefix = prefix.map(|p| format!("{}/", p.trim_end_matches('/')));
    let state = self.state();
    let Some(files) = state.files.get(branch) else {
      return Ok(Vec::new());
    };
    Ok(
      files
        .keys()
        .filter(|path| path.rsplit('/').next() == Some(filename))
        .filter(|path| prefix.as_ref().is_none_or(|p| path.starts_with(p.as_str())))
        .cloned()
        .collect(),
    )
  }

  async fn create_file_on_new_branch(
    &self,
    path: &str,
    content: &str,
    branch: &str,
    base_branch: &str,
  ) -> ReleaseResult<String> {
    let mut state = self.state();
    if state.failing_branches.iter().any(|b| b == branch) {
      return Err(ReleaseError::Host(HostError::Api {
        status: 422,
        message: format!("Reference update failed for {}", branch),
      }));
    }
    let base_exists = base_branch == self.repository.default_branch
      || state.files.contains_key(base_branch)
      || state.commits.contains_key(base_branch);
    if !base_exists {
      return Err(not_found(format!("base branch {}", base_branch)));
    }
    let mut files = state.files.get(base_branch).cloned().unwrap_or_default();
    files.insert(path.to_string(), content.to_string());
    state.files.insert(branch.to_string(), files);
    Ok(format!("{}/blob/{}/{}", self.repository.html_url(), branch, path))
  }

  async fn create_pull_request(
    &self,
    payload: &PullRequestPayload,
    target_branch: &str,
    _message: &str,
  ) -> ReleaseResult<PullRequest> {
    let files = self.apply_updates(target_branch, &payload.updates)?;
    let mut state = self.state();
    if state
      .pull_requests
      .iter()
      .any(|p| p.head_branch_name == payload.head_branch_name && p.state == PullRequestState::Open)
    {
      return Err(ReleaseError::Host(HostError::Api {
        status: 422,
        message: format!("A pull request already exists for {}", payload.head_branch_name),
      }));
    }
    state.files.insert(payload.head_branch_name.clone(), files);
    let number = state.next_number;
    state.next_number += 1;
    let pull_request = PullRequest {
      number,
      title: payload.title.clone(),
      body: payload.body.clone(),
      head_branch_name: payload.head_branch_name.clone(),
      base_branch_name: target_branch.to_string(),
      labels: payload.labels.clone(),
      merge_commit_sha: None,
      state: PullRequestState::Open,
      draft: payload.draft,
    };
    state.pull_requests.push(pull_request.clone());
    Ok(pull_request)
  }

  async fn update_pull_request(
    &self,
    number: u64,
    payload: &PullRequestPayload,
    target_branch: &str,
    _message: &str,
  ) -> ReleaseResult<PullRequest> {
    let files = self.apply_updates(target_branch, &payload.updates)?;
    let mut state = self.state();
    state.files.insert(payload.head_branch_name.clone(), files);
    let pull_request = state
      .pull_requests
      .iter_mut()
      .find(|p| p.number == number)
      .ok_or_else(|| not_found(format!("pull request #{}", number)))?;
    pull_request.title = payload.title.clone();
    pull_request.body = payload.body.clone();
    pull_request.state = PullRequestState::Open;
    Ok(pull_request.clone())
  }

  async fn create_release(&self, release: &ReleasePayload) -> ReleaseResult<HostRelease> {
    let mut state = self.state();
    if state.tags.iter().any(|t| t.name == release.tag_name) {
      return Err(ReleaseError::Host(HostError::DuplicateRelease {
        tag: release.tag_name.clone(),
      }));
    }
    let id = state.next_release_id;
    state.next_release_id += 1;
    let created = HostRelease {
      id,
      name: release.name.clone(),
      tag_name: release.tag_name.clone(),
      sha: release.sha.clone(),
      notes: Some(release.notes.clone()),
      url: format!("{}/releases/tag/{}", self.repository.html_url(), release.tag_name),
      draft: release.draft,
      prerelease: release.prerelease,
    };
    state.releases.insert(0, created.clone());
    state.tags.insert(
      0,
      HostTag {
        name: release.tag_name.clone(),
        sha: release.sha.clone(),
      },
    );
    Ok(created)
  }

  async fn add_issue_labels(&self, labels: &[String], number: u64) -> ReleaseResult<()> {
    let mut state = self.state();
    let pull_request = state
      .pull_requests
      .iter_mut()
      .find(|p| p.number == number)
      .ok_or_else(|| not_found(format!("issue #{}", number)))?;
    for label in labels {
      if !pull_request.has_label(label) {
        pull_request.labels.push(label.clone());
      }
    }
    Ok(())
  }

  async fn remove_issue_labels(&self, labels: &[String], number: u64) -> ReleaseResult<()> {
    let mut state = self.state();
    let pull_request = state
      .pull_requests
      .iter_mut()
      .find(|p| p.number == number)
      .ok_or_else(|| not_found(format!("issue #{}", number)))?;
    pull_request.labels.retain(|l| !labels.contains(l));
    Ok(())
  }

  async fn comment_on_issue(&self, comment: &str, number: u64) -> ReleaseResult<String> {
    let mut state = self.state();
    state.comments.push((number, comment.to_string()));
    Ok(format!(
      "{}/issues/{}#issuecomment-{}",
      self.repository.html_url(),
      number,
      state.comments.len()
    ))
  }

  async fn create_labels(&self, labels: &[String]) -> ReleaseResult<()> {
    let mut state = self.state();
    for label in labels {
      if !state.labels.contains(label) {
        state.labels.push(label.clone());
      }
    }
    Ok(())
  }
}
