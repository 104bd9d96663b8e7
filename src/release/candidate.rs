//! Candidate release pull requests and releases
//!
//! A candidate is built fresh per orchestration run and only changed by pipeline stages.

use crate::core::config::ReleaserConfig;
use crate::release::body::PullRequestBody;
use crate::release::pull_request::PullRequest;
use crate::release::tag::TagName;
use crate::release::title::PullRequestTitle;
use crate::release::updater::Update;
use semver::Version;
use std::collections::BTreeSet;

/// Everything needed to open or update one release pull request
#[derive(Debug, Clone)]
pub struct ReleasePullRequest {
  pub title: PullRequestTitle,
  pub body: PullRequestBody,
  /// Insertion order is kept for display but ignored by equality
  pub labels: Vec<String>,
  pub head_ref_name: String,
  pub version: Option<Version>,
  pub draft: bool,
  /// Release group used by group-priority
  pub group: Option<String>,
  pub updates: Vec<Update>,
}

impl ReleasePullRequest {
  fn label_set(&self) -> BTreeSet<&str> {
    self.labels.iter().map(String::as_str).collect()
  }
}

impl PartialEq for ReleasePullRequest {
  fn eq(&self, other: &Self) -> bool {
    self.title == other.title
      && self.body == other.body
      && self.label_set() == other.label_set()
      && self.head_ref_name == other.head_ref_name
      && self.version == other.version
      && self.draft == other.draft
      && self.group == other.group
      && self.updates == other.updates
  }
}

impl Eq for ReleasePullRequest {}

/// A release pull request proposal for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReleasePullRequest {
  pub path: String,
  pub pull_request: ReleasePullRequest,
  pub config: ReleaserConfig,
}

impl CandidateReleasePullRequest {
  pub fn new(path: impl Into<String>, pull_request: ReleasePullRequest, config: ReleaserConfig) -> Self {
    Self {
      path: path.into(),
      pull_request,
      config,
    }
  }

  pub fn version(&self) -> Option<&Version> {
    self.pull_request.version.as_ref()
  }
}

/// A host release to create once a release pull request is merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
  pub name: Option<String>,
  pub tag: TagName,
  pub sha: String,
  pub notes: String,
}

/// A release paired with the path and config it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRelease {
  pub release: Release,
  pub path: String,
  pub pull_request: PullRequest,
  pub draft: bool,
  pub prerelease: bool,
}

/// A release as it exists on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRelease {
  pub id: u64,
  pub tag_name: String,
  pub sha: String,
  pub notes: String,
  pub url: String,
  pub draft: bool,
}
