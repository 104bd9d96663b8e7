//! Pull request records as seen on the host

use serde::{Deserialize, Serialize};

/// Lifecycle state used when listing pull requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
  Open,
  Closed,
  Merged,
}

/// A pull request on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
  pub number: u64,
  pub title: String,
  pub body: String,
  pub head_branch_name: String,
  pub base_branch_name: String,
  #[serde(default)]
  pub labels: Vec<String>,
  /// Merge commit SHA, set once merged
  #[serde(default)]
  pub merge_commit_sha: Option<String>,
  pub state: PullRequestState,
  #[serde(default)]
  pub draft: bool,
}

impl PullRequest {
  pub fn has_label(&self, label: &str) -> bool {
    self.labels.iter().any(|l| l == label)
  }

  /// True when every label in `labels` is present
  pub fn has_all_labels(&self, labels: &[String]) -> bool {
    !labels.is_empty() && labels.iter().all(|l| self.has_label(l))
  }
}
