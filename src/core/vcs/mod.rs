//! Local repository access through the system `git` binary

pub mod system_git;

pub use system_git::SystemGit;

/// A commit with the files it changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
  pub sha: String,
  pub message: String,
  pub files: Vec<String>,
}

/// A tag and the commit it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
  pub name: String,
  pub sha: String,
}
