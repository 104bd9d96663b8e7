//! Commits and conventional-commit parsing
//!
//! Raw commits come from the host newest-first. Parsing expands each raw commit into
//! zero or more [`ConventionalCommit`]s:
//! - a `BEGIN_COMMIT_OVERRIDE` / `END_COMMIT_OVERRIDE` block in the originating pull
//!   request body replaces the commit message entirely
//! - `BEGIN_NESTED_COMMIT` / `END_NESTED_COMMIT` blocks carry extra commits
//! - footers `BREAKING CHANGE:` and `Release-As:` become notes
//!
//! Messages that are not conventional are dropped (logged at debug).

use crate::release::pull_request::PullRequest;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

/// Start of a commit-message override block in a pull request body
pub const BEGIN_COMMIT_OVERRIDE: &str = "BEGIN_COMMIT_OVERRIDE";
/// End of a commit-message override block in a pull request body
pub const END_COMMIT_OVERRIDE: &str = "END_COMMIT_OVERRIDE";

const BEGIN_NESTED_COMMIT: &str = "BEGIN_NESTED_COMMIT";
const END_NESTED_COMMIT: &str = "END_NESTED_COMMIT";

/// Note title for breaking changes
pub const BREAKING_CHANGE_NOTE: &str = "BREAKING CHANGE";
/// Note title for explicit release versions
pub const RELEASE_AS_NOTE: &str = "RELEASE AS";

static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?P<type>[\w-]+)(?:\((?P<scope>[^()\r\n]*)\))?(?P<breaking>!)?:[ \t]*(?P<subject>.+)$")
    .expect("static regex")
});

static BREAKING_FOOTER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^BREAKING[ -]CHANGE:[ \t]*(?P<text>.*)$").expect("static regex"));

static RELEASE_AS_FOOTER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)^release-as:[ \t]*(?P<text>\S+)").expect("static regex"));

/// A raw commit from the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
  pub sha: String,
  pub message: String,
  /// Changed file paths, relative to the repository root
  #[serde(default)]
  pub files: Vec<String>,
  /// Merged pull request this commit came from, when known
  #[serde(default)]
  pub pull_request: Option<PullRequest>,
}

impl Commit {
  pub fn new(sha: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      sha: sha.into(),
      message: message.into(),
      files: Vec::new(),
      pull_request: None,
    }
  }

  pub fn with_files<I, S>(mut self, files: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.files = files.into_iter().map(Into::into).collect();
    self
  }
}

/// Footer note attached to a conventional commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNote {
  pub title: String,
  pub text: String,
}

/// A parsed conventional commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConventionalCommit {
  pub sha: String,
  /// Full header line, e.g. `fix(parser): handle tabs`
  pub message: String,
  pub files: Vec<String>,
  pub pull_request: Option<PullRequest>,
  pub commit_type: String,
  pub scope: Option<String>,
  /// Subject without type and scope
  pub bare_message: String,
  pub notes: Vec<CommitNote>,
  pub breaking: bool,
}

/// Parse and expand raw commits. Output order follows input order.
pub fn parse_conventional_commits(commits: &[Commit]) -> Vec<ConventionalCommit> {
  let mut parsed = Vec::new();
  for commit in commits {
    for message in split_messages(&preprocess_message(commit)) {
      match parse_message(&message) {
        Some(mut conventional) => {
          conventional.sha = commit.sha.clone();
          conventional.files = commit.files.clone();
          conventional.pull_request = commit.pull_request.clone();
          parsed.push(conventional);
        }
        None => debug!(
          "commit could not be parsed: {} {}",
          commit.sha,
          message.lines().next().unwrap_or_default()
        ),
      }
    }
  }
  parsed
}

/// Override text from a pull request body, if the block is present and non-empty
pub fn commit_override(body: &str) -> Option<String> {
  let (_, rest) = body.split_once(BEGIN_COMMIT_OVERRIDE)?;
  let inner = rest.split(END_COMMIT_OVERRIDE).next().unwrap_or_default().trim();
  (!inner.is_empty()).then(|| inner.to_string())
}

fn preprocess_message(commit: &Commit) -> String {
  commit
    .pull_request
    .as_ref()
    .and_then(|pr| commit_override(&pr.body))
    .unwrap_or_else(|| commit.message.clone())
}

fn split_messages(message: &str) -> Vec<String> {
  let mut parts = message.split(BEGIN_NESTED_COMMIT);
  let mut primary = parts.next().unwrap_or_default().to_string();
  let mut nested = Vec::new();
  for part in parts {
    let mut pieces = part.splitn(2, END_NESTED_COMMIT);
    nested.push(pieces.next().unwrap_or_default().trim().to_string());
    if let Some(rest) = pieces.next() {
      primary.push_str(rest);
    }
  }
  let mut messages = vec![primary.trim().to_string()];
  messages.extend(nested);
  messages
}

fn parse_message(message: &str) -> Option<ConventionalCommit> {
  let mut lines = message.lines();
  let header = lines.next()?.trim();
  let caps = HEADER_PATTERN.captures(header)?;

  let subject = caps["subject"].trim().to_string();
  let mut notes = Vec::new();
  let mut breaking = caps.name("breaking").is_some();

  for line in lines {
    let line = line.trim();
    if let Some(footer) = BREAKING_FOOTER.captures(line) {
      breaking = true;
      notes.push(CommitNote {
        title: BREAKING_CHANGE_NOTE.to_string(),
        text: footer["text"].trim().to_string(),
      });
    } else if let Some(footer) = RELEASE_AS_FOOTER.captures(line) {
      notes.push(CommitNote {
        title: RELEASE_AS_NOTE.to_string(),
        text: footer["text"].to_string(),
      });
    }
  }

  if breaking && !notes.iter().any(|n| n.title == BREAKING_CHANGE_NOTE) {
    notes.push(CommitNote {
      title: BREAKING_CHANGE_NOTE.to_string(),
      text: subject.clone(),
    });
  }

  Some(ConventionalCommit {
    sha: String::new(),
    message: header.to_string(),
    files: Vec::new(),
    pull_request: None,
    commit_type: caps["type"].to_lowercase(),
    scope: caps.name("scope").map(|s| s.as_str().to_string()).filter(|s| !s.is_empty()),
    bare_message: subject,
    notes,
    breaking,
  })
}

/// Synthetic commits layered over real history, keyed by path.
///
/// Pipeline stages never mutate the commit map they were given; they return an overlay
/// and the orchestrator combines it with the real commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOverlay {
  by_path: BTreeMap<String, Vec<Commit>>,
}

impl CommitOverlay {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return a new overlay with `commit` added for `path`
  pub fn with_commit(mut self, path: impl Into<String>, commit: Commit) -> Self {
    self.by_path.entry(path.into()).or_default().push(commit);
    self
  }

  /// Combine two overlays, keeping `self`'s commits first
  pub fn merge(mut self, other: CommitOverlay) -> Self {
    for (path, commits) in other.by_path {
      self.by_path.entry(path).or_default().extend(commits);
    }
    self
  }

  pub fn commits_for(&self, path: &str) -> &[Commit] {
    self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn is_empty(&self) -> bool {
    self.by_path.is_empty()
  }

  /// Real commits for `path` with overlay commits placed first (newest)
  pub fn apply(&self, path: &str, commits: &[Commit]) -> Vec<Commit> {
    let mut combined = self.commits_for(path).to_vec();
    combined.extend_from_slice(commits);
    combined
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::pull_request::PullRequestState;

  #[test]
  fn test_parse_header_parts() {
    let parsed = parse_conventional_commits(&[Commit::new("abc", "feat(parser)!: support tabs")]);
    assert_eq!(parsed.len(), 1);
    let c = &parsed[0];
    assert_eq!(c.commit_type, "feat");
    assert_eq!(c.scope.as_deref(), Some("parser"));
    assert_eq!(c.bare_message, "support tabs");
    assert!(c.breaking);
    assert_eq!(c.sha, "abc");
  }

  #[test]
  fn test_non_conventional_dropped() {
    let parsed = parse_conventional_commits(&[Commit::new("a", "Merge branch main"), Commit::new("b", "fix: ok")]);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].sha, "b");
  }

  #[test]
  fn test_footers() {
    let parsed = parse_conventional_commits(&[Commit::new(
      "a",
      "chore: sync\n\nBREAKING CHANGE: api removed\nRelease-As: 2.0.0",
    )]);
    let c = &parsed[0];
    assert!(c.breaking);
    assert!(c.notes.iter().any(|n| n.title == RELEASE_AS_NOTE && n.text == "2.0.0"));
    assert!(c.notes.iter().any(|n| n.title == BREAKING_CHANGE_NOTE && n.text == "api removed"));
  }

  #[test]
  fn test_nested_commits_expand() {
    let message = "fix: outer\n\nBEGIN_NESTED_COMMIT\nfeat(a): inner\nEND_NESTED_COMMIT\n";
    let parsed = parse_conventional_commits(&[Commit::new("a", message)]);
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[1].commit_type, "feat");
    assert_eq!(parsed[1].sha, "a");
  }

  #[test]
  fn test_override_block_replaces_message() {
    let mut commit = Commit::new("a", "Some squash message");
    commit.pull_request = Some(PullRequest {
      number: 7,
      title: "t".to_string(),
      body: "intro\nBEGIN_COMMIT_OVERRIDE\nfix: real message\nEND_COMMIT_OVERRIDE\n".to_string(),
      head_branch_name: "feature".to_string(),
      base_branch_name: "main".to_string(),
      labels: vec![],
      merge_commit_sha: Some("a".to_string()),
      state: PullRequestState::Merged,
      draft: false,
    });
    let parsed = parse_conventional_commits(&[commit]);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].bare_message, "real message");
  }

  #[test]
  fn test_overlay_is_additive() {
    let overlay = CommitOverlay::new().with_commit("pkg", Commit::new("", "chore: sync"));
    let real = vec![Commit::new("r1", "fix: a")];
    let combined = overlay.apply("pkg", &real);
    assert_eq!(combined.len(), 2);
    assert_eq!(combined[0].message, "chore: sync");
    assert!(overlay.apply("other", &real).len() == 1);
  }
}
