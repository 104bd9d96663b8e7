//! System git backend
//!
//! Read-only plumbing over the `git` binary:
//! - first-parent history of a branch, newest first
//! - per-commit message and changed files (looked up in parallel)
//! - tags with the commit they point at
//! - file contents at a branch tip

use super::{CommitInfo, TagInfo};
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git backend using system git
pub struct SystemGit {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,

  /// Working tree root
  pub(crate) work_tree: PathBuf,
}

impl SystemGit {
  /// Open a git repository
  pub fn open(path: &Path) -> ReleaseResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(ReleaseError::with_help(
          format!("Not a git repository: {}", path.display()),
          "Run release-rail inside a checkout, or pass --repo <path>.",
        ));
      }
      return Err(ReleaseError::message(format!("Failed to open git repository: {}", stderr.trim())));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Self {
      repo_path: path.to_path_buf(),
      work_tree: PathBuf::from(stdout.trim()),
    })
  }

  pub fn work_tree(&self) -> &Path {
    &self.work_tree
  }

  /// Current branch name, `HEAD` when detached
  pub fn current_branch(&self) -> ReleaseResult<String> {
    let output = self
      .git_cmd()
      .args(["rev-parse", "--abbrev-ref", "HEAD"])
      .output()
      .context("Failed to get current branch")?;

    if !output.status.success() {
      return Ok("HEAD".to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// First-parent commit SHAs of `branch`, newest first
  pub fn rev_list(&self, branch: &str, max_count: Option<usize>) -> ReleaseResult<Vec<String>> {
    let mut cmd = self.git_cmd();
    cmd.args(["rev-list", "--first-parent"]);
    if let Some(max) = max_count {
      cmd.arg(format!("--max-count={}", max));
    }
    cmd.arg(branch);

    let stdout = run(cmd, "git rev-list")?;
    Ok(
      stdout
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect(),
    )
  }

  /// Message and changed files of one commit
  pub fn get_commit(&self, sha: &str) -> ReleaseResult<CommitInfo> {
    let mut cmd = self.git_cmd();
    cmd.args(["log", "-1", "--format=%H%n%B", sha]);
    let stdout = run(cmd, "git log")?;
    let (hash, message) = stdout.split_once('\n').unwrap_or((stdout.as_str(), ""));

    let mut cmd = self.git_cmd();
    cmd.args(["diff-tree", "--no-commit-id", "--name-only", "-r", "--root", sha]);
    let files = run(cmd, "git diff-tree")?
      .lines()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .collect();

    Ok(CommitInfo {
      sha: hash.trim().to_string(),
      message: message.trim().to_string(),
      files,
    })
  }

  /// Commits of `branch`, newest first, with their changed files
  pub fn get_commits(&self, branch: &str, max_count: Option<usize>) -> ReleaseResult<Vec<CommitInfo>> {
    let shas = self.rev_list(branch, max_count)?;
    // par_iter keeps input order on collect
    shas.par_iter().map(|sha| self.get_commit(sha)).collect()
  }

  /// Tags, newest first, with the commit each one points at
  pub fn list_tags(&self) -> ReleaseResult<Vec<TagInfo>> {
    let mut cmd = self.git_cmd();
    cmd.args([
      "for-each-ref",
      "--sort=-creatordate",
      "--format=%(refname:short) %(objectname) %(*objectname)",
      "refs/tags",
    ]);
    let stdout = run(cmd, "git for-each-ref")?;
    let tags = stdout
      .lines()
      .filter_map(|line| {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let object = parts.next()?;
        // annotated tags carry the peeled commit in the third column
        let sha = parts.next().unwrap_or(object);
        Some(TagInfo {
          name: name.to_string(),
          sha: sha.to_string(),
        })
      })
      .collect();
    Ok(tags)
  }

  /// File contents at the tip of `branch`; `None` when the file does not exist there
  pub fn read_file_at(&self, branch: &str, path: &str) -> ReleaseResult<Option<String>> {
    let spec = format!("{}:{}", branch, path.trim_start_matches("./"));
    let output = self
      .git_cmd()
      .args(["show", &spec])
      .output()
      .context("Failed to read file from branch")?;

    if !output.status.success() {
      return Ok(None);
    }
    Ok(Some(String::from_utf8(output.stdout)?))
  }

  /// Paths of every file at the tip of `branch`
  pub fn list_files(&self, branch: &str) -> ReleaseResult<Vec<String>> {
    let mut cmd = self.git_cmd();
    cmd.args(["ls-tree", "-r", "--name-only", branch]);
    Ok(run(cmd, "git ls-tree")?.lines().map(str::to_string).collect())
  }

  /// URL of a remote, if configured
  pub fn remote_url(&self, name: &str) -> ReleaseResult<Option<String>> {
    let output = self
      .git_cmd()
      .args(["remote", "get-url", name])
      .output()
      .context("Failed to read remote URL")?;
    if !output.status.success() {
      return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables
  /// - Whitelists only PATH and HOME
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(&self.repo_path);

    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
      cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
      cmd.env("HOME", home);
    }

    cmd.arg("-c").arg("core.quotePath=false");
    cmd
  }
}

fn run(mut cmd: Command, label: &str) -> ReleaseResult<String> {
  let output = cmd.output().with_context(|| format!("Failed to execute {}", label))?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(ReleaseError::message(format!("{} failed: {}", label, stderr.trim())));
  }
  Ok(String::from_utf8(output.stdout)?)
}

/// `owner/repo` from an https or ssh remote URL
pub fn parse_remote_slug(url: &str) -> Option<(String, String)> {
  let trimmed = url.trim().trim_end_matches('/').trim_end_matches(".git");
  let path = match trimmed.split_once("://") {
    Some((_, rest)) => rest.split_once('/')?.1,
    None => trimmed.split_once(':')?.1,
  };
  let mut parts = path.rsplitn(2, '/');
  let repo = parts.next()?;
  let owner = parts.next()?.rsplit('/').next()?;
  if owner.is_empty() || repo.is_empty() {
    return None;
  }
  Some((owner.to_string(), repo.to_string()))
}
