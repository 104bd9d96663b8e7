//! Assign commits to the configured component paths they touch

use crate::core::config::ROOT_PROJECT_PATH;
use crate::release::commit::Commit;
use std::collections::BTreeMap;

/// Splits a newest-first commit list by package path.
///
/// Paths are matched longest-first on a `{path}/` prefix, so nested packages win over
/// their parents. Files at the repository root belong to no package; the root path `.`
/// receives every commit.
#[derive(Debug, Clone)]
pub struct CommitSplit {
  /// Send commits with no file information to every path
  include_empty: bool,
  /// Configured paths, longest first, root excluded
  package_paths: Vec<String>,
}

impl CommitSplit {
  pub fn new<I, S>(paths: I, include_empty: bool) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut package_paths: Vec<String> = paths
      .into_iter()
      .map(|p| normalize_path(&p.into()))
      .filter(|p| p != ROOT_PROJECT_PATH && !p.is_empty())
      .collect();
    package_paths.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    package_paths.dedup();
    Self {
      include_empty,
      package_paths,
    }
  }

  /// Group commits by path. Each list keeps the input order.
  pub fn split(&self, commits: &[Commit]) -> BTreeMap<String, Vec<Commit>> {
    let mut split: BTreeMap<String, Vec<Commit>> = BTreeMap::new();
    for commit in commits {
      if commit.files.is_empty() {
        if self.include_empty {
          for path in &self.package_paths {
            split.entry(path.clone()).or_default().push(commit.clone());
          }
        }
        continue;
      }

      let mut touched: Vec<&String> = Vec::new();
      for file in &commit.files {
        // root-level files belong to no package
        if !file.contains('/') {
          continue;
        }
        if let Some(path) = self.package_paths.iter().find(|p| file.starts_with(&format!("{}/", p)))
          && !touched.contains(&path)
        {
          touched.push(path);
        }
      }
      for path in touched {
        split.entry(path.clone()).or_default().push(commit.clone());
      }
    }
    split
  }

  /// Commits for `path`; the root path receives everything
  pub fn commits_for(&self, path: &str, commits: &[Commit], split: &BTreeMap<String, Vec<Commit>>) -> Vec<Commit> {
    if path == ROOT_PROJECT_PATH {
      return commits.to_vec();
    }
    split.get(&normalize_path(path)).cloned().unwrap_or_default()
  }
}

/// Commits newer than `sha` (exclusive). With no sha or an unseen sha, all commits.
pub fn commits_after_sha(commits: &[Commit], sha: Option<&str>) -> Vec<Commit> {
  let Some(sha) = sha else {
    return commits.to_vec();
  };
  match commits.iter().position(|c| c.sha == sha) {
    Some(index) => commits[..index].to_vec(),
    None => commits.to_vec(),
  }
}

fn normalize_path(path: &str) -> String {
  let trimmed = path.trim_start_matches("./").trim_end_matches('/');
  if trimmed.is_empty() {
    ROOT_PROJECT_PATH.to_string()
  } else {
    trimmed.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn commit(sha: &str, files: &[&str]) -> Commit {
    Commit::new(sha, format!("fix: {}", sha)).with_files(files.iter().copied())
  }

  #[test]
  fn test_longest_prefix_wins() {
    let split = CommitSplit::new(["packages", "packages/core"], false);
    let result = split.split(&[commit("a", &["packages/core/src/lib.rs"]), commit("b", &["packages/x.rs"])]);
    assert_eq!(result["packages/core"].len(), 1);
    assert_eq!(result["packages"].len(), 1);
    assert_eq!(result["packages"][0].sha, "b");
  }

  #[test]
  fn test_root_files_and_empty_commits() {
    let split = CommitSplit::new(["a", "b"], true);
    let result = split.split(&[commit("root", &["README.md"]), commit("empty", &[])]);
    assert!(result.get("a").is_some_and(|c| c.len() == 1 && c[0].sha == "empty"));
    assert!(result.get("b").is_some_and(|c| c.len() == 1));

    let strict = CommitSplit::new(["a"], false);
    assert!(strict.split(&[commit("empty", &[])]).is_empty());
  }

  #[test]
  fn test_prefix_requires_separator() {
    let split = CommitSplit::new(["pkg"], false);
    let result = split.split(&[commit("a", &["pkg-two/file.rs"])]);
    assert!(result.is_empty());
  }

  #[test]
  fn test_commits_after_sha() {
    let commits = vec![commit("c3", &[]), commit("c2", &[]), commit("c1", &[])];
    let after = commits_after_sha(&commits, Some("c2"));
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].sha, "c3");
    assert_eq!(commits_after_sha(&commits, None).len(), 3);
    assert_eq!(commits_after_sha(&commits, Some("zz")).len(), 3);
  }
}
