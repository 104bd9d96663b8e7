//! Release notes in conventional-changelog style
//!
//! ```text
//! ## [1.0.1](https://github.com/owner/repo/compare/v1.0.0...v1.0.1) (2024-05-01)
//!
//!
//! ### Bug Fixes
//!
//! * **parser:** handle tabs ([abc1234](https://github.com/owner/repo/commit/abc1234...))
//! ```

use crate::host::Repository;
use crate::release::commit::{BREAKING_CHANGE_NOTE, ConventionalCommit};
use semver::Version;
use serde::{Deserialize, Serialize};

const DEPENDENCIES_HEADING: &str = "### Dependencies";

/// Maps a commit type to a changelog section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogSection {
  #[serde(rename = "type")]
  pub commit_type: String,
  pub section: String,
  #[serde(default)]
  pub hidden: bool,
}

impl ChangelogSection {
  fn new(commit_type: &str, section: &str, hidden: bool) -> Self {
    Self {
      commit_type: commit_type.to_string(),
      section: section.to_string(),
      hidden,
    }
  }
}

pub fn default_sections() -> Vec<ChangelogSection> {
  vec![
    ChangelogSection::new("feat", "Features", false),
    ChangelogSection::new("feature", "Features", false),
    ChangelogSection::new("fix", "Bug Fixes", false),
    ChangelogSection::new("perf", "Performance Improvements", false),
    ChangelogSection::new("revert", "Reverts", false),
    ChangelogSection::new("deps", "Dependencies", false),
    ChangelogSection::new("docs", "Documentation", true),
    ChangelogSection::new("style", "Styles", true),
    ChangelogSection::new("chore", "Miscellaneous Chores", true),
    ChangelogSection::new("refactor", "Code Refactoring", true),
    ChangelogSection::new("test", "Tests", true),
    ChangelogSection::new("build", "Build System", true),
    ChangelogSection::new("ci", "Continuous Integration", true),
  ]
}

/// Inputs for one release entry
#[derive(Debug, Clone)]
pub struct NotesOptions<'a> {
  pub version: &'a Version,
  pub previous_tag: Option<String>,
  pub current_tag: String,
  pub repository: &'a Repository,
  /// `YYYY-MM-DD`; today when unset
  pub date: Option<String>,
  pub sections: &'a [ChangelogSection],
}

/// Render the notes for a release
pub fn build_notes(commits: &[ConventionalCommit], options: &NotesOptions<'_>) -> String {
  let date = options
    .date
    .clone()
    .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
  let heading = match &options.previous_tag {
    Some(previous) => format!(
      "## [{}]({}/compare/{}...{}) ({})",
      options.version,
      options.repository.html_url(),
      previous,
      options.current_tag,
      date
    ),
    None => format!("## {} ({})", options.version, date),
  };

  let mut out = vec![heading];

  let breaking: Vec<String> = commits
    .iter()
    .flat_map(|c| {
      c.notes
        .iter()
        .filter(|n| n.title == BREAKING_CHANGE_NOTE)
        .map(move |n| format_entry(c, &n.text, options.repository))
    })
    .collect();
  if !breaking.is_empty() {
    out.push(format!("### ⚠ BREAKING CHANGES\n\n{}", dedup(breaking).join("\n")));
  }

  // section order follows the configuration; first mapping of a section name wins
  let mut seen_sections: Vec<&str> = Vec::new();
  for section in options.sections.iter().filter(|s| !s.hidden) {
    if seen_sections.contains(&section.section.as_str()) {
      continue;
    }
    seen_sections.push(&section.section);
    let types: Vec<&str> = options
      .sections
      .iter()
      .filter(|s| s.section == section.section)
      .map(|s| s.commit_type.as_str())
      .collect();
    let entries: Vec<String> = commits
      .iter()
      .filter(|c| types.contains(&c.commit_type.as_str()))
      .map(|c| format_entry(c, &c.bare_message, options.repository))
      .collect();
    if !entries.is_empty() {
      out.push(format!("### {}\n\n{}", section.section, dedup(entries).join("\n")));
    }
  }

  out.join("\n\n\n").trim_end().to_string() + "\n"
}

fn format_entry(commit: &ConventionalCommit, text: &str, repository: &Repository) -> String {
  let scope = commit
    .scope
    .as_ref()
    .filter(|s| !s.is_empty())
    .map(|s| format!("**{}:** ", s))
    .unwrap_or_default();
  let short: String = commit.sha.chars().take(7).collect();
  if short.is_empty() {
    return format!("* {}{}", scope, text);
  }
  format!(
    "* {}{} ([{}]({}/commit/{}))",
    scope,
    text,
    short,
    repository.html_url(),
    commit.sha
  )
}

fn dedup(entries: Vec<String>) -> Vec<String> {
  let mut out: Vec<String> = Vec::with_capacity(entries.len());
  for entry in entries {
    if !out.contains(&entry) {
      out.push(entry);
    }
  }
  out
}

/// Notes that hold nothing but the heading line
pub fn is_empty_notes(notes: &str) -> bool {
  notes.trim().lines().count() <= 1
}

/// Merge a dependency bump list into the notes' `### Dependencies` section, creating it
/// when absent
pub fn append_dependencies_section(changelog: &str, notes: &str) -> String {
  if changelog.trim().is_empty() {
    return format!("{}\n\n{}", DEPENDENCIES_HEADING, notes);
  }

  let mut lines: Vec<&str> = Vec::new();
  let mut seen_section = false;
  let mut seen_spacer = false;
  let mut injected = false;
  for line in changelog.split('\n') {
    if seen_section {
      let trimmed = line.trim();
      if seen_spacer && !injected && !trimmed.starts_with('*') {
        lines.push(notes);
        injected = true;
      }
      if trimmed.is_empty() {
        seen_spacer = true;
      }
    }
    if line.trim() == DEPENDENCIES_HEADING {
      seen_section = true;
    }
    lines.push(line);
  }

  if injected {
    lines.join("\n")
  } else if seen_section {
    format!("{}\n{}", changelog, notes)
  } else {
    format!("{}\n\n\n{}\n\n{}", changelog, DEPENDENCIES_HEADING, notes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::commit::{Commit, parse_conventional_commits};

  fn repo() -> Repository {
    Repository::new("owner", "repo", "main")
  }

  #[test]
  fn test_sections_and_links() {
    let commits = parse_conventional_commits(&[
      Commit::new("aaaaaaaaaa", "feat(api): add endpoint"),
      Commit::new("bbbbbbbbbb", "fix: handle null"),
      Commit::new("cccccccccc", "chore: tidy"),
    ]);
    let repository = repo();
    let sections = default_sections();
    let notes = build_notes(
      &commits,
      &NotesOptions {
        version: &Version::new(1, 1, 0),
        previous_tag: Some("v1.0.0".to_string()),
        current_tag: "v1.1.0".to_string(),
        repository: &repository,
        date: Some("2024-05-01".to_string()),
        sections: &sections,
      },
    );
    assert!(notes.starts_with("## [1.1.0](https://github.com/owner/repo/compare/v1.0.0...v1.1.0) (2024-05-01)"));
    assert!(notes.contains("### Features\n\n* **api:** add endpoint ([aaaaaaa](https://github.com/owner/repo/commit/aaaaaaaaaa))"));
    assert!(notes.contains("### Bug Fixes"));
    assert!(!notes.contains("tidy"));
    assert!(notes.find("Features").unwrap() < notes.find("Bug Fixes").unwrap());
  }

  #[test]
  fn test_only_hidden_commits_is_empty() {
    let commits = parse_conventional_commits(&[Commit::new("a", "chore: tidy")]);
    let repository = repo();
    let sections = default_sections();
    let notes = build_notes(
      &commits,
      &NotesOptions {
        version: &Version::new(1, 0, 1),
        previous_tag: None,
        current_tag: "v1.0.1".to_string(),
        repository: &repository,
        date: Some("2024-05-01".to_string()),
        sections: &sections,
      },
    );
    assert_eq!(notes, "## 1.0.1 (2024-05-01)\n");
    assert!(is_empty_notes(&notes));
  }

  #[test]
  fn test_breaking_section_first() {
    let commits = parse_conventional_commits(&[Commit::new("a", "feat!: drop v1 api")]);
    let repository = repo();
    let sections = default_sections();
    let notes = build_notes(
      &commits,
      &NotesOptions {
        version: &Version::new(2, 0, 0),
        previous_tag: None,
        current_tag: "v2.0.0".to_string(),
        repository: &repository,
        date: Some("2024-05-01".to_string()),
        sections: &sections,
      },
    );
    assert!(notes.find("BREAKING CHANGES").unwrap() < notes.find("### Features").unwrap());
  }

  #[test]
  fn test_append_dependencies_creates_section() {
    let updated = append_dependencies_section("## 1.0.1 (2024-05-01)", "* deps\n  * x bumped");
    assert_eq!(updated, "## 1.0.1 (2024-05-01)\n\n\n### Dependencies\n\n* deps\n  * x bumped");
  }

  #[test]
  fn test_append_dependencies_injects_notes() {
    let changelog = "## 1.0.1\n\n### Dependencies\n\n* old bump\n\n### Other\n\n* x";
    let updated = append_dependencies_section(changelog, "* new bump");
    assert_eq!(updated, "## 1.0.1\n\n### Dependencies\n\n* old bump\n* new bump\n\n### Other\n\n* x");
  }

  #[test]
  fn test_append_dependencies_at_end() {
    let changelog = "## 1.0.1\n\n### Dependencies\n\n* old bump";
    let updated = append_dependencies_section(changelog, "* new bump");
    assert_eq!(updated, "## 1.0.1\n\n### Dependencies\n\n* old bump\n* new bump");
  }
}
