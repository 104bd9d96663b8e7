//! Release pull request titles
//!
//! Titles are rendered from a pattern with `${scope}`, `${component}`, `${version}` and
//! `${branch}` placeholders, and parsed back by compiling the same pattern into an
//! anchored regex. Only the first occurrence of each placeholder is significant.

use crate::core::error::ReleaseResult;
use crate::release::version::parse_version;
use regex::Regex;
use semver::Version;
use std::fmt;
use tracing::warn;

/// Default title pattern for component releases
pub const DEFAULT_PR_TITLE_PATTERN: &str = "chore${scope}: release${component} ${version}";

const SCOPE: &str = "${scope}";
const COMPONENT: &str = "${component}";
const VERSION: &str = "${version}";
const BRANCH: &str = "${branch}";

/// Compile a title pattern into an anchored match regex
pub fn generate_match_pattern(pattern: Option<&str>) -> ReleaseResult<Regex> {
  let pattern = pattern.unwrap_or(DEFAULT_PR_TITLE_PATTERN);
  for placeholder in [SCOPE, COMPONENT, VERSION] {
    if !pattern.contains(placeholder) {
      warn!("pull request title pattern is missing '{}'", placeholder);
    }
  }

  let mut regex = String::from("^");
  let mut used: Vec<&str> = Vec::new();
  let mut rest = pattern;
  while !rest.is_empty() {
    let next = [SCOPE, COMPONENT, VERSION, BRANCH]
      .iter()
      .filter_map(|p| rest.find(p).map(|i| (i, *p)))
      .min_by_key(|(i, _)| *i);
    let Some((index, placeholder)) = next else {
      regex.push_str(&regex::escape(rest));
      break;
    };
    regex.push_str(&regex::escape(&rest[..index]));
    if used.contains(&placeholder) {
      regex.push_str(&regex::escape(placeholder));
    } else {
      used.push(placeholder);
      regex.push_str(match placeholder {
        SCOPE => r"(\((?P<branch>[\w\-./]+)\))?",
        COMPONENT => r" ?(?P<component>@?[\w\-./]*)?",
        VERSION => r"v?(?P<version>[0-9].*)",
        _ => r"(?P<branch>[\w\-./]+)?",
      });
    }
    rest = &rest[index + placeholder.len()..];
  }
  regex.push('$');

  // `${scope}` and `${branch}` share a capture name; keep the first
  if used.contains(&SCOPE) && used.contains(&BRANCH) {
    regex = regex.replacen(r"(?P<branch>[\w\-./]+)?", r"([\w\-./]+)?", 1);
  }
  Ok(Regex::new(&regex)?)
}

/// A release pull request title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestTitle {
  pub component: Option<String>,
  pub target_branch: Option<String>,
  pub version: Option<Version>,
  pattern: String,
}

impl PullRequestTitle {
  fn build(
    component: Option<&str>,
    target_branch: Option<&str>,
    version: Option<&Version>,
    pattern: Option<&str>,
  ) -> Self {
    Self {
      component: component.filter(|c| !c.is_empty()).map(str::to_string),
      target_branch: target_branch.map(str::to_string),
      version: version.cloned(),
      pattern: pattern.unwrap_or(DEFAULT_PR_TITLE_PATTERN).to_string(),
    }
  }

  pub fn of_component_target_branch_version(
    component: &str,
    target_branch: &str,
    version: &Version,
    pattern: Option<&str>,
  ) -> Self {
    Self::build(Some(component), Some(target_branch), Some(version), pattern)
  }

  pub fn of_target_branch_version(target_branch: &str, version: &Version, pattern: Option<&str>) -> Self {
    Self::build(None, Some(target_branch), Some(version), pattern)
  }

  pub fn of_target_branch(target_branch: &str, pattern: Option<&str>) -> Self {
    Self::build(None, Some(target_branch), None, pattern)
  }

  pub fn of_component_version(component: &str, version: &Version, pattern: Option<&str>) -> Self {
    Self::build(Some(component), None, Some(version), pattern)
  }

  /// Parse `title` against `pattern` (default pattern when `None`)
  pub fn parse(title: &str, pattern: Option<&str>) -> Option<Self> {
    let regex = match generate_match_pattern(pattern) {
      Ok(regex) => regex,
      Err(err) => {
        warn!("invalid pull request title pattern: {}", err);
        return None;
      }
    };
    let caps = regex.captures(title)?;
    let version = match caps.name("version") {
      Some(v) => Some(parse_version(v.as_str()).ok()?),
      None => None,
    };
    Some(Self::build(
      caps.name("component").map(|c| c.as_str()),
      caps.name("branch").map(|b| b.as_str()),
      version.as_ref(),
      pattern,
    ))
  }

  pub fn pattern(&self) -> &str {
    &self.pattern
  }
}

impl fmt::Display for PullRequestTitle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let scope = self
      .target_branch
      .as_ref()
      .map(|b| format!("({})", b))
      .unwrap_or_default();
    let component = self.component.as_ref().map(|c| format!(" {}", c)).unwrap_or_default();
    let version = self.version.as_ref().map(|v| v.to_string()).unwrap_or_default();
    let rendered = self
      .pattern
      .replacen(SCOPE, &scope, 1)
      .replacen(COMPONENT, &component, 1)
      .replacen(VERSION, &version, 1)
      .replacen(BRANCH, self.target_branch.as_deref().unwrap_or_default(), 1);
    write!(f, "{}", rendered.trim())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::config::MANIFEST_PULL_REQUEST_TITLE_PATTERN;

  #[test]
  fn test_default_render() {
    let title = PullRequestTitle::of_component_target_branch_version("pkg1", "main", &Version::new(1, 0, 1), None);
    assert_eq!(title.to_string(), "chore(main): release pkg1 1.0.1");
  }

  #[test]
  fn test_default_parse() {
    let title = PullRequestTitle::parse("chore(main): release pkg1 1.0.1", None).unwrap();
    assert_eq!(title.component.as_deref(), Some("pkg1"));
    assert_eq!(title.target_branch.as_deref(), Some("main"));
    assert_eq!(title.version, Some(Version::new(1, 0, 1)));

    let title = PullRequestTitle::parse("chore: release 2.0.0", None).unwrap();
    assert!(title.component.is_none());
    assert_eq!(title.version, Some(Version::new(2, 0, 0)));
  }

  #[test]
  fn test_manifest_pattern() {
    let title = PullRequestTitle::of_target_branch("main", Some(MANIFEST_PULL_REQUEST_TITLE_PATTERN));
    assert_eq!(title.to_string(), "chore: release main");
    let parsed = PullRequestTitle::parse("chore: release main", Some(MANIFEST_PULL_REQUEST_TITLE_PATTERN)).unwrap();
    assert_eq!(parsed.target_branch.as_deref(), Some("main"));
    assert!(parsed.version.is_none());
  }

  #[test]
  fn test_literal_text_is_escaped() {
    let pattern = "[release] ${component} v${version} (auto)";
    let title = PullRequestTitle::of_component_version("core", &Version::new(3, 1, 0), Some(pattern));
    assert_eq!(title.to_string(), "[release]  core v3.1.0 (auto)");
    let parsed = PullRequestTitle::parse(&title.to_string(), Some(pattern)).unwrap();
    assert_eq!(parsed.component.as_deref(), Some("core"));
  }

  #[test]
  fn test_mismatch() {
    assert!(PullRequestTitle::parse("feat: add thing", None).is_none());
  }
}
