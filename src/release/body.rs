//! Release pull request bodies
//!
//! Layout:
//!
//! ```text
//! {header}
//! ---
//!
//!
//! {notes}
//!
//! ---
//! {footer}
//! ```
//!
//! With components, each release is wrapped in
//! `<details><summary>{component}: {version}</summary> ... </details>`.
//! A single unnamed release renders flat.

use crate::release::version::parse_version;
use regex::Regex;
use semver::Version;
use std::fmt;
use std::sync::LazyLock;
use tracing::warn;

pub const DEFAULT_HEADER: &str = ":robot: I have created a release *beep* *boop*";
pub const DEFAULT_FOOTER: &str = "This PR was generated with [Release Rail](https://github.com/loadingalias/release-rail). See [documentation](https://github.com/loadingalias/release-rail#readme).";
const NOTES_DELIMITER: &str = "---";

static DETAILS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?s)<details>\s*<summary>(?P<summary>.*?)</summary>(?P<notes>.*?)</details>").expect("static regex")
});
static SUMMARY_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(?P<component>.*[^:]):? (?P<version>\d+\.\d+\.\d+.*)$").expect("static regex"));
static COMPONENTLESS_SUMMARY_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(?P<version>\d+\.\d+\.\d+.*)$").expect("static regex"));
static COMPARE_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^#{2,} \[?(?P<version>\d+\.\d+\.\d+.*)\]?").expect("static regex"));

/// Notes for one released component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseData {
  pub component: Option<String>,
  pub version: Option<Version>,
  pub notes: String,
}

impl ReleaseData {
  pub fn new(component: Option<&str>, version: Option<Version>, notes: impl Into<String>) -> Self {
    Self {
      component: component.filter(|c| !c.is_empty()).map(str::to_string),
      version,
      notes: notes.into(),
    }
  }
}

/// Rendering options for [`PullRequestBody`]
#[derive(Debug, Clone, Default)]
pub struct BodyOptions {
  pub header: Option<String>,
  pub footer: Option<String>,
  pub extra: Option<String>,
  /// Wrap each release in a `<details>` block. Defaults to "more than one release".
  pub use_components: Option<bool>,
}

/// A release pull request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestBody {
  pub header: String,
  pub footer: String,
  pub extra: Option<String>,
  pub release_data: Vec<ReleaseData>,
  pub use_components: bool,
}

impl PullRequestBody {
  pub fn new(release_data: Vec<ReleaseData>) -> Self {
    Self::with_options(release_data, BodyOptions::default())
  }

  pub fn with_options(release_data: Vec<ReleaseData>, options: BodyOptions) -> Self {
    let use_components = options.use_components.unwrap_or(release_data.len() > 1);
    Self {
      header: options.header.filter(|h| !h.is_empty()).unwrap_or_else(|| DEFAULT_HEADER.to_string()),
      footer: options.footer.filter(|f| !f.is_empty()).unwrap_or_else(|| DEFAULT_FOOTER.to_string()),
      extra: options.extra,
      release_data,
      use_components,
    }
  }

  /// Parse a rendered body. `None` when the delimiters are missing.
  pub fn parse(body: &str) -> Option<Self> {
    let normalized = body.trim().replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let Some(first) = lines.iter().position(|l| *l == NOTES_DELIMITER) else {
      warn!("pull request body did not match");
      return None;
    };
    let mut last = lines.iter().rposition(|l| *l == NOTES_DELIMITER).unwrap_or(first);
    if last == first {
      last = lines.len().saturating_sub(1);
    }

    let header = lines[..first].join("\n").trim().to_string();
    let content = lines[first + 1..last.max(first + 1)].join("\n");
    let footer = lines.get(last + 1..).map(|rest| rest.join("\n")).unwrap_or_default();

    let mut release_data = extract_multiple_releases(&content);
    let mut use_components = true;
    if release_data.is_empty() {
      release_data = extract_single_release(&content);
      use_components = false;
      if release_data.is_empty() {
        warn!("failed to parse releases from pull request body");
      }
    }

    Some(Self {
      header,
      footer,
      extra: None,
      release_data,
      use_components,
    })
  }

  /// Rendered notes section
  pub fn notes(&self) -> String {
    if self.use_components {
      return self
        .release_data
        .iter()
        .map(|release| {
          let component = release.component.as_ref().map(|c| format!("{}: ", c)).unwrap_or_default();
          let version = release.version.as_ref().map(|v| v.to_string()).unwrap_or_default();
          format!(
            "<details><summary>{}{}</summary>\n\n{}\n</details>",
            component, version, release.notes
          )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    }
    self
      .release_data
      .iter()
      .map(|release| release.notes.as_str())
      .collect::<Vec<_>>()
      .join("\n\n")
  }
}

impl fmt::Display for PullRequestBody {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let extra = self.extra.as_ref().map(|e| format!("\n\n{}\n", e)).unwrap_or_default();
    write!(
      f,
      "{}\n{}\n\n\n{}\n\n{}{}\n{}",
      self.header,
      NOTES_DELIMITER,
      self.notes(),
      NOTES_DELIMITER,
      extra,
      self.footer
    )
  }
}

fn extract_multiple_releases(content: &str) -> Vec<ReleaseData> {
  let mut data = Vec::new();
  for caps in DETAILS_PATTERN.captures_iter(content) {
    let summary = caps["summary"].trim();
    let notes = caps["notes"].trim();
    if let Some(summary_caps) = SUMMARY_PATTERN.captures(summary) {
      let Ok(version) = parse_version(&summary_caps["version"]) else {
        warn!("summary: {} has an invalid version", summary);
        continue;
      };
      data.push(ReleaseData::new(Some(&summary_caps["component"]), Some(version), notes));
    } else if let Some(summary_caps) = COMPONENTLESS_SUMMARY_PATTERN.captures(summary) {
      let Ok(version) = parse_version(&summary_caps["version"]) else {
        warn!("summary: {} has an invalid version", summary);
        continue;
      };
      data.push(ReleaseData::new(None, Some(version), notes));
    } else {
      warn!("summary: {} did not match the expected pattern", summary);
    }
  }
  data
}

fn extract_single_release(content: &str) -> Vec<ReleaseData> {
  let body = content.trim();
  let version = COMPARE_PATTERN
    .captures(body)
    .and_then(|caps| parse_version(&caps["version"]).ok());
  match version {
    Some(version) => vec![ReleaseData::new(None, Some(version), body)],
    None => {
      warn!("failed to find version in release notes");
      Vec::new()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn notes(version: &str) -> String {
    format!("## [{}](https://example.com/compare) (2024-01-01)\n\n\n### Bug Fixes\n\n* a fix", version)
  }

  #[test]
  fn test_multi_component_roundtrip() {
    let body = PullRequestBody::new(vec![
      ReleaseData::new(Some("pkg1"), Some(Version::new(1, 0, 1)), notes("1.0.1")),
      ReleaseData::new(Some("@scope/pkg2"), Some(Version::new(0, 2, 4)), notes("0.2.4")),
    ]);
    assert!(body.use_components);
    let rendered = body.to_string();
    assert!(rendered.contains("<summary>pkg1: 1.0.1</summary>"));

    let parsed = PullRequestBody::parse(&rendered).unwrap();
    assert_eq!(parsed.release_data, body.release_data);
    assert_eq!(parsed.header, DEFAULT_HEADER);
    assert_eq!(parsed.footer, DEFAULT_FOOTER);
  }

  #[test]
  fn test_single_release_renders_flat() {
    let body = PullRequestBody::new(vec![ReleaseData::new(None, Some(Version::new(1, 0, 1)), notes("1.0.1"))]);
    let rendered = body.to_string();
    assert!(!rendered.contains("<details>"));

    let parsed = PullRequestBody::parse(&rendered).unwrap();
    assert!(!parsed.use_components);
    assert_eq!(parsed.release_data.len(), 1);
    assert_eq!(parsed.release_data[0].version, Some(Version::new(1, 0, 1)));
    assert_eq!(parsed.release_data[0].notes, notes("1.0.1"));
  }

  #[test]
  fn test_forced_components_for_single() {
    let body = PullRequestBody::with_options(
      vec![ReleaseData::new(Some("pkg1"), Some(Version::new(1, 0, 0)), "notes")],
      BodyOptions {
        use_components: Some(true),
        header: Some("custom header".to_string()),
        ..Default::default()
      },
    );
    let parsed = PullRequestBody::parse(&body.to_string()).unwrap();
    assert_eq!(parsed.header, "custom header");
    assert_eq!(parsed.release_data[0].component.as_deref(), Some("pkg1"));
  }

  #[test]
  fn test_componentless_summary() {
    let content = "head\n---\n\n<details><summary>1.2.3</summary>\n\nnotes\n</details>\n\n---\nfoot";
    let parsed = PullRequestBody::parse(content).unwrap();
    assert_eq!(parsed.release_data[0].component, None);
    assert_eq!(parsed.release_data[0].notes, "notes");
  }

  #[test]
  fn test_missing_delimiter() {
    assert!(PullRequestBody::parse("just text").is_none());
  }
}
