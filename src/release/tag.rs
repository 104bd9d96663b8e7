//! Release tag names
//!
//! Handles the tag conventions used to find previous releases:
//! - `component-v1.2.3` (default separator)
//! - `component@v1.2.3`, `component/v1.2.3`
//! - `v1.2.3` and `1.2.3` (single-component repos)

use crate::release::version::parse_version;
use regex::Regex;
use semver::Version;
use std::fmt;
use std::sync::LazyLock;

/// Default separator between component and version
pub const DEFAULT_TAG_SEPARATOR: &str = "-";

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?:(?P<component>.*?)(?P<separator>[-@/]))?(?P<v>v)?(?P<version>\d+\.\d+\.\d+.*)$").expect("static regex")
});

/// A release tag: optional component, separator, optional `v`, version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagName {
  pub component: Option<String>,
  pub version: Version,
  pub separator: String,
  pub include_v: bool,
}

impl TagName {
  pub fn new(version: Version, component: Option<&str>, separator: Option<&str>, include_v: bool) -> Self {
    Self {
      component: component.filter(|c| !c.is_empty()).map(str::to_string),
      version,
      separator: separator.unwrap_or(DEFAULT_TAG_SEPARATOR).to_string(),
      include_v,
    }
  }

  /// Parse a tag name. Returns `None` for tags that carry no recognizable version.
  pub fn parse(tag_name: &str) -> Option<Self> {
    let caps = TAG_PATTERN.captures(tag_name)?;
    let version = parse_version(&caps["version"]).ok()?;
    let component = caps
      .name("component")
      .map(|c| c.as_str())
      .filter(|c| !c.is_empty())
      .map(str::to_string);
    let separator = caps
      .name("separator")
      .filter(|_| component.is_some())
      .map(|s| s.as_str().to_string())
      .unwrap_or_else(|| DEFAULT_TAG_SEPARATOR.to_string());
    Some(Self {
      component,
      version,
      separator,
      include_v: caps.name("v").is_some(),
    })
  }
}

impl fmt::Display for TagName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let v = if self.include_v { "v" } else { "" };
    match &self.component {
      Some(component) => write!(f, "{}{}{}{}", component, self.separator, v, self.version),
      None => write!(f, "{}{}", v, self.version),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_formats() {
    let v = Version::new(1, 2, 3);
    assert_eq!(TagName::new(v.clone(), Some("pkg"), None, true).to_string(), "pkg-v1.2.3");
    assert_eq!(TagName::new(v.clone(), Some("pkg"), Some("@"), true).to_string(), "pkg@v1.2.3");
    assert_eq!(TagName::new(v.clone(), None, None, true).to_string(), "v1.2.3");
    assert_eq!(TagName::new(v.clone(), Some(""), None, false).to_string(), "1.2.3");
  }

  #[test]
  fn test_parse_component_forms() {
    let tag = TagName::parse("my-crate-v1.2.3").unwrap();
    assert_eq!(tag.component.as_deref(), Some("my-crate"));
    assert_eq!(tag.version, Version::new(1, 2, 3));

    let tag = TagName::parse("my-crate@v0.3.0").unwrap();
    assert_eq!(tag.component.as_deref(), Some("my-crate"));
    assert_eq!(tag.separator, "@");

    let tag = TagName::parse("@scope/pkg/v2.0.0").unwrap();
    assert_eq!(tag.component.as_deref(), Some("@scope/pkg"));
  }

  #[test]
  fn test_parse_componentless() {
    let tag = TagName::parse("v1.0.0").unwrap();
    assert!(tag.component.is_none());
    assert!(tag.include_v);

    let tag = TagName::parse("1.0.0-beta.1").unwrap();
    assert!(tag.component.is_none());
    assert!(!tag.include_v);
    assert_eq!(tag.version.pre.as_str(), "beta.1");
  }

  #[test]
  fn test_roundtrip_display() {
    for name in ["pkg-v1.2.3", "pkg@v1.2.3", "v1.2.3", "1.2.3"] {
      assert_eq!(TagName::parse(name).unwrap().to_string(), name);
    }
  }

  #[test]
  fn test_rejects_garbage() {
    assert!(TagName::parse("latest").is_none());
  }
}
