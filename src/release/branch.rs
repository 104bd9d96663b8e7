//! Release pull request head branch names
//!
//! Current forms:
//! - `release-please--branches--{target}`
//! - `release-please--branches--{target}--components--{component}`
//! - `release-please--branches--{target}--groups--{group}`
//!
//! Legacy forms are still parsed so old release PRs resolve:
//! - `release-{component}-v{version}` / `release-v{version}`
//! - `release-please/branches/{target}[/components/{component}]`

use crate::release::version::parse_version;
use regex::Regex;
use semver::Version;
use std::fmt;
use std::sync::LazyLock;

const BRANCH_PREFIX: &str = "release-please--branches--";

static AUTORELEASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^release-?(?P<component>[\w\-.]*)?-v(?P<version>[0-9].*)$").expect("static regex")
});
static COMPONENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^release-please--branches--(?P<branch>.+)--components--(?P<component>.+)$").expect("static regex")
});
static GROUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^release-please--branches--(?P<branch>.+)--groups--(?P<group>.+)$").expect("static regex")
});
static DEFAULT_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^release-please--branches--(?P<branch>.+)$").expect("static regex"));
static V12_COMPONENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^release-please/branches/(?P<branch>[^/]+)/components/(?P<component>.+)$").expect("static regex")
});
static V12_DEFAULT_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^release-please/branches/(?P<branch>[^/]+)$").expect("static regex"));
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\d]").expect("static regex"));
static DASH_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("static regex"));

/// A parsed release branch name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchName {
  /// Legacy releasetool branch carrying the version
  Autorelease { component: Option<String>, version: Version },
  /// Single-target branch shared by all components
  Default { target_branch: String },
  /// Per-component branch
  Component { target_branch: String, component: String },
  /// Grouped branch (linked versions)
  Group { target_branch: String, group: String },
  V12Default { target_branch: String },
  V12Component { target_branch: String, component: String },
}

impl BranchName {
  pub fn of_target_branch(target_branch: &str) -> Self {
    BranchName::Default {
      target_branch: target_branch.to_string(),
    }
  }

  pub fn of_component_target_branch(component: &str, target_branch: &str) -> Self {
    BranchName::Component {
      target_branch: target_branch.to_string(),
      component: component.to_string(),
    }
  }

  pub fn of_group_target_branch(group: &str, target_branch: &str) -> Self {
    BranchName::Group {
      target_branch: target_branch.to_string(),
      group: safe_branch_name(group),
    }
  }

  pub fn of_component_version(component: &str, version: &Version) -> Self {
    BranchName::Autorelease {
      component: Some(component.to_string()).filter(|c| !c.is_empty()),
      version: version.clone(),
    }
  }

  /// Parse any known form. Unknown branches yield `None`.
  pub fn parse(branch_name: &str) -> Option<Self> {
    if !branch_name.starts_with(BRANCH_PREFIX)
      && let Some(caps) = AUTORELEASE_PATTERN.captures(branch_name)
    {
      return Some(BranchName::Autorelease {
        component: caps
          .name("component")
          .map(|c| c.as_str().to_string())
          .filter(|c| !c.is_empty()),
        version: parse_version(&caps["version"]).ok()?,
      });
    }
    if let Some(caps) = COMPONENT_PATTERN.captures(branch_name) {
      return Some(BranchName::Component {
        target_branch: caps["branch"].to_string(),
        component: caps["component"].to_string(),
      });
    }
    if let Some(caps) = GROUP_PATTERN.captures(branch_name) {
      return Some(BranchName::Group {
        target_branch: caps["branch"].to_string(),
        group: caps["group"].to_string(),
      });
    }
    if let Some(caps) = DEFAULT_PATTERN.captures(branch_name) {
      return Some(BranchName::Default {
        target_branch: caps["branch"].to_string(),
      });
    }
    if let Some(caps) = V12_COMPONENT_PATTERN.captures(branch_name) {
      return Some(BranchName::V12Component {
        target_branch: caps["branch"].to_string(),
        component: caps["component"].to_string(),
      });
    }
    if let Some(caps) = V12_DEFAULT_PATTERN.captures(branch_name) {
      return Some(BranchName::V12Default {
        target_branch: caps["branch"].to_string(),
      });
    }
    None
  }

  /// Component (or group) encoded in the branch, if any
  pub fn component(&self) -> Option<&str> {
    match self {
      BranchName::Autorelease { component, .. } => component.as_deref(),
      BranchName::Component { component, .. } | BranchName::V12Component { component, .. } => Some(component),
      BranchName::Group { group, .. } => Some(group),
      BranchName::Default { .. } | BranchName::V12Default { .. } => None,
    }
  }

  pub fn target_branch(&self) -> Option<&str> {
    match self {
      BranchName::Autorelease { .. } => None,
      BranchName::Default { target_branch }
      | BranchName::Component { target_branch, .. }
      | BranchName::Group { target_branch, .. }
      | BranchName::V12Default { target_branch }
      | BranchName::V12Component { target_branch, .. } => Some(target_branch),
    }
  }

  pub fn version(&self) -> Option<&Version> {
    match self {
      BranchName::Autorelease { version, .. } => Some(version),
      _ => None,
    }
  }
}

impl fmt::Display for BranchName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BranchName::Autorelease {
        component: Some(component),
        version,
      } => write!(f, "release-{}-v{}", component, version),
      BranchName::Autorelease { component: None, version } => write!(f, "release-v{}", version),
      BranchName::Default { target_branch } => write!(f, "{}{}", BRANCH_PREFIX, target_branch),
      BranchName::Component {
        target_branch,
        component,
      } => write!(f, "{}{}--components--{}", BRANCH_PREFIX, target_branch, component),
      BranchName::Group { target_branch, group } => {
        write!(f, "{}{}--groups--{}", BRANCH_PREFIX, target_branch, group)
      }
      BranchName::V12Default { target_branch } => write!(f, "release-please/branches/{}", target_branch),
      BranchName::V12Component {
        target_branch,
        component,
      } => write!(f, "release-please/branches/{}/components/{}", target_branch, component),
    }
  }
}

/// Replace anything but word characters with `-`, collapsing runs
pub fn safe_branch_name(name: &str) -> String {
  let replaced = UNSAFE_CHARS.replace_all(name, "-");
  DASH_RUNS.replace_all(&replaced, "-").into_owned()
}
