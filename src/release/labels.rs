//! Lifecycle labels
//!
//! Labels are the only persisted lifecycle signal: a release pull request is pending
//! until its release is created, then tagged.

pub const DEFAULT_LABELS: &[&str] = &["autorelease: pending"];
pub const DEFAULT_RELEASE_LABELS: &[&str] = &["autorelease: tagged"];
pub const DEFAULT_SNAPSHOT_LABELS: &[&str] = &["autorelease: snapshot"];
pub const DEFAULT_PRERELEASE_LABELS: &[&str] = &["autorelease: pre-release"];
pub const SNOOZE_LABEL: &str = "autorelease: snooze";
pub const CUSTOM_VERSION_LABEL: &str = "autorelease: custom version";

pub fn to_owned_labels(labels: &[&str]) -> Vec<String> {
  labels.iter().map(|l| l.to_string()).collect()
}

/// Union of label lists, first occurrence wins
pub fn union_labels<'a, I>(lists: I) -> Vec<String>
where
  I: IntoIterator<Item = &'a [String]>,
{
  let mut labels: Vec<String> = Vec::new();
  for list in lists {
    for label in list {
      if !labels.contains(label) {
        labels.push(label.clone());
      }
    }
  }
  labels
}
