//! Capitalize commit descriptions for the changelog
//!
//! `fix: handle tabs` becomes `fix: Handle tabs`. The type and scope are untouched, and
//! words in the special set (`gRPC`, `npm`, ...) keep their casing.

use super::Plugin;
use crate::release::commit::ConventionalCommit;
use async_trait::async_trait;

const DEFAULT_SPECIAL_WORDS: &[&str] = &["gRPC", "npm"];

pub struct SentenceCase {
  special_words: Vec<String>,
}

impl SentenceCase {
  pub fn new(special_words: Option<Vec<String>>) -> Self {
    Self {
      special_words: special_words
        .unwrap_or_else(|| DEFAULT_SPECIAL_WORDS.iter().map(|w| w.to_string()).collect()),
    }
  }

  pub fn to_sentence_case(&self, input: &str) -> String {
    let trimmed = input.trim_start();
    let leading = &input[..input.len() - trimmed.len()];
    let first_word = trimmed.split_whitespace().next().unwrap_or_default();
    if self.special_words.iter().any(|w| w == first_word) {
      return input.to_string();
    }
    let mut chars = trimmed.chars();
    match chars.next() {
      Some(first) if first.is_lowercase() => format!("{}{}{}", leading, first.to_uppercase(), chars.as_str()),
      _ => input.to_string(),
    }
  }
}

#[async_trait]
impl Plugin for SentenceCase {
  fn name(&self) -> &'static str {
    "sentence-case"
  }

  fn process_commits(&self, commits: Vec<ConventionalCommit>) -> Vec<ConventionalCommit> {
    commits
      .into_iter()
      .map(|mut commit| {
        commit.bare_message = self.to_sentence_case(&commit.bare_message);
        for note in &mut commit.notes {
          note.text = self.to_sentence_case(&note.text);
        }
        commit
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::commit::{Commit, parse_conventional_commits};

  #[test]
  fn test_capitalizes_first_word() {
    let plugin = SentenceCase::new(None);
    assert_eq!(plugin.to_sentence_case("handle tabs"), "Handle tabs");
    assert_eq!(plugin.to_sentence_case("Already fine"), "Already fine");
    assert_eq!(plugin.to_sentence_case("gRPC transport"), "gRPC transport");
    assert_eq!(plugin.to_sentence_case("npm publish"), "npm publish");
  }

  #[test]
  fn test_custom_special_words() {
    let plugin = SentenceCase::new(Some(vec!["iOS".to_string()]));
    assert_eq!(plugin.to_sentence_case("iOS support"), "iOS support");
    assert_eq!(plugin.to_sentence_case("npm publish"), "Npm publish");
  }

  #[test]
  fn test_keeps_type_and_scope() {
    let commits = parse_conventional_commits(&[Commit::new("abc", "fix(parser): handle tabs")]);
    let processed = SentenceCase::new(None).process_commits(commits);
    assert_eq!(processed[0].commit_type, "fix");
    assert_eq!(processed[0].scope.as_deref(), Some("parser"));
    assert_eq!(processed[0].bare_message, "Handle tabs");
  }
}
