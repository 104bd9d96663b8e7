//! Release one group at a time
//!
//! Groups are checked in priority order; the first with any candidate is the only one
//! released this cycle. With no prioritized group present, everything goes through.

use super::Plugin;
use crate::core::error::ReleaseResult;
use crate::release::candidate::CandidateReleasePullRequest;
use async_trait::async_trait;
use tracing::debug;

pub struct GroupPriority {
  groups: Vec<String>,
}

impl GroupPriority {
  pub fn new(groups: Vec<String>) -> Self {
    Self { groups }
  }
}

#[async_trait]
impl Plugin for GroupPriority {
  fn name(&self) -> &'static str {
    "group-priority"
  }

  async fn run(&self, candidates: Vec<CandidateReleasePullRequest>) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    for group in &self.groups {
      if candidates.iter().any(|c| c.pull_request.group.as_ref() == Some(group)) {
        debug!("found preferred group {}", group);
        return Ok(
          candidates
            .into_iter()
            .filter(|c| c.pull_request.group.as_ref() == Some(group))
            .collect(),
        );
      }
    }
    debug!("no preferred group found, returning full set");
    Ok(candidates)
  }
}
