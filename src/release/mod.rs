//! Release protocol building blocks
//!
//! Everything that has a wire or text format on the host lives here: tags, branch
//! names, pull request titles and bodies, lifecycle labels, commit parsing, release
//! notes and file updaters. The orchestration in [`crate::manifest`] composes them.

pub mod body;
pub mod branch;
pub mod candidate;
pub mod changelog;
pub mod commit;
pub mod labels;
pub mod pull_request;
pub mod split;
pub mod tag;
pub mod title;
pub mod updater;
pub mod version;

pub use body::{PullRequestBody, ReleaseData};
pub use branch::BranchName;
pub use candidate::{CandidateRelease, CandidateReleasePullRequest, CreatedRelease, Release, ReleasePullRequest};
pub use commit::{Commit, CommitOverlay, ConventionalCommit};
pub use pull_request::{PullRequest, PullRequestState};
pub use tag::TagName;
pub use title::PullRequestTitle;
pub use updater::{Update, Updater};
pub use version::{VersionBump, VersioningStrategy, VersionsMap};
