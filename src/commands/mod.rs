//! CLI commands
//!
//! Every command works on a local checkout through [`LocalGitHost`], which is read-only:
//! commands inspect and plan, they never open pull requests or tag releases.
//!
//! - **plan**: dry-run of a release cycle, listing the release pull requests it would open
//! - **versions**: last released version of every configured path
//! - **graph**: update order of a cargo workspace

pub mod graph;
pub mod plan;
pub mod versions;

pub use graph::run_graph;
pub use plan::run_plan;
pub use versions::run_versions;

use crate::core::error::ReleaseResult;
use crate::host::{LocalGitHost, VcsHost};
use crate::manifest::{Manifest, ManifestOverrides};
use std::path::PathBuf;
use std::sync::Arc;

/// Repository selection shared by all commands
#[derive(Debug, Clone)]
pub struct RepoArgs {
  pub repo: PathBuf,
  /// Defaults to the checked out branch
  pub target_branch: Option<String>,
  pub config_file: String,
  pub manifest_file: String,
}

impl RepoArgs {
  pub fn open_host(&self) -> ReleaseResult<Arc<LocalGitHost>> {
    Ok(Arc::new(LocalGitHost::open(&self.repo, self.target_branch.as_deref())?))
  }

  /// Host plus a manifest loaded from its target branch
  pub async fn load_manifest(&self, overrides: ManifestOverrides) -> ReleaseResult<(Arc<LocalGitHost>, Manifest)> {
    let host = self.open_host()?;
    let branch = host.repository().default_branch.clone();
    let manifest = Manifest::from_config_files(
      Arc::clone(&host) as Arc<dyn VcsHost>,
      &branch,
      &self.config_file,
      &self.manifest_file,
      overrides,
    )
    .await?;
    Ok((host, manifest))
  }
}
