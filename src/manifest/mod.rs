//! Manifest orchestration
//!
//! [`Manifest`] drives a release cycle for every configured path:
//!
//! 1. resolve the last release of each path ([`resolver`])
//! 2. walk commits newest first and split them by path
//! 3. let plugins preconfigure strategies, then build one candidate per path
//! 4. run the plugin pipeline over the candidates
//! 5. open, update or reopen release pull requests ([`Manifest::create_pull_requests`])
//! 6. once merged, tag releases and flip lifecycle labels ([`Manifest::create_releases`])
//!
//! Labels on pull requests are the only persisted state between runs.

mod pull_requests;
mod releases;
pub mod resolver;

use crate::core::config::{
  DEFAULT_MANIFEST_FILE, ManifestConfig, ManifestOptions, ReleaserConfig, RepositoryConfig, parse_versions_manifest,
};
use crate::core::error::{ConfigError, ReleaseError, ReleaseResult};
use crate::host::{VcsHost, get_optional_file};
use crate::plugins::{Merge, MergeOptions, Plugin, PluginContext, build_plugins};
use crate::release::candidate::{CandidateReleasePullRequest, Release};
use crate::release::commit::{Commit, CommitOverlay, parse_conventional_commits};
use crate::release::split::{CommitSplit, commits_after_sha};
use crate::release::tag::TagName;
use crate::release::updater::{Update, Updater};
use crate::release::version::VersionsMap;
use crate::strategy::{BuiltinStrategies, StrategiesByPath, Strategy, StrategyFactory};
use crate::ui::progress::TaskProgress;
use futures::TryStreamExt;
use futures::future::join_all;
use semver::Version;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run-wide settings given on the command line, applied over the config file
#[derive(Debug, Clone, Default)]
pub struct ManifestOverrides {
  pub separate_pull_requests: Option<bool>,
  pub draft_pull_request: Option<bool>,
  pub labels: Option<Vec<String>>,
  pub release_labels: Option<Vec<String>>,
  pub skip_labeling: Option<bool>,
  pub sequential_calls: Option<bool>,
  pub release_search_depth: Option<usize>,
  pub commit_search_depth: Option<usize>,
  pub bootstrap_sha: Option<String>,
  pub last_release_sha: Option<String>,
}

impl ManifestOverrides {
  fn apply(self, options: &mut ManifestOptions) {
    if let Some(separate) = self.separate_pull_requests {
      options.separate_pull_requests = separate;
    }
    if let Some(draft) = self.draft_pull_request {
      options.draft_pull_request = draft;
    }
    if let Some(labels) = self.labels {
      options.labels = labels;
    }
    if let Some(labels) = self.release_labels {
      options.release_labels = labels;
    }
    if let Some(skip) = self.skip_labeling {
      options.skip_labeling = skip;
    }
    if let Some(sequential) = self.sequential_calls {
      options.sequential_calls = sequential;
    }
    if let Some(depth) = self.release_search_depth {
      options.release_search_depth = depth;
    }
    if let Some(depth) = self.commit_search_depth {
      options.commit_search_depth = depth;
    }
    if self.bootstrap_sha.is_some() {
      options.bootstrap_sha = self.bootstrap_sha;
    }
    if self.last_release_sha.is_some() {
      options.last_release_sha = self.last_release_sha;
    }
  }
}

/// Release orchestrator for one target branch
pub struct Manifest {
  host: Arc<dyn VcsHost>,
  target_branch: String,
  repository_config: RepositoryConfig,
  released_versions: VersionsMap,
  manifest_path: String,
  options: ManifestOptions,
  strategy_factory: Arc<dyn StrategyFactory>,
  extra_plugins: Vec<Box<dyn Plugin>>,
  show_progress: bool,
}

impl Manifest {
  pub fn new(
    host: Arc<dyn VcsHost>,
    target_branch: impl Into<String>,
    repository_config: RepositoryConfig,
    released_versions: VersionsMap,
    options: ManifestOptions,
  ) -> Self {
    let target_branch = target_branch.into();
    let strategy_factory = Arc::new(BuiltinStrategies::new(Arc::clone(&host), target_branch.clone()));
    Self {
      host,
      target_branch,
      repository_config,
      released_versions,
      manifest_path: DEFAULT_MANIFEST_FILE.to_string(),
      options,
      strategy_factory,
      extra_plugins: Vec::new(),
      show_progress: false,
    }
  }

  /// Load the config and versions manifest from the target branch
  pub async fn from_config_files(
    host: Arc<dyn VcsHost>,
    target_branch: &str,
    config_path: &str,
    manifest_path: &str,
    overrides: ManifestOverrides,
  ) -> ReleaseResult<Self> {
    let config_content = read_required_file(host.as_ref(), config_path, target_branch, "config file").await?;
    let manifest_content =
      read_required_file(host.as_ref(), manifest_path, target_branch, "versions manifest").await?;

    let (repository_config, mut options) = ManifestConfig::parse(&config_content, config_path)?.resolve()?;
    let released_versions = parse_versions_manifest(&manifest_content, manifest_path)?;
    overrides.apply(&mut options);
    info!(
      "loaded {} packages from {} on {}",
      repository_config.len(),
      config_path,
      target_branch
    );

    Ok(Self::new(host, target_branch, repository_config, released_versions, options).with_manifest_path(manifest_path))
  }

  /// Single component without a versions manifest. The last release is looked up from
  /// merged pull requests, releases and tags.
  pub async fn from_config(
    host: Arc<dyn VcsHost>,
    target_branch: &str,
    config: ReleaserConfig,
    path: &str,
  ) -> ReleaseResult<Self> {
    let factory = BuiltinStrategies::new(Arc::clone(&host), target_branch);
    let strategy = factory.build(path, &config)?;
    let prefix = strategy.branch_component().await?;
    let latest = resolver::latest_release_version(host.as_ref(), target_branch, &config, prefix.as_deref(), |v| {
      strategy.is_published_version(v)
    })
    .await?;

    let mut released_versions = VersionsMap::new();
    match latest {
      Some(version) => {
        info!("found latest release {} for {}", version, path);
        released_versions.insert(path.to_string(), version);
      }
      None => info!("no previous release found for {}", path),
    }

    let mut repository_config = RepositoryConfig::new();
    repository_config.insert(path.to_string(), config);
    let options = ManifestOptions {
      separate_pull_requests: true,
      ..Default::default()
    };
    Ok(Self::new(host, target_branch, repository_config, released_versions, options))
  }

  pub fn with_manifest_path(mut self, manifest_path: impl Into<String>) -> Self {
    self.manifest_path = manifest_path.into();
    self
  }

  /// Append a plugin after the configured ones
  pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
    self.extra_plugins.push(plugin);
    self
  }

  pub fn with_strategy_factory(mut self, factory: Arc<dyn StrategyFactory>) -> Self {
    self.strategy_factory = factory;
    self
  }

  /// Draw a progress bar while candidates are built
  pub fn with_progress(mut self, show_progress: bool) -> Self {
    self.show_progress = show_progress;
    self
  }

  pub fn repository_config(&self) -> &RepositoryConfig {
    &self.repository_config
  }

  pub fn options(&self) -> &ManifestOptions {
    &self.options
  }

  pub fn target_branch(&self) -> &str {
    &self.target_branch
  }

  fn build_strategies(&self) -> ReleaseResult<StrategiesByPath> {
    self
      .repository_config
      .iter()
      .map(|(path, config)| Ok((path.clone(), self.strategy_factory.build(path, config)?)))
      .collect()
  }

  /// Await `jobs` one at a time with `sequential_calls`, otherwise concurrently
  async fn run_all<F: Future>(&self, jobs: Vec<F>) -> Vec<F::Output> {
    if !self.options.sequential_calls {
      return join_all(jobs).await;
    }
    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
      results.push(job.await);
    }
    results
  }

  /// Last release of every path. Paths with no release or tag fall back to the versions
  /// manifest, without a SHA, unless the recorded version is `0.0.0`.
  async fn resolve_releases(&self, strategies: &StrategiesByPath) -> ReleaseResult<BTreeMap<String, Release>> {
    let mut releases = resolver::releases_by_path(
      self.host.as_ref(),
      strategies,
      &self.repository_config,
      &self.released_versions,
      self.options.release_search_depth,
    )
    .await?;

    for (path, strategy) in strategies {
      if releases.contains_key(path) {
        continue;
      }
      let Some(version) = self.released_versions.get(path) else {
        continue;
      };
      if *version == Version::new(0, 0, 0) {
        continue;
      }
      let config = strategy.config();
      let component = strategy.component().await?;
      warn!("no release found for {}, using manifest version {}", path, version);
      releases.insert(
        path.clone(),
        Release {
          name: None,
          tag: TagName::new(
            version.clone(),
            component.as_deref(),
            config.tag_separator.as_deref(),
            config.include_v_in_tag,
          ),
          sha: String::new(),
          notes: String::new(),
        },
      );
    }
    Ok(releases)
  }

  /// Last released version of every configured path, `None` when nothing was found
  pub async fn latest_versions(&self) -> ReleaseResult<BTreeMap<String, Option<Version>>> {
    let strategies = self.build_strategies()?;
    let releases = self.resolve_releases(&strategies).await?;
    Ok(
      strategies
        .keys()
        .map(|path| (path.clone(), releases.get(path).map(|r| r.tag.version.clone())))
        .collect(),
    )
  }

  /// Commits on the target branch newest first, back to the oldest release that matters
  async fn commits_since_releases(
    &self,
    strategies: &StrategiesByPath,
    releases: &BTreeMap<String, Release>,
  ) -> ReleaseResult<Vec<Commit>> {
    let release_shas: HashSet<&str> = releases
      .values()
      .map(|r| r.sha.as_str())
      .filter(|sha| !sha.is_empty())
      .collect();
    let needs_bootstrap = strategies
      .keys()
      .any(|path| releases.get(path).is_none_or(|r| r.sha.is_empty()));
    if needs_bootstrap {
      debug!("at least one path has no tagged release, scanning full history");
    }

    let last_release_sha = self.options.last_release_sha.as_deref();
    let bootstrap_sha = self.options.bootstrap_sha.as_deref();
    let mut found: HashSet<String> = HashSet::new();
    let mut commits = Vec::new();
    let mut stream = self
      .host
      .commits(&self.target_branch, Some(self.options.commit_search_depth));
    while let Some(commit) = stream.try_next().await? {
      if release_shas.contains(commit.sha.as_str()) {
        found.insert(commit.sha.clone());
      }
      if last_release_sha == Some(commit.sha.as_str()) {
        info!("reached last release sha {}", commit.sha);
        break;
      }
      if needs_bootstrap && bootstrap_sha == Some(commit.sha.as_str()) {
        info!("reached bootstrap sha {}", commit.sha);
        break;
      }
      if !needs_bootstrap && found.len() >= release_shas.len() {
        debug!("found all release commits");
        break;
      }
      commits.push(commit);
    }
    info!("collected {} commits since the last releases", commits.len());
    Ok(commits)
  }

  /// Candidate release pull requests for the current state of the target branch
  pub async fn build_pull_requests(&self) -> ReleaseResult<Vec<CandidateReleasePullRequest>> {
    info!("building pull requests for {}", self.target_branch);
    let strategies = self.build_strategies()?;
    let releases = self.resolve_releases(&strategies).await?;
    let commits = self.commits_since_releases(&strategies, &releases).await?;

    let splitter = CommitSplit::new(strategies.keys(), true);
    let split = splitter.split(&commits);
    let commits_by_path: BTreeMap<String, Vec<Commit>> = strategies
      .keys()
      .map(|path| {
        let path_commits = splitter.commits_for(path, &commits, &split);
        let release_sha = releases.get(path).map(|r| r.sha.as_str());
        (path.clone(), commits_after_sha(&path_commits, release_sha))
      })
      .collect();

    let mut components_by_path = BTreeMap::new();
    for (path, strategy) in &strategies {
      if let Some(component) = strategy.component().await? {
        components_by_path.insert(path.clone(), component);
      }
    }
    let context = Arc::new(PluginContext {
      host: Arc::clone(&self.host),
      target_branch: self.target_branch.clone(),
      manifest_path: self.manifest_path.clone(),
      repository_config: self.repository_config.clone(),
      labels: self.options.labels.clone(),
      components_by_path,
      strategy_factory: Arc::clone(&self.strategy_factory),
    });
    let configured = build_plugins(&self.options.plugins, &context, self.options.separate_pull_requests);
    let implicit_merge = (!self.options.separate_pull_requests).then(|| {
      Merge::new(
        &self.target_branch,
        MergeOptions {
          pull_request_title_pattern: self.options.group_pull_request_title_pattern.clone(),
          ..Default::default()
        },
      )
    });
    let pipeline: Vec<&dyn Plugin> = configured
      .iter()
      .map(|p| p.as_ref())
      .chain(self.extra_plugins.iter().map(|p| p.as_ref()))
      .chain(implicit_merge.as_ref().map(|m| m as &dyn Plugin))
      .collect();

    let mut strategies = strategies;
    let mut overlay = CommitOverlay::new();
    for plugin in &pipeline {
      debug!("running {} preconfigure", plugin.name());
      let (next, added) = plugin.preconfigure(strategies, &commits_by_path, &releases).await?;
      strategies = next;
      overlay = overlay.merge(added);
    }

    let progress = self
      .show_progress
      .then(|| TaskProgress::new(strategies.len(), "Building candidates"));
    let jobs: Vec<_> = strategies
      .iter()
      .map(|(path, strategy)| {
        let path_commits = overlay.apply(path, commits_by_path.get(path).map(Vec::as_slice).unwrap_or(&[]));
        let release = releases.get(path);
        let progress = progress.clone();
        let pipeline = &pipeline;
        async move {
          let built = self
            .build_candidate(path, strategy.as_ref(), &path_commits, release, pipeline)
            .await;
          if let Some(progress) = progress {
            progress.inc();
          }
          built
        }
      })
      .collect();

    let mut candidates = Vec::new();
    for built in self.run_all(jobs).await {
      if let Some(candidate) = built? {
        candidates.push(candidate);
      }
    }
    info!("built {} raw candidates", candidates.len());

    for plugin in &pipeline {
      debug!("running {} plugin", plugin.name());
      candidates = plugin.run(candidates).await?;
    }
    info!("{} release pull requests after plugins", candidates.len());
    Ok(candidates)
  }

  async fn build_candidate(
    &self,
    path: &str,
    strategy: &dyn Strategy,
    commits: &[Commit],
    latest_release: Option<&Release>,
    pipeline: &[&dyn Plugin],
  ) -> ReleaseResult<Option<CandidateReleasePullRequest>> {
    debug!("building candidate for {} from {} commits", path, commits.len());
    let mut conventional = parse_conventional_commits(commits);
    for plugin in pipeline {
      conventional = plugin.process_commits(conventional);
    }

    let config = strategy.config();
    let draft = config.draft_pull_request || self.options.draft_pull_request;
    let Some(mut pull_request) = strategy
      .build_release_pull_request(&conventional, latest_release, draft, &self.options.labels)
      .await?
    else {
      return Ok(None);
    };

    if let Some(version) = pull_request.version.clone()
      && strategy.is_published_version(&version)
    {
      let mut versions_map = VersionsMap::new();
      versions_map.insert(path.to_string(), version);
      pull_request.updates.push(Update::new(
        self.manifest_path.clone(),
        Updater::ReleaseManifest { versions_map },
      ));
    }
    Ok(Some(CandidateReleasePullRequest::new(path, pull_request, config.clone())))
  }
}

async fn read_required_file(host: &dyn VcsHost, path: &str, branch: &str, kind: &str) -> ReleaseResult<String> {
  get_optional_file(host, path, branch).await?.ok_or_else(|| {
    ReleaseError::Config(ConfigError::MissingRequiredFile {
      path: path.to_string(),
      kind: kind.to_string(),
    })
  })
}

/// Fold per-item results into successes, or one error covering every failure
fn collect_results<T>(results: Vec<ReleaseResult<T>>) -> ReleaseResult<Vec<T>> {
  let mut values = Vec::new();
  let mut errors = Vec::new();
  for result in results {
    match result {
      Ok(value) => values.push(value),
      Err(err) => errors.push(err),
    }
  }
  match errors.len() {
    0 => Ok(values),
    1 => Err(errors.remove(0)),
    _ => Err(ReleaseError::Aggregate(errors)),
  }
}
