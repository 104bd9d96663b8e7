//! Test helpers for integration tests

use anyhow::{Context, Result};
use release_rail::Manifest;
use release_rail::core::config::{DEFAULT_CONFIG_FILE, DEFAULT_MANIFEST_FILE};
use release_rail::host::InMemoryHost;
use release_rail::manifest::ManifestOverrides;
use release_rail::release::commit::Commit;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;

pub const MAIN: &str = "main";
pub const PENDING: &str = "autorelease: pending";
pub const TAGGED: &str = "autorelease: tagged";

/// In-memory repository with a config file and versions manifest on `main`
pub fn hosted_repo(config: &str, manifest: &str) -> Arc<InMemoryHost> {
  let host = InMemoryHost::new("acme", "widgets", MAIN);
  host.set_file(MAIN, DEFAULT_CONFIG_FILE, config);
  host.set_file(MAIN, DEFAULT_MANIFEST_FILE, manifest);
  Arc::new(host)
}

/// A commit touching `files`
pub fn commit(sha: &str, message: &str, files: &[&str]) -> Commit {
  Commit::new(sha, message).with_files(files.iter().copied())
}

/// Load the orchestrator from the files currently on `main`
pub async fn load_manifest(host: &Arc<InMemoryHost>) -> Result<Manifest> {
  Manifest::from_config_files(
    host.clone(),
    MAIN,
    DEFAULT_CONFIG_FILE,
    DEFAULT_MANIFEST_FILE,
    ManifestOverrides::default(),
  )
  .await
  .context("Failed to load manifest")
}

/// A git checkout with a cargo workspace
pub struct TestWorkspace {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestWorkspace {
  /// Create a repository on `main` with a root workspace manifest
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;
    git(&path, &["config", "commit.gpgsign", "false"])?;
    git(&path, &["config", "tag.gpgsign", "false"])?;

    std::fs::write(
      path.join("Cargo.toml"),
      r#"[workspace]
members = ["crates/*"]
resolver = "2"
"#,
    )?;

    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "chore: initial workspace"])?;

    Ok(Self { _root: root, path })
  }

  /// Add a crate under `crates/`; `deps` are other workspace crates and their versions
  pub fn add_crate(&self, name: &str, version: &str, deps: &[(&str, &str)]) -> Result<PathBuf> {
    let crate_path = self.path.join("crates").join(name);
    std::fs::create_dir_all(crate_path.join("src"))?;

    let mut cargo_toml = format!(
      "[package]\nname = \"{}\"\nversion = \"{}\"\nedition = \"2021\"\n\n[dependencies]\n",
      name, version
    );
    for (dep_name, dep_version) in deps {
      cargo_toml.push_str(&format!(
        "{} = {{ path = \"../{}\", version = \"{}\" }}\n",
        dep_name, dep_name, dep_version
      ));
    }
    std::fs::write(crate_path.join("Cargo.toml"), cargo_toml)?;
    std::fs::write(crate_path.join("src/lib.rs"), format!("//! {} crate\n", name))?;
    Ok(crate_path)
  }

  pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
    let file_path = self.path.join(path);
    if let Some(parent) = file_path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(file_path, content)?;
    Ok(())
  }

  /// Commit everything, returning the new HEAD
  pub fn commit(&self, message: &str) -> Result<String> {
    git(&self.path, &["add", "."])?;
    git(&self.path, &["commit", "-m", message])?;
    let output = git(&self.path, &["rev-parse", "HEAD"])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  pub fn tag(&self, name: &str) -> Result<()> {
    git(&self.path, &["tag", name])?;
    Ok(())
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run the release-rail binary
pub fn run_release_rail(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_release-rail");

  let output = Command::new(bin)
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run release-rail")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "release-rail command failed: release-rail {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}
