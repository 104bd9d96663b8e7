//! `release-rail graph`: update order of a local cargo workspace
//!
//! Seeding with a set of crates prints everything that would be bumped after them,
//! dependencies first. Without seeds every member is ordered.

use super::RepoArgs;
use crate::core::error::ReleaseResult;
use crate::graph::{DependencyGraph, DependencyNode};
use crate::host::VcsHost;
use crate::plugins::workspace::WorkspacePackage;
use crate::plugins::workspace::cargo::load_workspace;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct OrderedPackage<'a> {
  name: &'a str,
  path: &'a str,
  version: String,
  /// Workspace members this package depends on
  depends_on: Vec<&'a str>,
}

pub async fn run_graph(args: &RepoArgs, seeds: Vec<String>, json: bool) -> ReleaseResult<()> {
  let host = args.open_host()?;
  let branch = host.repository().default_branch.clone();
  let packages = load_workspace(host.as_ref(), &branch).await?;
  let graph: DependencyGraph<WorkspacePackage> = DependencyGraph::build(
    packages
      .into_iter()
      .map(|package| DependencyNode::new(package.name.clone(), package.deps.clone(), package)),
  );

  let seeds: Vec<String> = if seeds.is_empty() {
    graph.names().into_iter().map(str::to_string).collect()
  } else {
    seeds
  };
  let ordered: Vec<OrderedPackage<'_>> = graph
    .order(&seeds)?
    .into_iter()
    .map(|node| OrderedPackage {
      name: &node.name,
      path: &node.value.path,
      version: node.value.version.to_string(),
      depends_on: node
        .deps
        .iter()
        .map(String::as_str)
        .filter(|dep| graph.contains(dep))
        .collect(),
    })
    .collect();

  if json {
    println!("{}", serde_json::to_string_pretty(&ordered)?);
    return Ok(());
  }

  println!("\nWorkspace update order ({} packages)\n", ordered.len());
  for (i, package) in ordered.iter().enumerate() {
    println!("{:>3}. {} {} ({})", i + 1, package.name, package.version, package.path);
    if !package.depends_on.is_empty() {
      println!("       depends on: {}", package.depends_on.join(", "));
    }
  }
  Ok(())
}
