//! Package dependency graph on petgraph
//!
//! ## Graph Structure
//!
//! - **Directed Graph**: `A → B` means "A depends on B"
//! - **Nodes**: workspace packages, carrying an opaque per-format value
//! - **Index**: package name → `NodeIndex`, names are hashed once at build time
//!
//! Update ordering walks the inverted graph ("B is depended on by A") depth-first from
//! the seed packages, tracking the current path to report cycles, then emits the visited
//! packages dependencies-first with ties broken by name.

use crate::core::error::{ConfigError, ReleaseError, ReleaseResult};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, trace, warn};

/// A package and the names of the packages it depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode<T> {
  pub name: String,
  pub deps: Vec<String>,
  pub value: T,
}

impl<T> DependencyNode<T> {
  pub fn new(name: impl Into<String>, deps: Vec<String>, value: T) -> Self {
    Self {
      name: name.into(),
      deps,
      value,
    }
  }
}

/// Dependents adjacency of a [`DependencyGraph`]: for each node, the nodes that depend
/// on it, in ascending name order
#[derive(Debug, Clone)]
pub struct Dependents {
  edges: Vec<Vec<NodeIndex>>,
}

impl Dependents {
  pub fn of(&self, node: NodeIndex) -> &[NodeIndex] {
    self.edges.get(node.index()).map(Vec::as_slice).unwrap_or(&[])
  }
}

/// Dependency graph over workspace packages
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
  graph: DiGraph<DependencyNode<T>, ()>,
  name_to_node: HashMap<String, NodeIndex>,
}

impl<T> Default for DependencyGraph<T> {
  fn default() -> Self {
    Self {
      graph: DiGraph::new(),
      name_to_node: HashMap::new(),
    }
  }
}

impl<T> DependencyGraph<T> {
  /// Build from a name → deps listing. Dependencies that are not packages of the graph
  /// (registry crates, external artifacts) get no edge.
  pub fn build<I>(packages: I) -> Self
  where
    I: IntoIterator<Item = DependencyNode<T>>,
  {
    let mut built = Self::default();
    for node in packages {
      if built.name_to_node.contains_key(&node.name) {
        warn!("duplicate package {} in dependency graph, keeping the first", node.name);
        continue;
      }
      let name = node.name.clone();
      let idx = built.graph.add_node(node);
      built.name_to_node.insert(name, idx);
    }

    let mut edges = Vec::new();
    for idx in built.graph.node_indices() {
      let node = &built.graph[idx];
      for dep in &node.deps {
        match built.name_to_node.get(dep) {
          Some(&dep_idx) => edges.push((idx, dep_idx)),
          None => trace!("{} depends on {} which is outside the graph", node.name, dep),
        }
      }
    }
    for (from, to) in edges {
      built.graph.update_edge(from, to, ());
    }
    built
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn contains(&self, name: &str) -> bool {
    self.name_to_node.contains_key(name)
  }

  pub fn get(&self, name: &str) -> Option<&DependencyNode<T>> {
    self.name_to_node.get(name).map(|&idx| &self.graph[idx])
  }

  /// All package names, sorted
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.name_to_node.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }

  /// Packages in ascending name order
  pub fn nodes(&self) -> Vec<&DependencyNode<T>> {
    self.names().into_iter().filter_map(|name| self.get(name)).collect()
  }

  /// Invert "depends on" into "depended on by"
  pub fn invert(&self) -> Dependents {
    let mut edges: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.graph.node_count()];
    for edge in self.graph.raw_edges() {
      // edge: dependent -> dependency
      edges[edge.target().index()].push(edge.source());
    }
    for dependents in &mut edges {
      dependents.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
    }
    Dependents { edges }
  }

  /// Packages that must be updated when `seeds` change: the seeds plus everything that
  /// transitively depends on them, dependencies first.
  ///
  /// A cycle on a traversed path is a configuration error naming the path. Seeds that
  /// are not in the graph are skipped.
  pub fn order<S: AsRef<str>>(&self, seeds: &[S]) -> ReleaseResult<Vec<&DependencyNode<T>>> {
    let dependents = self.invert();
    let mut visited: HashSet<NodeIndex> = HashSet::new();

    let mut sorted_seeds: Vec<&str> = seeds.iter().map(AsRef::as_ref).collect();
    sorted_seeds.sort_unstable();
    sorted_seeds.dedup();
    debug!("building graph order, seeds: {:?}", sorted_seeds);

    for seed in sorted_seeds {
      let Some(&idx) = self.name_to_node.get(seed) else {
        warn!("package {} not found in dependency graph", seed);
        continue;
      };
      let mut path = Vec::new();
      self.visit_post_order(&dependents, idx, &mut visited, &mut path)?;
    }

    self.dependencies_first(&visited)
  }

  fn visit_post_order(
    &self,
    dependents: &Dependents,
    idx: NodeIndex,
    visited: &mut HashSet<NodeIndex>,
    path: &mut Vec<NodeIndex>,
  ) -> ReleaseResult<()> {
    if path.contains(&idx) {
      let mut names: Vec<String> = path.iter().map(|&i| self.graph[i].name.clone()).collect();
      names.push(self.graph[idx].name.clone());
      return Err(ReleaseError::Config(ConfigError::GraphCycle { path: names }));
    }
    if visited.contains(&idx) {
      return Ok(());
    }

    path.push(idx);
    for &dependent in dependents.of(idx) {
      trace!("visiting {} from {}", self.graph[dependent].name, self.graph[idx].name);
      self.visit_post_order(dependents, dependent, visited, path)?;
    }
    path.pop();

    visited.insert(idx);
    Ok(())
  }

  /// Topological order of `subset` (dependencies before dependents), ties by name
  fn dependencies_first(&self, subset: &HashSet<NodeIndex>) -> ReleaseResult<Vec<&DependencyNode<T>>> {
    let mut pending: HashMap<NodeIndex, usize> = subset
      .iter()
      .map(|&idx| {
        let count = self
          .graph
          .neighbors(idx)
          .filter(|dep| subset.contains(dep))
          .collect::<HashSet<_>>()
          .len();
        (idx, count)
      })
      .collect();

    let mut ready: BTreeSet<(&str, NodeIndex)> = pending
      .iter()
      .filter(|(_, count)| **count == 0)
      .map(|(&idx, _)| (self.graph[idx].name.as_str(), idx))
      .collect();

    let dependents = self.invert();
    let mut ordered = Vec::with_capacity(subset.len());
    while let Some(next) = ready.pop_first() {
      let (_, idx) = next;
      ordered.push(&self.graph[idx]);
      for &dependent in dependents.of(idx) {
        if let Some(count) = pending.get_mut(&dependent) {
          *count -= 1;
          if *count == 0 {
            ready.insert((self.graph[dependent].name.as_str(), dependent));
          }
        }
      }
    }

    if ordered.len() < subset.len() {
      let mut stuck: Vec<String> = pending
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(&idx, _)| self.graph[idx].name.clone())
        .collect();
      stuck.sort();
      return Err(ReleaseError::Config(ConfigError::GraphCycle { path: stuck }));
    }
    Ok(ordered)
  }
}
