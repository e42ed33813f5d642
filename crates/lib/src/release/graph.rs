//! Package dependency graph.
//!
//! Packages are read without knowing about each other, then linked into a
//! [`DependencyGraph`]: an arena where every package gets a stable
//! [`PackageId`] and dependencies are id lists. Linking either resolves
//! every declared dependency or fails without producing a graph.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

/// Anything that declares dependencies on other items by name.
pub trait Dependent {
  fn name(&self) -> &str;
  fn dependency_names(&self) -> &[String];
}

/// Stable index of a package inside a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(usize);

impl PackageId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for PackageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("cannot find dependency '{dependency}' of package '{package}'")]
  DependencyNotFound { package: String, dependency: String },

  #[error("package '{0}' is defined more than once")]
  DuplicatePackage(String),

  #[error("cyclic dependency between packages: {}", .packages.join(", "))]
  CyclicDependency { packages: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
  nodes: Vec<T>,
  deps: Vec<Vec<PackageId>>,
  by_name: HashMap<String, PackageId>,
}

impl<T> Default for DependencyGraph<T> {
  fn default() -> Self {
    Self {
      nodes: Vec::new(),
      deps: Vec::new(),
      by_name: HashMap::new(),
    }
  }
}

impl<T: Dependent> DependencyGraph<T> {
  /// Resolve every declared dependency name against `items`.
  pub fn link(items: Vec<T>) -> Result<Self, GraphError> {
    let mut by_name = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
      if by_name.insert(item.name().to_string(), PackageId(i)).is_some() {
        return Err(GraphError::DuplicatePackage(item.name().to_string()));
      }
    }

    let mut deps = Vec::with_capacity(items.len());
    for item in &items {
      let mut ids = Vec::with_capacity(item.dependency_names().len());
      for dep in item.dependency_names() {
        let id = by_name.get(dep).ok_or_else(|| GraphError::DependencyNotFound {
          package: item.name().to_string(),
          dependency: dep.clone(),
        })?;
        ids.push(*id);
      }
      deps.push(ids);
    }

    Ok(Self {
      nodes: items,
      deps,
      by_name,
    })
  }
}

impl<T> DependencyGraph<T> {
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn ids(&self) -> impl Iterator<Item = PackageId> + use<T> {
    (0..self.nodes.len()).map(PackageId)
  }

  pub fn get(&self, id: PackageId) -> &T {
    &self.nodes[id.0]
  }

  pub fn find(&self, name: &str) -> Option<PackageId> {
    self.by_name.get(name).copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.nodes.iter()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
    self.nodes.iter_mut()
  }

  /// Direct dependencies of `id`, in declaration order.
  pub fn dependencies(&self, id: PackageId) -> &[PackageId] {
    &self.deps[id.0]
  }

  /// Every package reachable from `id`, excluding `id` itself, each once.
  /// Terminates on cycles.
  pub fn resolve_dependencies(&self, id: PackageId) -> Vec<PackageId> {
    let mut seen = HashSet::from([id]);
    let mut out = Vec::new();
    let mut stack: Vec<PackageId> = self.deps[id.0].iter().rev().copied().collect();

    while let Some(next) = stack.pop() {
      if !seen.insert(next) {
        continue;
      }
      out.push(next);
      stack.extend(self.deps[next.0].iter().rev().copied());
    }

    out
  }

  /// All packages ordered so that dependencies come before dependents.
  pub fn sort(&self) -> Result<Vec<PackageId>, GraphError>
  where
    T: Dependent,
  {
    self.sort_ids(&self.ids().collect::<Vec<_>>())
  }

  /// Order `ids` so that dependencies come before dependents. Edges to
  /// packages outside `ids` are ignored.
  pub fn sort_ids(&self, ids: &[PackageId]) -> Result<Vec<PackageId>, GraphError>
  where
    T: Dependent,
  {
    let mut graph: DiGraph<PackageId, ()> = DiGraph::with_capacity(ids.len(), 0);
    let mut nodes: HashMap<PackageId, NodeIndex> = HashMap::with_capacity(ids.len());
    for &id in ids {
      nodes.entry(id).or_insert_with(|| graph.add_node(id));
    }

    for (&id, &dependent) in &nodes {
      for dep in &self.deps[id.0] {
        if let Some(&dependency) = nodes.get(dep) {
          graph.add_edge(dependency, dependent, ());
        }
      }
    }

    match toposort(&graph, None) {
      Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx]).collect()),
      Err(cycle) => {
        let culprit = cycle.node_id();
        let component = tarjan_scc(&graph)
          .into_iter()
          .find(|scc| scc.contains(&culprit))
          .unwrap_or_else(|| vec![culprit]);

        let mut packages: Vec<String> = component
          .into_iter()
          .map(|idx| self.nodes[graph[idx].0].name().to_string())
          .collect();
        packages.sort();
        Err(GraphError::CyclicDependency { packages })
      }
    }
  }
}
