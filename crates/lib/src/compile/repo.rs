use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CompiledPackageRecord;
use crate::index::{FileIndex, IndexError};
use crate::release::{DependencyGraph, Package, PackageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordKey {
  name: String,
  fingerprint: String,
  dependency_key: String,
}

/// Cache of compiled packages keyed by name, fingerprint and the
/// fingerprints of every transitive dependency.
pub struct CompiledPackageRepo {
  index: FileIndex<RecordKey, CompiledPackageRecord>,
}

impl CompiledPackageRepo {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      index: FileIndex::new(path),
    }
  }

  pub fn find(
    &self,
    graph: &DependencyGraph<Package>,
    id: PackageId,
  ) -> Result<Option<CompiledPackageRecord>, IndexError> {
    match self.index.find(&key(graph, id)) {
      Ok(record) => Ok(Some(record)),
      Err(IndexError::NotFound) => Ok(None),
      Err(e) => Err(e),
    }
  }

  pub fn save(
    &self,
    graph: &DependencyGraph<Package>,
    id: PackageId,
    record: CompiledPackageRecord,
  ) -> Result<(), IndexError> {
    let key = key(graph, id);
    debug!(package = %key.name, dependency_key = %key.dependency_key, "saving compiled package");
    self.index.save(key, record)
  }
}

fn key(graph: &DependencyGraph<Package>, id: PackageId) -> RecordKey {
  let pkg = graph.get(id);
  RecordKey {
    name: pkg.name().to_string(),
    fingerprint: pkg.fingerprint().to_string(),
    dependency_key: dependency_key(graph, id),
  }
}

/// Sorted, comma-joined `name:fingerprint` of every transitive dependency.
pub fn dependency_key(graph: &DependencyGraph<Package>, id: PackageId) -> String {
  let mut parts: Vec<String> = graph
    .resolve_dependencies(id)
    .into_iter()
    .map(|dep| {
      let pkg = graph.get(dep);
      format!("{}:{}", pkg.name(), pkg.fingerprint())
    })
    .collect();
  parts.sort();
  parts.join(",")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::Resource;
  use crate::util::digest::{DigestAlgorithm, calculate_bytes};
  use tempfile::tempdir;

  fn graph(fingerprints: &[(&str, &str, &[&str])]) -> DependencyGraph<Package> {
    DependencyGraph::link(
      fingerprints
        .iter()
        .map(|(name, fp, deps)| {
          Package::new(
            Resource::existing(*name, *fp),
            deps.iter().map(|d| d.to_string()).collect(),
          )
        })
        .collect(),
    )
    .unwrap()
  }

  fn record(id: &str) -> CompiledPackageRecord {
    CompiledPackageRecord {
      blob_id: id.to_string(),
      blob_sha1: calculate_bytes(id.as_bytes(), DigestAlgorithm::Sha1),
    }
  }

  #[test]
  fn dependency_key_covers_transitive_closure_in_sorted_order() {
    let g = graph(&[("c", "fc", &[]), ("b", "fb", &["c"]), ("a", "fa", &["b", "c"])]);
    assert_eq!(dependency_key(&g, g.find("a").unwrap()), "b:fb,c:fc");
    assert_eq!(dependency_key(&g, g.find("c").unwrap()), "");
  }

  #[test]
  fn find_after_save() {
    let temp = tempdir().unwrap();
    let repo = CompiledPackageRepo::new(temp.path().join("compiled.yml"));
    let g = graph(&[("b", "fb", &[]), ("a", "fa", &["b"])]);
    let a = g.find("a").unwrap();

    assert_eq!(repo.find(&g, a).unwrap(), None);
    repo.save(&g, a, record("blob-a")).unwrap();
    assert_eq!(repo.find(&g, a).unwrap(), Some(record("blob-a")));
  }

  #[test]
  fn grandchild_fingerprint_change_invalidates_entry() {
    let temp = tempdir().unwrap();
    let repo = CompiledPackageRepo::new(temp.path().join("compiled.yml"));

    let before = graph(&[("c", "fc1", &[]), ("b", "fb", &["c"]), ("a", "fa", &["b"])]);
    repo.save(&before, before.find("a").unwrap(), record("blob-a")).unwrap();

    let after = graph(&[("c", "fc2", &[]), ("b", "fb", &["c"]), ("a", "fa", &["b"])]);
    assert_eq!(repo.find(&after, after.find("a").unwrap()).unwrap(), None);
    assert!(repo.find(&before, before.find("a").unwrap()).unwrap().is_some());
  }
}
