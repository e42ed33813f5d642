use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ReleaseError;
use super::graph::{DependencyGraph, Dependent, PackageId};
use super::manifest::{JobSpec, PropertyDefinition};
use crate::resource::Resource;

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
  resource: Resource,
  /// Template source file -> rendered target path.
  pub templates: BTreeMap<String, String>,
  pub package_names: Vec<String>,
  pub properties: BTreeMap<String, PropertyDefinition>,
  package_ids: Vec<PackageId>,
  extracted_path: Option<PathBuf>,
}

impl Job {
  pub fn new(resource: Resource) -> Self {
    Self {
      resource,
      templates: BTreeMap::new(),
      package_names: Vec::new(),
      properties: BTreeMap::new(),
      package_ids: Vec::new(),
      extracted_path: None,
    }
  }

  pub fn from_spec(resource: Resource, spec: JobSpec) -> Self {
    Self {
      templates: spec.templates,
      package_names: spec.packages,
      properties: spec.properties,
      ..Self::new(resource)
    }
  }

  pub fn with_extracted_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.extracted_path = Some(path.into());
    self
  }

  pub fn name(&self) -> &str {
    self.resource.name()
  }

  pub fn fingerprint(&self) -> &str {
    self.resource.fingerprint()
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }

  pub fn resource_mut(&mut self) -> &mut Resource {
    &mut self.resource
  }

  pub fn extracted_path(&self) -> Option<&Path> {
    self.extracted_path.as_deref()
  }

  /// Packages resolved by [`Job::attach_packages`].
  pub fn package_ids(&self) -> &[PackageId] {
    &self.package_ids
  }

  /// Resolve `package_names` against `packages`. On failure the job is
  /// left unchanged.
  pub fn attach_packages<T: Dependent>(&mut self, packages: &DependencyGraph<T>) -> Result<(), ReleaseError> {
    let ids = self
      .package_names
      .iter()
      .map(|name| {
        packages.find(name).ok_or_else(|| ReleaseError::JobPackageNotFound {
          job: self.name().to_string(),
          package: name.clone(),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    self.package_ids = ids;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::pkg::Package;

  fn packages() -> DependencyGraph<Package> {
    DependencyGraph::link(vec![
      Package::new(Resource::existing("ruby", "fp1"), vec![]),
      Package::new(Resource::existing("nginx", "fp2"), vec![]),
    ])
    .unwrap()
  }

  #[test]
  fn attaches_named_packages() {
    let graph = packages();
    let mut job = Job::new(Resource::existing("web", "fp"));
    job.package_names = vec!["nginx".into(), "ruby".into()];

    job.attach_packages(&graph).unwrap();
    let names: Vec<&str> = job.package_ids().iter().map(|id| graph.get(*id).name()).collect();
    assert_eq!(names, vec!["nginx", "ruby"]);
  }

  #[test]
  fn unknown_package_leaves_job_untouched() {
    let graph = packages();
    let mut job = Job::new(Resource::existing("web", "fp"));
    job.package_names = vec!["ruby".into(), "missing".into()];

    let err = job.attach_packages(&graph).unwrap_err();
    assert!(err.to_string().contains("'web'"));
    assert!(err.to_string().contains("'missing'"));
    assert!(job.package_ids().is_empty());
  }
}
