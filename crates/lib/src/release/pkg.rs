use std::io;
use std::path::{Path, PathBuf};

use super::graph::Dependent;
use crate::resource::{Resource, ResourceError};
use crate::util::digest::DigestAlgorithm;

/// Source package: a resource plus the names of the packages it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  resource: Resource,
  dependency_names: Vec<String>,
  extracted_path: Option<PathBuf>,
}

impl Package {
  pub fn new(resource: Resource, dependency_names: Vec<String>) -> Self {
    Self {
      resource,
      dependency_names,
      extracted_path: None,
    }
  }

  /// Remember where the package sources were unpacked.
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

  /// Remove the unpacked sources, if any.
  pub fn clean_up(&self) -> io::Result<()> {
    match &self.extracted_path {
      Some(path) => match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
      },
      None => Ok(()),
    }
  }

  pub fn prefixed(&self, prefix: &str) -> Self {
    Self {
      resource: self.resource.prefixed(prefix),
      ..self.clone()
    }
  }

  pub fn rehash_with_calculator(&self, algorithm: DigestAlgorithm) -> Result<Self, ResourceError> {
    Ok(Self {
      resource: self.resource.rehash_with_calculator(algorithm)?,
      ..self.clone()
    })
  }
}

impl Dependent for Package {
  fn name(&self) -> &str {
    self.resource.name()
  }

  fn dependency_names(&self) -> &[String] {
    &self.dependency_names
  }
}

/// Package compiled against a particular stemcell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPackage {
  resource: Resource,
  dependency_names: Vec<String>,
  /// `<os>/<version>` of the stemcell the package was compiled on.
  os_version_slug: String,
}

impl CompiledPackage {
  pub fn new(resource: Resource, dependency_names: Vec<String>, os_version_slug: impl Into<String>) -> Self {
    Self {
      resource,
      dependency_names,
      os_version_slug: os_version_slug.into(),
    }
  }

  pub fn name(&self) -> &str {
    self.resource.name()
  }

  pub fn fingerprint(&self) -> &str {
    self.resource.fingerprint()
  }

  pub fn os_version_slug(&self) -> &str {
    &self.os_version_slug
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }

  pub fn resource_mut(&mut self) -> &mut Resource {
    &mut self.resource
  }

  pub fn rehash_with_calculator(&self, algorithm: DigestAlgorithm) -> Result<Self, ResourceError> {
    Ok(Self {
      resource: self.resource.rehash_with_calculator(algorithm)?,
      ..self.clone()
    })
  }
}

impl Dependent for CompiledPackage {
  fn name(&self) -> &str {
    self.resource.name()
  }

  fn dependency_names(&self) -> &[String] {
    &self.dependency_names
  }
}
