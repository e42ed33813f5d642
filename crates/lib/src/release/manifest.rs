//! YAML documents found in release directories and tarballs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ReleaseError;

/// `release.MF` at the root of a release tarball.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseManifest {
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub commit_hash: String,
  #[serde(default)]
  pub uncommitted_changes: bool,
  #[serde(default)]
  pub jobs: Vec<JobRef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub packages: Vec<PackageRef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub compiled_packages: Vec<CompiledPackageRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub license: Option<LicenseRef>,
}

impl ReleaseManifest {
  /// A release carries source packages or compiled packages, never both.
  pub(crate) fn check_package_kind(&self) -> Result<(), ReleaseError> {
    if !self.packages.is_empty() && !self.compiled_packages.is_empty() {
      return Err(ReleaseError::MixedPackages {
        name: self.name.clone(),
        version: self.version.clone(),
      });
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
  pub name: String,
  pub version: String,
  pub fingerprint: String,
  pub sha1: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub packages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
  pub name: String,
  pub version: String,
  pub fingerprint: String,
  pub sha1: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPackageRef {
  pub name: String,
  pub version: String,
  pub fingerprint: String,
  pub sha1: String,
  pub stemcell: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRef {
  pub version: String,
  pub fingerprint: String,
  pub sha1: String,
}

/// Package `spec` in a release directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageSpec {
  pub name: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
  #[serde(default)]
  pub files: Vec<String>,
  #[serde(default)]
  pub excluded_files: Vec<String>,
}

/// Package `spec.lock`: pins a package to an already indexed fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageSpecLock {
  pub name: String,
  pub fingerprint: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
}

/// Job `spec` in a release directory, stored as `job.MF` in job archives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
  pub name: String,
  #[serde(default)]
  pub templates: BTreeMap<String, String>,
  #[serde(default)]
  pub packages: Vec<String>,
  #[serde(default)]
  pub properties: BTreeMap<String, PropertyDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_yaml::Value>,
}

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ReleaseError> {
  let contents = std::fs::read_to_string(path).map_err(|source| ReleaseError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_yaml::from_str(&contents).map_err(|source| ReleaseError::Yaml {
    path: PathBuf::from(path),
    source,
  })
}
