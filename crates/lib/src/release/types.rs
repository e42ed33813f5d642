use std::io;
use std::path::{Path, PathBuf};

use super::graph::DependencyGraph;
use super::manifest::{CompiledPackageRef, JobRef, LicenseRef, PackageRef, ReleaseManifest};
use super::{CompiledPackage, Job, License, Package, ReleaseError};
use crate::index::ArchiveIndices;
use crate::release::graph::Dependent;
use crate::resource::{Archiver, Resource, ResourceError};

/// Packages of a release: all source or all compiled, never mixed.
#[derive(Debug, Clone)]
pub enum ReleasePackages {
  Source(DependencyGraph<Package>),
  Compiled(DependencyGraph<CompiledPackage>),
}

impl Default for ReleasePackages {
  fn default() -> Self {
    Self::Source(DependencyGraph::default())
  }
}

#[derive(Debug, Clone)]
pub struct Release {
  name: String,
  version: String,
  commit_hash: String,
  uncommitted_changes: bool,
  jobs: Vec<Job>,
  packages: ReleasePackages,
  license: Option<License>,
  extracted_path: Option<PathBuf>,
}

impl Release {
  /// Assemble a release, resolving every job's packages.
  pub fn new(
    name: impl Into<String>,
    version: impl Into<String>,
    mut jobs: Vec<Job>,
    packages: ReleasePackages,
    license: Option<License>,
  ) -> Result<Self, ReleaseError> {
    for job in &mut jobs {
      match &packages {
        ReleasePackages::Source(graph) => job.attach_packages(graph)?,
        ReleasePackages::Compiled(graph) => job.attach_packages(graph)?,
      }
    }

    Ok(Self {
      name: name.into(),
      version: version.into(),
      commit_hash: String::new(),
      uncommitted_changes: false,
      jobs,
      packages,
      license,
      extracted_path: None,
    })
  }

  /// Release described by a saved manifest. Its resources carry no
  /// archives until [`Release::build`] finds them in the indices.
  pub fn from_manifest(manifest: &ReleaseManifest) -> Result<Self, ReleaseError> {
    manifest.check_package_kind()?;

    let jobs = manifest
      .jobs
      .iter()
      .map(|job| {
        let mut built = Job::new(Resource::existing(&job.name, &job.fingerprint));
        built.package_names = job.packages.clone();
        built
      })
      .collect();

    let packages = if manifest.compiled_packages.is_empty() {
      ReleasePackages::Source(DependencyGraph::link(
        manifest
          .packages
          .iter()
          .map(|pkg| Package::new(Resource::existing(&pkg.name, &pkg.fingerprint), pkg.dependencies.clone()))
          .collect(),
      )?)
    } else {
      ReleasePackages::Compiled(DependencyGraph::link(
        manifest
          .compiled_packages
          .iter()
          .map(|pkg| {
            CompiledPackage::new(
              Resource::existing(&pkg.name, &pkg.fingerprint),
              pkg.dependencies.clone(),
              &pkg.stemcell,
            )
          })
          .collect(),
      )?)
    };

    let license = manifest
      .license
      .as_ref()
      .map(|license| License::new(Resource::existing(License::NAME, &license.fingerprint)));

    let mut release = Self::new(&manifest.name, &manifest.version, jobs, packages, license)?;
    release.set_commit_hash(&manifest.commit_hash, manifest.uncommitted_changes);
    Ok(release)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn set_name(&mut self, name: impl Into<String>) {
    self.name = name.into();
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn set_version(&mut self, version: impl Into<String>) {
    self.version = version.into();
  }

  pub fn commit_hash(&self) -> &str {
    &self.commit_hash
  }

  pub fn uncommitted_changes(&self) -> bool {
    self.uncommitted_changes
  }

  pub fn set_commit_hash(&mut self, hash: impl Into<String>, uncommitted_changes: bool) {
    self.commit_hash = hash.into();
    self.uncommitted_changes = uncommitted_changes;
  }

  pub fn with_extracted_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.extracted_path = Some(path.into());
    self
  }

  pub fn extracted_path(&self) -> Option<&Path> {
    self.extracted_path.as_deref()
  }

  pub fn jobs(&self) -> &[Job] {
    &self.jobs
  }

  pub fn jobs_mut(&mut self) -> &mut [Job] {
    &mut self.jobs
  }

  pub fn find_job(&self, name: &str) -> Option<&Job> {
    self.jobs.iter().find(|job| job.name() == name)
  }

  pub fn packages(&self) -> &ReleasePackages {
    &self.packages
  }

  pub fn is_compiled(&self) -> bool {
    matches!(self.packages, ReleasePackages::Compiled(_))
  }

  pub fn source_packages(&self) -> Option<&DependencyGraph<Package>> {
    match &self.packages {
      ReleasePackages::Source(graph) => Some(graph),
      ReleasePackages::Compiled(_) => None,
    }
  }

  pub fn compiled_packages(&self) -> Option<&DependencyGraph<CompiledPackage>> {
    match &self.packages {
      ReleasePackages::Compiled(graph) => Some(graph),
      ReleasePackages::Source(_) => None,
    }
  }

  pub fn license(&self) -> Option<&License> {
    self.license.as_ref()
  }

  /// `release.MF` contents. Every resource must have an archive attached.
  pub fn manifest(&self) -> ReleaseManifest {
    let jobs = self
      .jobs
      .iter()
      .map(|job| JobRef {
        name: job.name().to_string(),
        version: job.fingerprint().to_string(),
        fingerprint: job.fingerprint().to_string(),
        sha1: job.resource().archive_digest().to_string(),
        packages: job.package_names.clone(),
      })
      .collect();

    let (packages, compiled_packages) = match &self.packages {
      ReleasePackages::Source(graph) => (
        graph
          .iter()
          .map(|pkg| PackageRef {
            name: pkg.name().to_string(),
            version: pkg.fingerprint().to_string(),
            fingerprint: pkg.fingerprint().to_string(),
            sha1: pkg.resource().archive_digest().to_string(),
            dependencies: pkg.dependency_names().to_vec(),
          })
          .collect(),
        Vec::new(),
      ),
      ReleasePackages::Compiled(graph) => (
        Vec::new(),
        graph
          .iter()
          .map(|pkg| CompiledPackageRef {
            name: pkg.name().to_string(),
            version: pkg.fingerprint().to_string(),
            fingerprint: pkg.fingerprint().to_string(),
            sha1: pkg.resource().archive_digest().to_string(),
            stemcell: pkg.os_version_slug().to_string(),
            dependencies: pkg.dependency_names().to_vec(),
          })
          .collect(),
      ),
    };

    let license = self.license.as_ref().map(|license| LicenseRef {
      version: license.fingerprint().to_string(),
      fingerprint: license.fingerprint().to_string(),
      sha1: license.resource().archive_digest().to_string(),
    });

    ReleaseManifest {
      name: self.name.clone(),
      version: self.version.clone(),
      commit_hash: self.commit_hash.clone(),
      uncommitted_changes: self.uncommitted_changes,
      jobs,
      packages,
      compiled_packages,
      license,
    }
  }

  /// Attach an archive to every job, package and license: found in the dev
  /// or final indices, else built and added to the dev indices.
  pub async fn build(
    &mut self,
    dev: &ArchiveIndices,
    final_: &ArchiveIndices,
    archiver: &Archiver,
  ) -> Result<(), ResourceError> {
    for job in &mut self.jobs {
      job
        .resource_mut()
        .build(dev.jobs.as_ref(), final_.jobs.as_ref(), archiver)
        .await?;
    }

    match &mut self.packages {
      ReleasePackages::Source(graph) => {
        for pkg in graph.iter_mut() {
          pkg
            .resource_mut()
            .build(dev.packages.as_ref(), final_.packages.as_ref(), archiver)
            .await?;
        }
      }
      ReleasePackages::Compiled(graph) => {
        for pkg in graph.iter_mut() {
          pkg
            .resource_mut()
            .build(dev.packages.as_ref(), final_.packages.as_ref(), archiver)
            .await?;
        }
      }
    }

    if let Some(license) = &mut self.license {
      license
        .resource_mut()
        .build(dev.licenses.as_ref(), final_.licenses.as_ref(), archiver)
        .await?;
    }

    Ok(())
  }

  /// Publish every archive to the final indices.
  pub async fn finalize(&mut self, final_: &ArchiveIndices) -> Result<(), ResourceError> {
    for job in &mut self.jobs {
      job.resource_mut().finalize(final_.jobs.as_ref()).await?;
    }

    match &mut self.packages {
      ReleasePackages::Source(graph) => {
        for pkg in graph.iter_mut() {
          pkg.resource_mut().finalize(final_.packages.as_ref()).await?;
        }
      }
      ReleasePackages::Compiled(graph) => {
        for pkg in graph.iter_mut() {
          pkg.resource_mut().finalize(final_.packages.as_ref()).await?;
        }
      }
    }

    if let Some(license) = &mut self.license {
      license.resource_mut().finalize(final_.licenses.as_ref()).await?;
    }

    Ok(())
  }

  /// Remove the directory the release was extracted into.
  pub fn clean_up(&self) -> io::Result<()> {
    if let Some(graph) = self.source_packages() {
      for pkg in graph.iter() {
        pkg.clean_up()?;
      }
    }

    match &self.extracted_path {
      Some(path) => match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
      },
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::{ArchiveRef, Resource};
  use crate::util::digest::{DigestAlgorithm, calculate_bytes};

  fn built(name: &str, fp: &str) -> Resource {
    Resource::with_archive(name, fp, ArchiveRef {
      path: PathBuf::from(format!("/tmp/{name}.tgz")),
      digest: calculate_bytes(name.as_bytes(), DigestAlgorithm::Sha1),
    })
  }

  #[test]
  fn source_and_compiled_are_exclusive() {
    let source = Release::new("r", "1", vec![], ReleasePackages::default(), None).unwrap();
    assert!(!source.is_compiled());
    assert!(source.compiled_packages().is_none());

    let compiled = Release::new(
      "r",
      "1",
      vec![],
      ReleasePackages::Compiled(DependencyGraph::link(vec![]).unwrap()),
      None,
    )
    .unwrap();
    assert!(compiled.is_compiled());
    assert!(compiled.source_packages().is_none());
  }

  #[test]
  fn new_rejects_jobs_with_unknown_packages() {
    let mut job = Job::new(built("web", "jfp"));
    job.package_names = vec!["ruby".into()];

    let err = Release::new("r", "1", vec![job], ReleasePackages::default(), None).unwrap_err();
    assert!(matches!(err, ReleaseError::JobPackageNotFound { .. }));
  }

  #[test]
  fn manifest_describes_all_resources() {
    let graph = DependencyGraph::link(vec![
      Package::new(built("ruby", "rfp"), vec![]),
      Package::new(built("nats", "nfp"), vec!["ruby".into()]),
    ])
    .unwrap();
    let mut job = Job::new(built("web", "jfp"));
    job.package_names = vec!["nats".into()];
    let license = License::new(built("license", "lfp"));

    let mut release = Release::new("r", "2", vec![job], ReleasePackages::Source(graph), Some(license)).unwrap();
    release.set_commit_hash("abc123", true);

    let manifest = release.manifest();
    assert_eq!(manifest.name, "r");
    assert_eq!(manifest.commit_hash, "abc123");
    assert!(manifest.uncommitted_changes);
    assert_eq!(manifest.jobs[0].fingerprint, "jfp");
    assert_eq!(manifest.jobs[0].sha1, calculate_bytes(b"web", DigestAlgorithm::Sha1).to_string());
    assert_eq!(manifest.packages[1].dependencies, vec!["ruby".to_string()]);
    assert_eq!(manifest.license.unwrap().fingerprint, "lfp");
  }

  #[test]
  fn from_manifest_rejects_mixed_packages() {
    let manifest = ReleaseManifest {
      name: "r".into(),
      version: "3".into(),
      packages: vec![PackageRef {
        name: "ruby".into(),
        ..Default::default()
      }],
      compiled_packages: vec![CompiledPackageRef {
        name: "nats".into(),
        stemcell: "ubuntu/1".into(),
        ..Default::default()
      }],
      ..Default::default()
    };

    let err = Release::from_manifest(&manifest).unwrap_err();
    assert!(matches!(err, ReleaseError::MixedPackages { ref version, .. } if version == "3"));
  }
}
