use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Release, ReleaseError, ReleasePackages};
use crate::compress::Compressor;
use crate::consts::{LICENSE_ARCHIVE_FILENAME, RELEASE_MANIFEST_FILENAME};

/// Bundles a built release into a release tarball.
pub struct ArchiveWriter {
  compressor: Arc<dyn Compressor>,
}

impl ArchiveWriter {
  pub fn new(compressor: Arc<dyn Compressor>) -> Self {
    Self { compressor }
  }

  /// Write `release` as a tarball and return its path. Packages whose
  /// fingerprint is in `skip_fingerprints` are left out of the tarball but
  /// stay in `release.MF`.
  pub fn write(&self, release: &Release, skip_fingerprints: &[String]) -> Result<PathBuf, ReleaseError> {
    let staging = tempfile::Builder::new()
      .prefix("boshrel-release-")
      .tempdir()
      .map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;
    let root = staging.path();
    info!(release = %release.name(), staging = ?root, "writing release tarball");

    let manifest_path = root.join(RELEASE_MANIFEST_FILENAME);
    let manifest = serde_yaml::to_string(&release.manifest()).map_err(|source| ReleaseError::Yaml {
      path: manifest_path.clone(),
      source,
    })?;
    fs::write(&manifest_path, manifest).map_err(|e| ReleaseError::io(&manifest_path, e))?;

    let skip = |fingerprint: &str, name: &str| {
      let skipped = skip_fingerprints.iter().any(|fp| fp == fingerprint);
      if skipped {
        debug!(package = name, "package filtered out of tarball");
      }
      skipped
    };

    match release.packages() {
      ReleasePackages::Source(graph) => {
        for pkg in graph.iter().filter(|pkg| !skip(pkg.fingerprint(), pkg.name())) {
          copy_archive(pkg.resource().archive_path(), &root.join("packages"), pkg.name())?;
        }
      }
      ReleasePackages::Compiled(graph) => {
        for pkg in graph.iter().filter(|pkg| !skip(pkg.fingerprint(), pkg.name())) {
          copy_archive(pkg.resource().archive_path(), &root.join("compiled_packages"), pkg.name())?;
        }
      }
    }

    for job in release.jobs() {
      copy_archive(job.resource().archive_path(), &root.join("jobs"), job.name())?;
    }

    if let Some(license) = release.license() {
      let archive = license.resource().archive_path();
      let dst = root.join(LICENSE_ARCHIVE_FILENAME);
      fs::copy(archive, &dst).map_err(|e| ReleaseError::io(&dst, e))?;
      self
        .compressor
        .decompress_file_to_dir(archive, root)?;
    }

    let tarball = self.compressor.compress_files_in_dir(root)?;

    if let Err(e) = staging.close() {
      warn!(error = %e, "failed to remove release staging dir");
    }

    debug!(tarball = ?tarball, "wrote release tarball");
    Ok(tarball)
  }
}

fn copy_archive(archive: &Path, dir: &Path, name: &str) -> Result<(), ReleaseError> {
  fs::create_dir_all(dir).map_err(|e| ReleaseError::io(dir, e))?;
  let dst = dir.join(format!("{name}.tgz"));
  fs::copy(archive, &dst).map_err(|e| ReleaseError::io(&dst, e))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compress::TarballCompressor;
  use crate::release::graph::DependencyGraph;
  use crate::release::{ArchiveReader, CompiledPackage, Job, License, Package};
  use crate::resource::{ArchiveRef, Resource};
  use crate::util::digest::{DigestAlgorithm, calculate_file};
  use tempfile::tempdir;

  fn archived(compressor: &TarballCompressor, name: &str, fp: &str, files: &[(&str, &str)]) -> Resource {
    let dir = tempdir().unwrap();
    for (file, contents) in files {
      fs::write(dir.path().join(file), contents).unwrap();
    }
    let path = compressor.compress_files_in_dir(dir.path()).unwrap();
    let digest = calculate_file(&path, DigestAlgorithm::Sha1).unwrap();
    Resource::with_archive(name, fp, ArchiveRef { path, digest })
  }

  #[test]
  fn writes_readable_release() {
    let compressor = TarballCompressor::new();
    let graph = DependencyGraph::link(vec![
      Package::new(archived(&compressor, "ruby", "rfp", &[("packaging", "make")]), vec![]),
      Package::new(archived(&compressor, "nats", "nfp", &[("packaging", "make")]), vec!["ruby".into()]),
    ])
    .unwrap();
    let mut job = Job::new(archived(&compressor, "web", "wfp", &[("job.MF", "name: web\n")]));
    job.package_names = vec!["nats".into()];
    let license = License::new(archived(&compressor, "license", "lfp", &[("LICENSE", "MIT")]));
    let release = Release::new("demo", "3", vec![job], ReleasePackages::Source(graph), Some(license)).unwrap();

    let tarball = ArchiveWriter::new(Arc::new(compressor.clone())).write(&release, &[]).unwrap();

    let extract = tempdir().unwrap();
    compressor
      .decompress_file_to_dir(&tarball, extract.path())
      .unwrap();
    assert_eq!(fs::read_to_string(extract.path().join("LICENSE")).unwrap(), "MIT");

    let read = ArchiveReader::new(Arc::new(compressor.clone()))
      .read(&tarball, &extract.path().join("reread"))
      .unwrap();
    assert_eq!(read.manifest(), release.manifest());
  }

  #[test]
  fn skips_packages_by_fingerprint() {
    let compressor = TarballCompressor::new();
    let graph = DependencyGraph::link(vec![
      CompiledPackage::new(archived(&compressor, "ruby", "rfp", &[("bin", "ruby")]), vec![], "ubuntu/1"),
      CompiledPackage::new(archived(&compressor, "nats", "nfp", &[("bin", "nats")]), vec![], "ubuntu/1"),
    ])
    .unwrap();
    let release = Release::new("demo", "3", vec![], ReleasePackages::Compiled(graph), None).unwrap();

    let tarball = ArchiveWriter::new(Arc::new(compressor.clone()))
      .write(&release, &["rfp".to_string()])
      .unwrap();

    let extract = tempdir().unwrap();
    compressor
      .decompress_file_to_dir(&tarball, extract.path())
      .unwrap();
    assert!(!extract.path().join("compiled_packages/ruby.tgz").exists());
    assert!(extract.path().join("compiled_packages/nats.tgz").exists());

    let manifest = fs::read_to_string(extract.path().join("release.MF")).unwrap();
    assert!(manifest.contains("stemcell: ubuntu/1"));
    assert!(manifest.contains("name: ruby"));
  }
}
