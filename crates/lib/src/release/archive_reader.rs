//! Reads a release tarball back into the release model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::graph::DependencyGraph;
use super::manifest::{JobSpec, ReleaseManifest, read_yaml};
use super::{CompiledPackage, Job, License, Package, Release, ReleaseError, ReleasePackages};
use crate::compress::Compressor;
use crate::consts::{JOB_MANIFEST_FILENAME, LICENSE_ARCHIVE_FILENAME, RELEASE_MANIFEST_FILENAME};
use crate::error::MultiError;
use crate::resource::{ArchiveRef, Resource};
use crate::util::digest::Digest;

pub struct ArchiveReader {
  compressor: Arc<dyn Compressor>,
}

impl ArchiveReader {
  pub fn new(compressor: Arc<dyn Compressor>) -> Self {
    Self { compressor }
  }

  /// Extract `tarball` into `extract_dir` and rebuild the release from its
  /// `release.MF`. Every archive digest is verified; all problems are
  /// reported together.
  pub fn read(&self, tarball: &Path, extract_dir: &Path) -> Result<Release, ReleaseError> {
    info!(tarball = ?tarball, "reading release tarball");
    self.compressor.decompress_file_to_dir(tarball, extract_dir)?;

    let manifest: ReleaseManifest = read_yaml(&extract_dir.join(RELEASE_MANIFEST_FILENAME))?;
    manifest.check_package_kind()?;
    let mut errors = Vec::new();

    let mut packages = Vec::new();
    for pkg in &manifest.packages {
      let result = self.archive(extract_dir, "packages", &pkg.name, &pkg.sha1).and_then(|archive| {
        let extracted = extract_dir.join("extracted_packages").join(&pkg.name);
        self.compressor.decompress_file_to_dir(&archive.path, &extracted)?;
        let resource = Resource::with_archive(&pkg.name, &pkg.fingerprint, archive);
        Ok(Package::new(resource, pkg.dependencies.clone()).with_extracted_path(extracted))
      });
      match result {
        Ok(pkg) => packages.push(pkg),
        Err(e) => errors.push(e),
      }
    }

    let mut compiled = Vec::new();
    for pkg in &manifest.compiled_packages {
      match self.archive(extract_dir, "compiled_packages", &pkg.name, &pkg.sha1) {
        Ok(archive) => {
          let resource = Resource::with_archive(&pkg.name, &pkg.fingerprint, archive);
          compiled.push(CompiledPackage::new(resource, pkg.dependencies.clone(), &pkg.stemcell));
        }
        Err(e) => errors.push(e),
      }
    }

    let mut jobs = Vec::new();
    for job_ref in &manifest.jobs {
      let result = self.archive(extract_dir, "jobs", &job_ref.name, &job_ref.sha1).and_then(|archive| {
        let extracted = extract_dir.join("extracted_jobs").join(&job_ref.name);
        self.compressor.decompress_file_to_dir(&archive.path, &extracted)?;
        let spec: JobSpec = read_yaml(&extracted.join(JOB_MANIFEST_FILENAME))?;
        let resource = Resource::with_archive(&job_ref.name, &job_ref.fingerprint, archive);
        let mut job = Job::from_spec(resource, spec).with_extracted_path(extracted);
        if !job_ref.packages.is_empty() {
          job.package_names = job_ref.packages.clone();
        }
        Ok(job)
      });
      match result {
        Ok(job) => jobs.push(job),
        Err(e) => errors.push(e),
      }
    }

    let license = match &manifest.license {
      Some(license) => {
        let path = extract_dir.join(LICENSE_ARCHIVE_FILENAME);
        match verified(&path, &license.sha1, "license", License::NAME) {
          Ok(archive) => Some(License::new(Resource::with_archive(
            License::NAME,
            &license.fingerprint,
            archive,
          ))),
          Err(e) => {
            errors.push(e);
            None
          }
        }
      }
      None => None,
    };

    if !errors.is_empty() {
      return Err(MultiError::new(errors).into());
    }

    let packages = if compiled.is_empty() {
      ReleasePackages::Source(DependencyGraph::link(packages)?)
    } else {
      ReleasePackages::Compiled(DependencyGraph::link(compiled)?)
    };

    let mut release = Release::new(&manifest.name, &manifest.version, jobs, packages, license)?;
    release.set_commit_hash(&manifest.commit_hash, manifest.uncommitted_changes);

    debug!(release = %manifest.name, version = %manifest.version, "read release tarball");
    Ok(release.with_extracted_path(extract_dir))
  }

  fn archive(&self, root: &Path, kind: &'static str, name: &str, sha1: &str) -> Result<ArchiveRef, ReleaseError> {
    let path = root.join(kind).join(format!("{name}.tgz"));
    verified(&path, sha1, kind, name)
  }
}

fn verified(path: &Path, sha1: &str, what: &'static str, name: &str) -> Result<ArchiveRef, ReleaseError> {
  if !path.exists() {
    return Err(ReleaseError::MissingArchive {
      what,
      name: name.to_string(),
    });
  }

  let digest: Digest = sha1.parse()?;
  digest.verify_file(path)?;
  Ok(ArchiveRef {
    path: PathBuf::from(path),
    digest,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compress::TarballCompressor;
  use std::fs;
  use crate::util::digest::{DigestAlgorithm, calculate_file};
  use tempfile::tempdir;

  fn tgz(compressor: &TarballCompressor, files: &[(&str, &str)]) -> PathBuf {
    let dir = tempdir().unwrap();
    for (name, contents) in files {
      let path = dir.path().join(name);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, contents).unwrap();
    }
    compressor.compress_files_in_dir(dir.path()).unwrap()
  }

  fn sha1(path: &Path) -> String {
    calculate_file(path, DigestAlgorithm::Sha1).unwrap().to_string()
  }

  /// Lay out a release tarball with one job, two packages and a license.
  fn release_tarball(tamper: bool) -> PathBuf {
    let compressor = TarballCompressor::new();
    let layout = tempdir().unwrap();
    let root = layout.path();
    fs::create_dir_all(root.join("packages")).unwrap();
    fs::create_dir_all(root.join("jobs")).unwrap();

    let ruby = tgz(&compressor, &[("packaging", "make")]);
    let nats = tgz(&compressor, &[("packaging", "make nats")]);
    let web = tgz(&compressor, &[("job.MF", "name: web\ntemplates: {ctl: bin/ctl}\npackages: [nats]\n")]);
    let license = tgz(&compressor, &[("LICENSE", "MIT")]);
    fs::copy(&ruby, root.join("packages/ruby.tgz")).unwrap();
    fs::copy(&nats, root.join("packages/nats.tgz")).unwrap();
    fs::copy(&web, root.join("jobs/web.tgz")).unwrap();
    fs::copy(&license, root.join("license.tgz")).unwrap();

    let web_sha1 = if tamper { "0".repeat(40) } else { sha1(&web) };
    let manifest = format!(
      "name: demo\nversion: 1+dev.2\ncommit_hash: abc\nuncommitted_changes: false\n\
       jobs:\n- {{name: web, version: wfp, fingerprint: wfp, sha1: {web_sha1}}}\n\
       packages:\n- {{name: ruby, version: rfp, fingerprint: rfp, sha1: {}, dependencies: []}}\n\
       - {{name: nats, version: nfp, fingerprint: nfp, sha1: {}, dependencies: [ruby]}}\n\
       license: {{version: lfp, fingerprint: lfp, sha1: {}}}\n",
      sha1(&ruby),
      sha1(&nats),
      sha1(&license),
    );
    fs::write(root.join("release.MF"), manifest).unwrap();

    compressor.compress_files_in_dir(root).unwrap()
  }

  #[test]
  fn reads_release_tarball() {
    let tarball = release_tarball(false);
    let extract = tempdir().unwrap();

    let release = ArchiveReader::new(Arc::new(TarballCompressor::new()))
      .read(&tarball, extract.path())
      .unwrap();

    assert_eq!(release.name(), "demo");
    assert_eq!(release.version(), "1+dev.2");
    assert_eq!(release.commit_hash(), "abc");
    assert!(!release.is_compiled());

    let web = release.find_job("web").unwrap();
    assert_eq!(web.fingerprint(), "wfp");
    assert_eq!(web.templates["ctl"], "bin/ctl");
    assert_eq!(web.package_ids().len(), 1);

    let graph = release.source_packages().unwrap();
    let nats = graph.get(graph.find("nats").unwrap());
    assert!(nats.extracted_path().unwrap().join("packaging").exists());
    assert_eq!(release.license().unwrap().fingerprint(), "lfp");

    release.clean_up().unwrap();
    assert!(!extract.path().exists());
  }

  #[test]
  fn rejects_tampered_archives() {
    let tarball = release_tarball(true);
    let extract = tempdir().unwrap();

    let err = ArchiveReader::new(Arc::new(TarballCompressor::new()))
      .read(&tarball, extract.path())
      .unwrap_err();
    assert!(matches!(err, ReleaseError::Multiple(ref multi) if multi.len() == 1));
  }

  #[test]
  fn rejects_mixed_source_and_compiled_packages() {
    let compressor = TarballCompressor::new();
    let sha1 = "0".repeat(40);
    let manifest = format!(
      "name: demo\nversion: '1'\njobs: []\n\
       packages:\n- {{name: ruby, version: rfp, fingerprint: rfp, sha1: {sha1}, dependencies: []}}\n\
       compiled_packages:\n- {{name: nats, version: nfp, fingerprint: nfp, sha1: {sha1}, stemcell: ubuntu/1, dependencies: []}}\n"
    );
    let tarball = tgz(&compressor, &[("release.MF", manifest.as_str())]);
    let extract = tempdir().unwrap();

    let err = ArchiveReader::new(Arc::new(TarballCompressor::new()))
      .read(&tarball, extract.path())
      .unwrap_err();
    assert!(matches!(err, ReleaseError::MixedPackages { .. }));
    assert_eq!(err.to_string(), "release 'demo/1' mixes source and compiled packages");
  }
}
