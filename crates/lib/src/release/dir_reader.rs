//! Reads a release source tree (`jobs/`, `packages/`, `src/`, `blobs/`,
//! `LICENSE*`/`NOTICE*`) into the release model.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::graph::DependencyGraph;
use super::manifest::{JobSpec, PackageSpec, PackageSpecLock, read_yaml};
use super::{Job, License, Package, Release, ReleaseError, ReleasePackages};
use crate::consts::{
  JOB_MANIFEST_FILENAME, JOB_MONIT_FILENAME, JOB_SPEC_FILENAME, PACKAGE_SPEC_FILENAME, PACKAGE_SPEC_LOCK_FILENAME,
  PACKAGING_SCRIPT, PRE_PACKAGING_SCRIPT,
};
use crate::error::MultiError;
use crate::resource::{File, Resource, Sources};

const LICENSE_PATTERNS: [&str; 2] = ["LICENSE*", "NOTICE*"];

pub struct DirReader {
  release_dir: PathBuf,
  src_dir: PathBuf,
  blobs_dir: PathBuf,
}

impl DirReader {
  pub fn new(release_dir: impl Into<PathBuf>) -> Self {
    let release_dir = release_dir.into();
    Self {
      src_dir: release_dir.join("src"),
      blobs_dir: release_dir.join("blobs"),
      release_dir,
    }
  }

  /// Read every job, package and the license. Problems in individual
  /// jobs and packages are all collected before failing.
  pub fn read(&self) -> Result<Release, ReleaseError> {
    let mut errors = Vec::new();

    let mut packages = Vec::new();
    for dir in child_dirs(&self.release_dir.join("packages"))? {
      match self.read_package(&dir) {
        Ok(pkg) => packages.push(pkg),
        Err(e) => errors.push(e),
      }
    }

    let mut jobs = Vec::new();
    for dir in child_dirs(&self.release_dir.join("jobs"))? {
      match self.read_job(&dir) {
        Ok(job) => jobs.push(job),
        Err(e) => errors.push(e),
      }
    }

    let license = match self.read_license() {
      Ok(license) => license,
      Err(e) => {
        errors.push(e);
        None
      }
    };

    if !errors.is_empty() {
      return Err(MultiError::new(errors).into());
    }

    debug!(
      release_dir = ?self.release_dir,
      jobs = jobs.len(),
      packages = packages.len(),
      license = license.is_some(),
      "read release directory"
    );

    let graph = DependencyGraph::link(packages)?;
    Release::new("", "", jobs, ReleasePackages::Source(graph), license)
  }

  pub fn read_package(&self, dir: &Path) -> Result<Package, ReleaseError> {
    let lock_path = dir.join(PACKAGE_SPEC_LOCK_FILENAME);
    if lock_path.exists() {
      let lock: PackageSpecLock = read_yaml(&lock_path)?;
      let resource = Resource::existing(lock.name, lock.fingerprint);
      return Ok(Package::new(resource, lock.dependencies));
    }

    let spec: PackageSpec = read_yaml(&dir.join(PACKAGE_SPEC_FILENAME))?;

    let packaging = dir.join(PACKAGING_SCRIPT);
    if !packaging.exists() {
      return Err(ReleaseError::MissingPackaging {
        package: spec.name,
        path: packaging,
      });
    }
    let mut files = Vec::new();
    if is_packageable(&packaging, dir)? {
      files.push(File::new(&packaging, dir).exclude_mode());
    }

    let mut prep_files = Vec::new();
    let pre_packaging = dir.join(PRE_PACKAGING_SCRIPT);
    if pre_packaging.exists() && is_packageable(&pre_packaging, dir)? {
      prep_files.push(File::new(&pre_packaging, dir).exclude_mode());
    }

    let mut by_relative_path = self.apply_files_patterns(&spec)?;
    for excluded in self.apply_excluded_patterns(&spec)? {
      by_relative_path.remove(&excluded);
    }

    for special in [PACKAGING_SCRIPT, PRE_PACKAGING_SCRIPT] {
      if by_relative_path.contains_key(special) {
        return Err(ReleaseError::SpecialFileIncluded {
          file: special.to_string(),
          package: spec.name,
        });
      }
    }
    files.extend(by_relative_path.into_values());

    let sources = Sources {
      files,
      prep_files,
      chunks: spec.dependencies.clone(),
    };
    let resource = Resource::from_sources(&spec.name, sources)?;
    debug!(package = %spec.name, fingerprint = %resource.fingerprint(), "read package");

    Ok(Package::new(resource, spec.dependencies))
  }

  /// First match for a relative path wins; `src/` is searched before
  /// `blobs/`.
  fn apply_files_patterns(&self, spec: &PackageSpec) -> Result<BTreeMap<String, File>, ReleaseError> {
    let mut by_relative_path = BTreeMap::new();

    for pattern in &spec.files {
      let mut found = false;
      for base in [&self.src_dir, &self.blobs_dir] {
        for path in glob_in(base, pattern)? {
          if !is_packageable(&path, base)? {
            continue;
          }
          found = true;
          let file = File::new(&path, base);
          by_relative_path.entry(file.relative_path.clone()).or_insert(file);
        }
      }

      if !found {
        return Err(ReleaseError::MissingFiles {
          pattern: pattern.clone(),
        });
      }
    }

    Ok(by_relative_path)
  }

  fn apply_excluded_patterns(&self, spec: &PackageSpec) -> Result<Vec<String>, ReleaseError> {
    let mut excluded = Vec::new();
    for pattern in &spec.excluded_files {
      for base in [&self.src_dir, &self.blobs_dir] {
        for path in glob_in(base, pattern)? {
          excluded.push(File::new(&path, base).relative_path);
        }
      }
    }
    Ok(excluded)
  }

  pub fn read_job(&self, dir: &Path) -> Result<Job, ReleaseError> {
    let spec_path = dir.join(JOB_SPEC_FILENAME);
    let spec: JobSpec = read_yaml(&spec_path)?;

    let dir_name = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    if dir_name != spec.name {
      return Err(ReleaseError::JobNameMismatch {
        dir: dir_name,
        name: spec.name,
      });
    }

    let mut spec_file = File::new(&spec_path, dir);
    spec_file.relative_path = JOB_MANIFEST_FILENAME.to_string();
    let mut files = vec![spec_file];

    let monit = dir.join(JOB_MONIT_FILENAME);
    if monit.exists() {
      files.push(File::new(&monit, dir));
    }

    for src in spec.templates.keys() {
      let path = dir.join("templates").join(src);
      if !path.exists() {
        return Err(ReleaseError::MissingTemplate {
          job: spec.name.clone(),
          template: src.clone(),
        });
      }
      files.push(File::new(&path, dir));
    }

    let resource = Resource::from_sources(&spec.name, Sources {
      files,
      ..Default::default()
    })?;
    debug!(job = %spec.name, fingerprint = %resource.fingerprint(), "read job");

    Ok(Job::from_spec(resource, spec))
  }

  /// `LICENSE*` and `NOTICE*` at the release root; `None` when neither
  /// exists.
  pub fn read_license(&self) -> Result<Option<License>, ReleaseError> {
    let mut files = Vec::new();
    for pattern in LICENSE_PATTERNS {
      for path in glob_in(&self.release_dir, pattern)? {
        if path.is_file() {
          files.push(File::new(&path, &self.release_dir));
        }
      }
    }

    if files.is_empty() {
      return Ok(None);
    }

    let resource = Resource::from_sources(License::NAME, Sources {
      files,
      ..Default::default()
    })?;
    Ok(Some(License::new(resource)))
  }
}

fn child_dirs(dir: &Path) -> Result<Vec<PathBuf>, ReleaseError> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(ReleaseError::io(dir, e)),
  };

  let mut dirs = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|e| ReleaseError::io(dir, e))?;
    let path = entry.path();
    if path.is_dir() {
      dirs.push(path);
    }
  }
  dirs.sort();
  Ok(dirs)
}

fn glob_in(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, ReleaseError> {
  let full = base.join(pattern);
  let full = full.to_string_lossy();
  let paths = glob::glob(&full).map_err(|source| ReleaseError::Glob {
    pattern: pattern.to_string(),
    source,
  })?;

  // Unreadable entries are skipped like a shell glob would.
  let mut matches: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
  matches.sort();
  Ok(matches)
}

/// Regular files and symlinks that are not reached through a symlinked
/// directory below `base`.
fn is_packageable(path: &Path, base: &Path) -> Result<bool, ReleaseError> {
  let meta = fs::symlink_metadata(path).map_err(|e| ReleaseError::io(path, e))?;
  if meta.is_dir() {
    return Ok(false);
  }
  if meta.file_type().is_symlink() {
    return Ok(true);
  }

  let Ok(rel) = path.strip_prefix(base) else {
    return Ok(true);
  };
  let real_base = fs::canonicalize(base).map_err(|e| ReleaseError::io(base, e))?;
  let real_path = fs::canonicalize(path).map_err(|e| ReleaseError::io(path, e))?;
  Ok(real_path == real_base.join(rel))
}
