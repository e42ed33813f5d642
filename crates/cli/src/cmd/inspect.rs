//! `boshrel inspect-release`: jobs, packages and license of a tarball.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use boshrel_lib::compress::TarballCompressor;
use boshrel_lib::release::manifest::ReleaseManifest;
use boshrel_lib::release::{ArchiveReader, validator};

use crate::output::{
  OutputFormat, print_entry, print_entry_deps, print_json, print_section, print_stat, print_success, print_warning,
};

#[derive(Debug, Serialize)]
struct Inspection {
  archive: PathBuf,
  #[serde(flatten)]
  manifest: ReleaseManifest,
  problems: Vec<String>,
}

pub fn cmd_inspect_release(tarball: &Path, output: OutputFormat) -> Result<()> {
  let extract = tempfile::Builder::new()
    .prefix("boshrel-inspect-")
    .tempdir()
    .context("Failed to create extraction dir")?;

  let release = ArchiveReader::new(Arc::new(TarballCompressor::new()))
    .read(tarball, extract.path())
    .with_context(|| format!("Failed to read release tarball {}", tarball.display()))?;

  let problems = match validator::validate(&release) {
    Ok(()) => Vec::new(),
    Err(errors) => errors.errors().iter().map(ToString::to_string).collect(),
  };

  let inspection = Inspection {
    archive: tarball.to_path_buf(),
    manifest: release.manifest(),
    problems,
  };

  if output.is_json() {
    return print_json(&inspection);
  }
  print_inspection(&inspection);
  Ok(())
}

fn print_inspection(inspection: &Inspection) {
  let manifest = &inspection.manifest;

  print_success(&format!("Release {}/{}", manifest.name, manifest.version));
  print_stat("Commit Hash", &manifest.commit_hash);
  print_stat("Archive", &inspection.archive.display().to_string());

  print_section(&format!("Jobs ({})", manifest.jobs.len()));
  let mut jobs: Vec<_> = manifest.jobs.iter().collect();
  jobs.sort_by(|a, b| a.name.cmp(&b.name));
  for job in jobs {
    print_entry(&job.name, &job.fingerprint, &job.sha1);
    print_entry_deps(&job.packages);
  }

  let count = manifest.packages.len() + manifest.compiled_packages.len();
  print_section(&format!("Packages ({count})"));
  let mut packages: Vec<_> = manifest.packages.iter().collect();
  packages.sort_by(|a, b| a.name.cmp(&b.name));
  for pkg in packages {
    print_entry(&pkg.name, &pkg.fingerprint, &pkg.sha1);
    print_entry_deps(&pkg.dependencies);
  }

  let mut compiled: Vec<_> = manifest.compiled_packages.iter().collect();
  compiled.sort_by(|a, b| a.name.cmp(&b.name));
  for pkg in compiled {
    print_entry(&pkg.name, &pkg.fingerprint, &pkg.sha1);
    print_stat("Stemcell", &pkg.stemcell);
    print_entry_deps(&pkg.dependencies);
  }

  if let Some(license) = &manifest.license {
    print_section("License");
    print_entry("license", &license.fingerprint, &license.sha1);
  }

  if !inspection.problems.is_empty() {
    println!();
    for problem in &inspection.problems {
      print_warning(problem);
    }
  }
}
