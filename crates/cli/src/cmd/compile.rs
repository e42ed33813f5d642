//! `boshrel compile`: compile every package a set of jobs needs.
//!
//! Works on a release tarball, building a dev release tarball from the
//! release directory first when none is given. Compiled packages are
//! uploaded to the release blobstore and cached in
//! `.dev_builds/compiled_packages.yml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;

use boshrel_lib::compile::{CompileConfig, CompiledPackageRef, CompiledPackageRepo, DependencyCompiler, PackageCompiler};
use boshrel_lib::progress::{Stage, TracingReporter};
use boshrel_lib::release::{ArchiveReader, Job};

use super::{open_release_dir, runtime};
use crate::output::{OutputFormat, print_entry, print_json, print_step_finished, print_step_started, print_success};

#[derive(Args, Debug)]
pub struct CompileArgs {
  /// Jobs whose packages to compile (default: every job)
  pub jobs: Vec<String>,

  /// Release tarball (default: a new dev release of the release directory)
  #[arg(long)]
  pub tarball: Option<PathBuf>,

  /// Directory dependencies are installed into while compiling
  #[arg(long)]
  pub packages_dir: Option<PathBuf>,

  /// Build the dev release even if the git repository has local modifications
  #[arg(long)]
  pub force: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct CompileResult {
  release: String,
  version: String,
  compiled_packages: Vec<CompiledPackageRef>,
}

/// Prints each compilation step as it starts and ends.
struct TerminalStage;

impl Stage for TerminalStage {
  fn step_started(&self, name: &str) {
    print_step_started(name);
  }

  fn step_finished(&self, name: &str, error: Option<&str>) {
    print_step_finished(name, error);
  }
}

pub fn cmd_compile(dir: &Path, args: CompileArgs) -> Result<()> {
  let extract = tempfile::Builder::new()
    .prefix("boshrel-compile-")
    .tempdir()
    .context("Failed to create extraction dir")?;

  let rt = runtime()?;
  let result = rt.block_on(async {
    let release_dir = open_release_dir(dir).await;

    let tarball = match &args.tarball {
      Some(path) => path.clone(),
      None => {
        let name = release_dir.default_name()?;
        let version = release_dir.next_dev_version(&name).await?;
        let release = release_dir
          .build_release(&name, &version, args.force)
          .await
          .context("Failed to build dev release")?;
        release_dir.build_release_archive(&release, None).await?
      }
    };

    let release = ArchiveReader::new(release_dir.compressor())
      .read(&tarball, extract.path())
      .with_context(|| format!("Failed to read release tarball {}", tarball.display()))?;
    let graph = release
      .source_packages()
      .context("Release contains compiled packages only")?;
    let jobs = select_jobs(release.jobs(), &args.jobs)?;

    let mut config = CompileConfig {
      parallelism: release_dir.parallelism(),
      ..Default::default()
    };
    if let Some(packages_dir) = &args.packages_dir {
      config.packages_dir = packages_dir.clone();
    }

    let repo = CompiledPackageRepo::new(release_dir.path().join(".dev_builds/compiled_packages.yml"));
    let compiler = DependencyCompiler::new(PackageCompiler::new(
      release_dir.runner(),
      release_dir.compressor(),
      release_dir.blobstore(),
      Arc::new(repo),
      config,
    ));

    let stage: &dyn Stage = if args.output.is_json() { &TracingReporter } else { &TerminalStage };
    let compiled_packages = compiler
      .compile(&jobs, graph, stage)
      .await
      .context("Failed to compile packages")?;

    anyhow::Ok(CompileResult {
      release: release.name().to_string(),
      version: release.version().to_string(),
      compiled_packages,
    })
  })?;

  if args.output.is_json() {
    return print_json(&result);
  }

  println!();
  print_success(&format!(
    "Compiled {} package(s) of {}/{}",
    result.compiled_packages.len(),
    result.release,
    result.version
  ));
  for pkg in &result.compiled_packages {
    print_entry(&pkg.name, &pkg.version, &pkg.blob_id);
  }
  Ok(())
}

/// Jobs named in `names`, or every job when `names` is empty.
fn select_jobs(jobs: &[Job], names: &[String]) -> Result<Vec<Job>> {
  if names.is_empty() {
    return Ok(jobs.to_vec());
  }

  let mut selected = Vec::with_capacity(names.len());
  for name in names {
    match jobs.iter().find(|job| job.name() == name) {
      Some(job) => selected.push(job.clone()),
      None => bail!("Job '{name}' is not in the release"),
    }
  }
  Ok(selected)
}
