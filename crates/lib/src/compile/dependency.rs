use std::collections::BTreeSet;

use tracing::info;

use super::{CompileError, CompiledPackageRef, PackageCompiler};
use crate::progress::{Stage, perform};
use crate::release::{DependencyGraph, Job, Package, PackageId};

/// Compiles every package a set of jobs needs, dependencies first.
pub struct DependencyCompiler {
  compiler: PackageCompiler,
}

impl DependencyCompiler {
  pub fn new(compiler: PackageCompiler) -> Self {
    Self { compiler }
  }

  /// Compile the packages reachable from `jobs` in dependency order. The
  /// first failure stops the run; packages compiled before it stay cached.
  pub async fn compile(
    &self,
    jobs: &[Job],
    graph: &DependencyGraph<Package>,
    stage: &dyn Stage,
  ) -> Result<Vec<CompiledPackageRef>, CompileError> {
    let needed = required_packages(jobs, graph)?;
    let order = graph.sort_ids(&needed)?;
    info!(jobs = jobs.len(), packages = order.len(), "compiling job dependencies");

    let mut refs = Vec::with_capacity(order.len());
    for id in order {
      let pkg = graph.get(id);
      let step = format!("Compiling package '{}/{}'", pkg.name(), pkg.fingerprint());
      let record = perform(stage, &step, self.compiler.compile(graph, id)).await?;

      refs.push(CompiledPackageRef {
        name: pkg.name().to_string(),
        version: pkg.fingerprint().to_string(),
        blob_id: record.blob_id,
        sha1: record.blob_sha1,
      });
    }

    Ok(refs)
  }
}

/// Every package the jobs name plus their transitive dependencies, once.
fn required_packages(jobs: &[Job], graph: &DependencyGraph<Package>) -> Result<Vec<PackageId>, CompileError> {
  let mut seen = BTreeSet::new();

  for job in jobs {
    for name in &job.package_names {
      let id = graph.find(name).ok_or_else(|| CompileError::UnknownPackage {
        job: job.name().to_string(),
        package: name.clone(),
      })?;
      if seen.insert(id) {
        seen.extend(graph.resolve_dependencies(id));
      }
    }
  }

  Ok(seen.into_iter().collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compile::{CompileConfig, CompiledPackageRepo};
  use crate::compress::TarballCompressor;
  use crate::resource::Resource;
  use crate::util::testutil::{MemoryBlobstore, RecordingCmdRunner, RecordingReporter};
  use std::path::Path;
  use std::sync::Arc;
  use tempfile::tempdir;

  fn source_package(root: &Path, name: &str, deps: &[&str]) -> Package {
    let src = root.join("src").join(name);
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("packaging"), "echo compile").unwrap();
    Package::new(
      Resource::existing(name, format!("{name}-fp")),
      deps.iter().map(|d| d.to_string()).collect(),
    )
    .with_extracted_path(src)
  }

  fn job(name: &str, packages: &[&str]) -> Job {
    let mut job = Job::new(Resource::existing(name, format!("{name}-fp")));
    job.package_names = packages.iter().map(|p| p.to_string()).collect();
    job
  }

  fn compiler(root: &Path, runner: Arc<RecordingCmdRunner>) -> DependencyCompiler {
    DependencyCompiler::new(PackageCompiler::new(
      runner,
      Arc::new(TarballCompressor::new()),
      Arc::new(MemoryBlobstore::new()),
      Arc::new(CompiledPackageRepo::new(root.join("compiled.yml"))),
      CompileConfig {
        packages_dir: root.join("packages"),
        ..Default::default()
      },
    ))
  }

  fn scenario(root: &Path) -> DependencyGraph<Package> {
    DependencyGraph::link(vec![
      source_package(root, "director", &["libpq", "mysql", "ruby"]),
      source_package(root, "nats", &["ruby"]),
      source_package(root, "ruby", &[]),
      source_package(root, "libpq", &[]),
      source_package(root, "mysql", &[]),
      source_package(root, "unused", &[]),
    ])
    .unwrap()
  }

  #[tokio::test]
  async fn compiles_union_of_job_packages_in_order() {
    let temp = tempdir().unwrap();
    let graph = scenario(temp.path());
    let runner = Arc::new(RecordingCmdRunner::new());
    let reporter = RecordingReporter::default();

    let jobs = vec![job("director", &["director"]), job("nats", &["nats", "ruby"])];
    let refs = compiler(temp.path(), runner.clone())
      .compile(&jobs, &graph, &reporter)
      .await
      .unwrap();

    let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names.len(), 5);
    assert!(!names.contains(&"unused"));
    let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
    assert!(pos("ruby") < pos("nats"));
    assert!(pos("ruby") < pos("director"));
    assert!(pos("libpq") < pos("director"));
    assert!(pos("mysql") < pos("director"));
    assert_eq!(runner.count(), 5);

    let events = reporter.events();
    assert_eq!(events.len(), 10);
    assert!(events.contains(&"started Compiling package 'ruby/ruby-fp'".to_string()));
    assert!(events.contains(&"finished Compiling package 'director/director-fp'".to_string()));
  }

  #[tokio::test]
  async fn first_failure_stops_remaining_steps() {
    let temp = tempdir().unwrap();
    let graph = scenario(temp.path());
    let runner = Arc::new(RecordingCmdRunner::new());
    runner.fail_with(1);
    let reporter = RecordingReporter::default();

    let err = compiler(temp.path(), runner.clone())
      .compile(&[job("nats", &["nats"])], &graph, &reporter)
      .await
      .unwrap_err();

    assert!(matches!(err, CompileError::Script { .. }));
    assert_eq!(runner.count(), 1);
    let events = reporter.events();
    assert_eq!(events.len(), 2);
    assert!(events[1].starts_with("failed Compiling package 'ruby/ruby-fp': compiling package 'ruby'"));
  }

  #[tokio::test]
  async fn unknown_job_package_fails() {
    let temp = tempdir().unwrap();
    let graph = scenario(temp.path());
    let err = compiler(temp.path(), Arc::new(RecordingCmdRunner::new()))
      .compile(&[job("web", &["missing"])], &graph, &RecordingReporter::default())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "job 'web' requires package 'missing' which is not in the release");
  }
}
