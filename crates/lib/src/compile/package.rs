use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{CompileConfig, CompileError, CompiledPackageRecord, CompiledPackageRef, CompiledPackageRepo, PackageInstaller};
use crate::blobstore::Blobstore;
use crate::cmd::{Cmd, CmdRunner};
use crate::compress::Compressor;
use crate::consts::{COMPILE_PATH, PACKAGING_SCRIPT};
use crate::release::{DependencyGraph, Package, PackageId};
use crate::util;

/// Compiles one source package whose dependencies are already compiled.
pub struct PackageCompiler {
  runner: Arc<dyn CmdRunner>,
  compressor: Arc<dyn Compressor>,
  blobstore: Arc<dyn Blobstore>,
  repo: Arc<CompiledPackageRepo>,
  installer: PackageInstaller,
  config: CompileConfig,
}

impl PackageCompiler {
  pub fn new(
    runner: Arc<dyn CmdRunner>,
    compressor: Arc<dyn Compressor>,
    blobstore: Arc<dyn Blobstore>,
    repo: Arc<CompiledPackageRepo>,
    config: CompileConfig,
  ) -> Self {
    let installer = PackageInstaller::new(blobstore.clone(), compressor.clone());
    Self {
      runner,
      compressor,
      blobstore,
      repo,
      installer,
      config,
    }
  }

  pub fn repo(&self) -> &CompiledPackageRepo {
    &self.repo
  }

  /// Compile `id`, or return the cached record when its dependency
  /// closure has been compiled before.
  pub async fn compile(
    &self,
    graph: &DependencyGraph<Package>,
    id: PackageId,
  ) -> Result<CompiledPackageRecord, CompileError> {
    let pkg = graph.get(id);
    debug!(package = %pkg.name(), fingerprint = %pkg.fingerprint(), "checking for compiled package");

    if let Some(record) = self.find(graph, id)? {
      debug!(package = %pkg.name(), blob_id = %record.blob_id, "using cached compiled package");
      return Ok(record);
    }

    let result = self.compile_fresh(graph, id).await;

    if let Err(e) = util::fs::remove_all(&self.config.packages_dir).await {
      warn!(dir = ?self.config.packages_dir, error = %e, "failed to remove packages dir");
    }

    result
  }

  async fn compile_fresh(
    &self,
    graph: &DependencyGraph<Package>,
    id: PackageId,
  ) -> Result<CompiledPackageRecord, CompileError> {
    let pkg = graph.get(id);
    let name = pkg.name().to_string();
    let packages_dir = &self.config.packages_dir;

    for &dep_id in graph.dependencies(id) {
      let dep = graph.get(dep_id);
      let record = self
        .find(graph, dep_id)?
        .ok_or_else(|| CompileError::DependencyNotCompiled(dep.name().to_string()))?;

      debug!(package = %name, dependency = %dep.name(), "installing dependency");
      let dep_ref = CompiledPackageRef {
        name: dep.name().to_string(),
        version: dep.fingerprint().to_string(),
        blob_id: record.blob_id,
        sha1: record.blob_sha1,
      };
      self.installer.install(&dep_ref, packages_dir).await?;
    }

    let install_dir = packages_dir.join(&name);
    tokio::fs::create_dir_all(&install_dir)
      .await
      .map_err(|source| CompileError::InstallDir {
        path: install_dir.clone(),
        source,
      })?;

    let src_dir = pkg
      .extracted_path()
      .ok_or_else(|| CompileError::NoSources(name.clone()))?;
    if !src_dir.join(PACKAGING_SCRIPT).exists() {
      return Err(CompileError::MissingPackaging(name));
    }

    info!(package = %name, fingerprint = %pkg.fingerprint(), "compiling package");
    let cmd = self.packaging_command(&name, src_dir, &install_dir);
    self
      .runner
      .run_complex_command(&cmd)
      .await
      .map_err(|source| CompileError::Script {
        name: name.clone(),
        source,
      })?;

    let tarball = self
      .compressor
      .compress_files_in_dir(&install_dir)
      .map_err(|source| CompileError::Compress {
        name: name.clone(),
        source,
      })?;

    let created = self.blobstore.create(&tarball).await;
    if let Err(e) = self.compressor.clean_up(&tarball) {
      warn!(tarball = ?tarball, error = %e, "failed to clean up compiled package tarball");
    }
    let (blob_id, blob_sha1) = created.map_err(|source| CompileError::CreateBlob {
      name: name.clone(),
      source,
    })?;

    let record = CompiledPackageRecord { blob_id, blob_sha1 };
    self
      .repo
      .save(graph, id, record.clone())
      .map_err(|source| CompileError::Save { name, source })?;

    Ok(record)
  }

  fn find(&self, graph: &DependencyGraph<Package>, id: PackageId) -> Result<Option<CompiledPackageRecord>, CompileError> {
    self.repo.find(graph, id).map_err(|source| CompileError::Find {
      name: graph.get(id).name().to_string(),
      source,
    })
  }

  fn packaging_command(&self, name: &str, src_dir: &Path, install_dir: &Path) -> Cmd {
    Cmd::new(&self.config.shell)
      .arg("-x")
      .arg(PACKAGING_SCRIPT)
      .env("BOSH_COMPILE_TARGET", src_dir.to_string_lossy())
      .env("BOSH_INSTALL_TARGET", install_dir.to_string_lossy())
      .env("BOSH_PACKAGE_NAME", name)
      .env("BOSH_PACKAGES_DIR", self.config.packages_dir.to_string_lossy())
      .env("PATH", COMPILE_PATH)
      .working_dir(src_dir)
      .isolated()
  }
}
