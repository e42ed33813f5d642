//! Package compilation.
//!
//! [`PackageCompiler`] compiles a single source package once its
//! dependencies are compiled, caching results in a
//! [`CompiledPackageRepo`]. [`DependencyCompiler`] drives it over every
//! package a set of jobs needs, in dependency order.

mod dependency;
mod installer;
mod package;
mod repo;
mod types;

pub use dependency::DependencyCompiler;
pub use installer::PackageInstaller;
pub use package::PackageCompiler;
pub use repo::{CompiledPackageRepo, dependency_key};
pub use types::{CompileConfig, CompiledPackageRecord, CompiledPackageRef};

use std::path::PathBuf;

use thiserror::Error;

use crate::blobstore::BlobstoreError;
use crate::cmd::CmdError;
use crate::compress::CompressError;
use crate::index::IndexError;
use crate::release::GraphError;

#[derive(Debug, Error)]
pub enum CompileError {
  #[error("attempting to find compiled package '{name}': {source}")]
  Find {
    name: String,
    #[source]
    source: IndexError,
  },

  #[error("compiled package '{0}' not found")]
  DependencyNotCompiled(String),

  #[error("fetching compiled package '{name}': {source}")]
  Fetch {
    name: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("installing package '{name}' into {dir}: {source}")]
  Install {
    name: String,
    dir: PathBuf,
    #[source]
    source: CompressError,
  },

  #[error("creating package install dir {path}: {source}")]
  InstallDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("package '{0}' has no extracted sources")]
  NoSources(String),

  #[error("packaging script for package '{0}' not found")]
  MissingPackaging(String),

  #[error("compiling package '{name}': {source}")]
  Script {
    name: String,
    #[source]
    source: CmdError,
  },

  #[error("compressing compiled package '{name}': {source}")]
  Compress {
    name: String,
    #[source]
    source: CompressError,
  },

  #[error("creating blob for package '{name}': {source}")]
  CreateBlob {
    name: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("saving compiled package '{name}': {source}")]
  Save {
    name: String,
    #[source]
    source: IndexError,
  },

  #[error("job '{job}' requires package '{package}' which is not in the release")]
  UnknownPackage { job: String, package: String },

  #[error(transparent)]
  Graph(#[from] GraphError),
}
