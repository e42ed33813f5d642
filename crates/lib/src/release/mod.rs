//! Release model: jobs, packages, license, and the readers, writer and
//! validator that move releases between directories, tarballs and memory.

mod archive_reader;
mod dir_reader;
pub mod graph;
mod job;
mod license;
pub mod manifest;
mod pkg;
mod types;
pub mod validator;
mod writer;

pub use archive_reader::ArchiveReader;
pub use dir_reader::DirReader;
pub use graph::{DependencyGraph, Dependent, GraphError, PackageId};
pub use job::Job;
pub use license::License;
pub use pkg::{CompiledPackage, Package};
pub use types::{Release, ReleasePackages};
pub use writer::ArchiveWriter;

use std::path::PathBuf;

use thiserror::Error;

use crate::compress::CompressError;
use crate::error::MultiError;
use crate::resource::ResourceError;
use crate::util::digest::DigestError;
use validator::ValidationError;

#[derive(Debug, Error)]
pub enum ReleaseError {
  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Yaml {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Resource(#[from] ResourceError),

  #[error(transparent)]
  Compress(#[from] CompressError),

  #[error(transparent)]
  Digest(#[from] DigestError),

  #[error("job '{job}' requires package '{package}' which is not in the release")]
  JobPackageNotFound { job: String, package: String },

  #[error("expected to find '{path}' for package '{package}'")]
  MissingPackaging { package: String, path: PathBuf },

  #[error("expected special '{file}' file to not be included via 'files' key for package '{package}'")]
  SpecialFileIncluded { file: String, package: String },

  #[error("missing files for pattern '{pattern}'")]
  MissingFiles { pattern: String },

  #[error("invalid file pattern '{pattern}': {source}")]
  Glob {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  #[error("job directory '{dir}' does not match job name '{name}' in spec")]
  JobNameMismatch { dir: String, name: String },

  #[error("job '{job}' is missing template '{template}'")]
  MissingTemplate { job: String, template: String },

  #[error("release '{name}/{version}' mixes source and compiled packages")]
  MixedPackages { name: String, version: String },

  #[error("release is missing {what} '{name}'")]
  MissingArchive { what: &'static str, name: String },

  #[error("{0}")]
  Multiple(#[from] MultiError<ReleaseError>),

  #[error("{0}")]
  Invalid(#[from] MultiError<ValidationError>),
}

impl ReleaseError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}
