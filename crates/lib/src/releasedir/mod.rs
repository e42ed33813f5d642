//! Release directories: config, tracked blobs, dev and final release
//! indices, and the build/finalize lifecycle tying them together.

mod blobs;
mod config;
mod git;
mod provider;
mod release_dir;
mod release_index;
pub mod version;

pub use blobs::{Blob, BlobsDirError, FsBlobsDir};
pub use config::{BlobstoreOptions, FsConfig};
pub use git::{EMPTY_REPO_COMMIT, GitRepo, NON_GIT_COMMIT};
pub use provider::new_blobstore;
pub use release_dir::{FsReleaseDir, ReleaseDirConfig};
pub use release_index::FsReleaseIndex;
pub use version::{ReleaseVersion, VersionError};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cmd::CmdError;
use crate::index::IndexError;
use crate::release::ReleaseError;
use crate::resource::ResourceError;

#[derive(Debug, Error)]
pub enum ReleaseDirError {
  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid YAML in {path}: {source}")]
  Yaml {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("expected non-empty '{key}' in config '{}'", path.display())]
  MissingConfig { key: &'static str, path: PathBuf },

  #[error("expected non-empty release name")]
  EmptyName,

  #[error("expected non-empty release version")]
  EmptyVersion,

  #[error("release version '{0}' already exists")]
  VersionExists(String),

  #[error("release '{name}' version '{version}' already exists")]
  ReleaseExists { name: String, version: String },

  #[error("expected to find at least one dev or final version")]
  NoVersions,

  #[error("parsing release versions in {path}: {source}")]
  VersionParse {
    path: PathBuf,
    #[source]
    source: VersionError,
  },

  #[error("incrementing last {kind} version: {source}")]
  Increment {
    kind: &'static str,
    #[source]
    source: VersionError,
  },

  #[error("git repository has local modifications:\n\n{0}\n\nuse --force to continue anyway")]
  Dirty(String),

  #[error("git {action} failed: {source}")]
  Git {
    action: &'static str,
    #[source]
    source: CmdError,
  },

  #[error(transparent)]
  Blobs(#[from] BlobsDirError),

  #[error(transparent)]
  Release(#[from] ReleaseError),

  #[error(transparent)]
  Resource(#[from] ResourceError),

  #[error(transparent)]
  Index(#[from] IndexError),
}

impl ReleaseDirError {
  pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
    Self::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}
