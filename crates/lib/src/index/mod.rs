//! Fingerprint-addressed indices of built archives.
//!
//! Dev and final builds are recorded per resource kind in
//! `index.yml` files (see [`FsIndex`]); the archives themselves live in a
//! sha1-addressed local cache that can be backed by a blobstore
//! ([`FsIndexBlobs`]). [`FileIndex`] is the generic keyed YAML store used
//! for compiled package records.

mod blobs;
mod file_index;
mod fs_index;

pub use blobs::FsIndexBlobs;
pub use file_index::FileIndex;
pub use fs_index::FsIndex;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::blobstore::{Blobstore, BlobstoreError};
use crate::progress::IndexReporter;
use crate::resource::ArchiveRef;
use crate::util::digest::{Digest, DigestError};

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("expected non-empty {0}")]
  Empty(&'static str),

  #[error("entry not found")]
  NotFound,

  #[error("failed to read index {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse index {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to write index {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize index: {0}")]
  Serialize(#[source] serde_yaml::Error),

  #[error("trying to add duplicate index entry '{desc}' with SHA1 '{sha1}'")]
  Duplicate { desc: String, sha1: String },

  #[error("internal inconsistency: entry '{desc}' {problem}")]
  Inconsistent { desc: String, problem: &'static str },

  #[error(transparent)]
  Digest(#[from] DigestError),

  #[error("expected local copy {path} of blob '{blob_id}' to have SHA1 '{expected}' but was '{actual}'")]
  LocalCopyMismatch {
    path: PathBuf,
    blob_id: String,
    expected: Digest,
    actual: Digest,
  },

  #[error("cannot find blob named '{name}' with SHA1 '{sha1}'")]
  MissingBlob { name: String, sha1: Digest },

  #[error("transferring blob for '{desc}': {source}")]
  Blob {
    desc: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("caching blob for '{desc}' at {path}: {source}")]
  Cache {
    desc: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[async_trait]
pub trait ArchiveIndex: Send + Sync {
  /// Look up a build by name and fingerprint. `Ok(None)` when absent.
  async fn find(&self, name: &str, fingerprint: &str) -> Result<Option<ArchiveRef>, IndexError>;

  /// Record a new build, returning where the indexed archive now lives.
  async fn add(&self, name: &str, fingerprint: &str, path: &Path, digest: &Digest) -> Result<ArchiveRef, IndexError>;
}

/// One index per resource kind.
#[derive(Clone)]
pub struct ArchiveIndices {
  pub jobs: Arc<dyn ArchiveIndex>,
  pub packages: Arc<dyn ArchiveIndex>,
  pub licenses: Arc<dyn ArchiveIndex>,
}

impl ArchiveIndices {
  /// Dev indices under `.dev_builds` and final indices under
  /// `.final_builds` of `release_dir`, sharing the blob cache in
  /// `cache_dir`. Only final builds are uploaded to `blobstore`.
  pub fn dev_and_final(
    release_dir: &Path,
    cache_dir: &Path,
    reporter: Arc<dyn IndexReporter>,
    blobstore: Arc<dyn Blobstore>,
  ) -> (Self, Self) {
    let dev_blobs = Arc::new(FsIndexBlobs::new(cache_dir, reporter.clone(), None));
    let final_blobs = Arc::new(FsIndexBlobs::new(cache_dir, reporter.clone(), Some(blobstore)));

    let indices = |dir: PathBuf, final_builds: bool, blobs: Arc<FsIndexBlobs>| Self {
      jobs: Arc::new(FsIndex::new(
        "job",
        dir.join("jobs"),
        true,
        final_builds,
        reporter.clone(),
        blobs.clone(),
      )),
      packages: Arc::new(FsIndex::new(
        "package",
        dir.join("packages"),
        true,
        final_builds,
        reporter.clone(),
        blobs.clone(),
      )),
      licenses: Arc::new(FsIndex::new("license", dir.join("license"), false, final_builds, reporter.clone(), blobs)),
    };

    (
      indices(release_dir.join(".dev_builds"), false, dev_blobs),
      indices(release_dir.join(".final_builds"), true, final_blobs),
    )
  }
}
