//! Content store abstraction.
//!
//! A [`Blobstore`] stores opaque files under ids it assigns. Concrete
//! backends are swappable; the rest of the crate only relies on this
//! contract, optionally wrapped by [`VerifyingBlobstore`] and
//! [`RetryBlobstore`].

mod err;
mod local;
mod retry;
mod verify;

pub use err::ErrBlobstore;
pub use local::LocalBlobstore;
pub use retry::RetryBlobstore;
pub use verify::VerifyingBlobstore;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::util::digest::{Digest, DigestError};

#[derive(Debug, Error)]
pub enum BlobstoreError {
  #[error("blob '{0}' not found")]
  NotFound(String),

  #[error("blobstore I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("blob '{blob_id}' failed verification: {source}")]
  Verify {
    blob_id: String,
    #[source]
    source: DigestError,
  },

  #[error(transparent)]
  Digest(#[from] DigestError),

  #[error("blobstore is misconfigured: {0}")]
  Config(String),
}

impl BlobstoreError {
  pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
    Self::Io {
      path: path.to_path_buf(),
      source,
    }
  }

  /// Whether repeating the same call could succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Io { .. })
  }
}

#[async_trait]
pub trait Blobstore: Send + Sync {
  /// Fetch a blob into a new local file and return its path. Callers
  /// release the file with [`Blobstore::clean_up`].
  async fn get(&self, blob_id: &str, digest: &Digest) -> Result<PathBuf, BlobstoreError>;

  /// Store a copy of `path`, returning the assigned id and its SHA1 digest.
  async fn create(&self, path: &Path) -> Result<(String, Digest), BlobstoreError>;

  async fn clean_up(&self, path: &Path) -> Result<(), BlobstoreError>;

  async fn delete(&self, blob_id: &str) -> Result<(), BlobstoreError>;

  async fn validate(&self) -> Result<(), BlobstoreError>;
}
