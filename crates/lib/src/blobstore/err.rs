use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Blobstore, BlobstoreError};
use crate::util::digest::Digest;

/// Stands in for a blobstore that could not be configured. Every call
/// fails with the configuration problem, so commands that never touch the
/// blobstore still work.
#[derive(Debug, Clone)]
pub struct ErrBlobstore {
  reason: String,
}

impl ErrBlobstore {
  pub fn new(reason: impl Into<String>) -> Self {
    Self { reason: reason.into() }
  }

  fn err(&self) -> BlobstoreError {
    BlobstoreError::Config(self.reason.clone())
  }
}

#[async_trait]
impl Blobstore for ErrBlobstore {
  async fn get(&self, _blob_id: &str, _digest: &Digest) -> Result<PathBuf, BlobstoreError> {
    Err(self.err())
  }

  async fn create(&self, _path: &Path) -> Result<(String, Digest), BlobstoreError> {
    Err(self.err())
  }

  async fn clean_up(&self, _path: &Path) -> Result<(), BlobstoreError> {
    Err(self.err())
  }

  async fn delete(&self, _blob_id: &str) -> Result<(), BlobstoreError> {
    Err(self.err())
  }

  async fn validate(&self) -> Result<(), BlobstoreError> {
    Err(self.err())
  }
}
