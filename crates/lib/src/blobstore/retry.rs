use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Blobstore, BlobstoreError};
use crate::util::digest::Digest;

const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Repeats calls that fail with retryable errors.
pub struct RetryBlobstore {
  inner: Arc<dyn Blobstore>,
  attempts: usize,
  delay: Duration,
}

impl RetryBlobstore {
  pub fn new(inner: Arc<dyn Blobstore>) -> Self {
    Self::with_policy(inner, DEFAULT_ATTEMPTS, DEFAULT_DELAY)
  }

  pub fn with_policy(inner: Arc<dyn Blobstore>, attempts: usize, delay: Duration) -> Self {
    Self {
      inner,
      attempts: attempts.max(1),
      delay,
    }
  }

  async fn retry<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, BlobstoreError>
  where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, BlobstoreError>>,
  {
    let mut attempt = 1;
    loop {
      match f().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_retryable() && attempt < self.attempts => {
          warn!(op, attempt, error = %e, "blobstore call failed, retrying");
          attempt += 1;
          tokio::time::sleep(self.delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

#[async_trait]
impl Blobstore for RetryBlobstore {
  async fn get(&self, blob_id: &str, digest: &Digest) -> Result<PathBuf, BlobstoreError> {
    self.retry("get", || self.inner.get(blob_id, digest)).await
  }

  async fn create(&self, path: &Path) -> Result<(String, Digest), BlobstoreError> {
    self.retry("create", || self.inner.create(path)).await
  }

  async fn clean_up(&self, path: &Path) -> Result<(), BlobstoreError> {
    self.inner.clean_up(path).await
  }

  async fn delete(&self, blob_id: &str) -> Result<(), BlobstoreError> {
    self.retry("delete", || self.inner.delete(blob_id)).await
  }

  async fn validate(&self) -> Result<(), BlobstoreError> {
    self.inner.validate().await
  }
}
