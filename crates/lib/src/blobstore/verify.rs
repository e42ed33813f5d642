use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{Blobstore, BlobstoreError};
use crate::util::digest::Digest;

/// Checks fetched blobs against the expected digest before handing them out.
pub struct VerifyingBlobstore {
  inner: Arc<dyn Blobstore>,
}

impl VerifyingBlobstore {
  pub fn new(inner: Arc<dyn Blobstore>) -> Self {
    Self { inner }
  }
}

#[async_trait]
impl Blobstore for VerifyingBlobstore {
  async fn get(&self, blob_id: &str, digest: &Digest) -> Result<PathBuf, BlobstoreError> {
    let path = self.inner.get(blob_id, digest).await?;

    if let Err(source) = digest.verify_file(&path) {
      warn!(blob_id, expected = %digest, "fetched blob does not match digest");
      self.inner.clean_up(&path).await?;
      return Err(BlobstoreError::Verify {
        blob_id: blob_id.to_string(),
        source,
      });
    }

    Ok(path)
  }

  async fn create(&self, path: &Path) -> Result<(String, Digest), BlobstoreError> {
    self.inner.create(path).await
  }

  async fn clean_up(&self, path: &Path) -> Result<(), BlobstoreError> {
    self.inner.clean_up(path).await
  }

  async fn delete(&self, blob_id: &str) -> Result<(), BlobstoreError> {
    self.inner.delete(blob_id).await
  }

  async fn validate(&self) -> Result<(), BlobstoreError> {
    self.inner.validate().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blobstore::LocalBlobstore;
  use crate::util::digest::{DigestAlgorithm, calculate_bytes};
  use tempfile::tempdir;

  #[tokio::test]
  async fn rejects_and_cleans_up_mismatched_blob() {
    let store_dir = tempdir().unwrap();
    let work = tempdir().unwrap();
    let src = work.path().join("artifact");
    std::fs::write(&src, "real content").unwrap();

    let local: Arc<dyn Blobstore> = Arc::new(LocalBlobstore::new(store_dir.path()));
    let (blob_id, digest) = local.create(&src).await.unwrap();
    let store = VerifyingBlobstore::new(local);

    let good = store.get(&blob_id, &digest).await.unwrap();
    store.clean_up(&good).await.unwrap();

    let wrong = calculate_bytes(b"other content", DigestAlgorithm::Sha1);
    let err = store.get(&blob_id, &wrong).await.unwrap_err();
    assert!(matches!(err, BlobstoreError::Verify { .. }));
  }
}
