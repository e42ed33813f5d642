use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{Blobstore, BlobstoreError};
use crate::util::digest::{self, Digest, DigestAlgorithm};

/// Stores blobs as uuid-named files in a single directory.
#[derive(Debug, Clone)]
pub struct LocalBlobstore {
  root: PathBuf,
}

impl LocalBlobstore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn blob_path(&self, blob_id: &str) -> PathBuf {
    self.root.join(blob_id)
  }
}

#[async_trait]
impl Blobstore for LocalBlobstore {
  async fn get(&self, blob_id: &str, _digest: &Digest) -> Result<PathBuf, BlobstoreError> {
    let src = self.blob_path(blob_id);
    if !fs::try_exists(&src).await.map_err(|e| BlobstoreError::io(&src, e))? {
      return Err(BlobstoreError::NotFound(blob_id.to_string()));
    }

    let dst = tempfile::Builder::new()
      .prefix("boshrel-blob-")
      .tempfile()
      .and_then(|f| f.keep().map_err(|e| e.error))
      .map_err(|e| BlobstoreError::io(&src, e))?
      .1;

    fs::copy(&src, &dst).await.map_err(|e| BlobstoreError::io(&src, e))?;
    debug!(blob_id, path = ?dst, "fetched blob from local blobstore");
    Ok(dst)
  }

  async fn create(&self, path: &Path) -> Result<(String, Digest), BlobstoreError> {
    let digest = digest::calculate_file(path, DigestAlgorithm::Sha1)?;
    let blob_id = Uuid::new_v4().to_string();
    let dst = self.blob_path(&blob_id);

    fs::create_dir_all(&self.root)
      .await
      .map_err(|e| BlobstoreError::io(&self.root, e))?;
    fs::copy(path, &dst).await.map_err(|e| BlobstoreError::io(path, e))?;

    debug!(blob_id = %blob_id, sha1 = %digest, "stored blob in local blobstore");
    Ok((blob_id, digest))
  }

  async fn clean_up(&self, path: &Path) -> Result<(), BlobstoreError> {
    match fs::remove_file(path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(BlobstoreError::io(path, e)),
    }
  }

  async fn delete(&self, blob_id: &str) -> Result<(), BlobstoreError> {
    let path = self.blob_path(blob_id);
    match fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobstoreError::NotFound(blob_id.to_string())),
      Err(e) => Err(BlobstoreError::io(&path, e)),
    }
  }

  async fn validate(&self) -> Result<(), BlobstoreError> {
    if self.root.as_os_str().is_empty() {
      return Err(BlobstoreError::Config("local blobstore requires 'blobstore_path'".to_string()));
    }
    Ok(())
  }
}
