use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::config::{BlobstoreOptions, FsConfig};
use crate::blobstore::{Blobstore, ErrBlobstore, LocalBlobstore, RetryBlobstore, VerifyingBlobstore};

const LOCAL_PROVIDER: &str = "local";
const LOCAL_PATH_OPTION: &str = "blobstore_path";

/// Blobstore configured for the release directory at `release_dir`.
///
/// Configuration problems do not fail here: they come back as an
/// [`ErrBlobstore`] so only operations that need the blobstore fail.
pub async fn new_blobstore(release_dir: &Path) -> Arc<dyn Blobstore> {
  let config = FsConfig::in_release_dir(release_dir);

  let (provider, options) = match config.blobstore() {
    Ok(found) => found,
    Err(e) => {
      debug!(error = %e, "no usable blobstore configuration");
      return Arc::new(ErrBlobstore::new(e.to_string()));
    }
  };

  let inner: Arc<dyn Blobstore> = match provider.as_str() {
    LOCAL_PROVIDER => match local_path(release_dir, &options) {
      Some(path) => Arc::new(LocalBlobstore::new(path)),
      None => {
        return Arc::new(ErrBlobstore::new(format!(
          "expected non-empty '{LOCAL_PATH_OPTION}' option for the local blobstore"
        )));
      }
    },
    other => {
      return Arc::new(ErrBlobstore::new(format!(
        "unsupported blobstore provider '{other}', expected release blobstore to be configured"
      )));
    }
  };

  let blobstore: Arc<dyn Blobstore> = Arc::new(RetryBlobstore::new(Arc::new(VerifyingBlobstore::new(inner))));

  if let Err(e) = blobstore.validate().await {
    warn!(provider = %provider, error = %e, "blobstore failed validation");
    return Arc::new(ErrBlobstore::new(e.to_string()));
  }

  blobstore
}

/// `blobstore_path`, resolved against the release directory when relative.
fn local_path(release_dir: &Path, options: &BlobstoreOptions) -> Option<PathBuf> {
  let path = options.get(LOCAL_PATH_OPTION)?.as_str()?;
  if path.is_empty() {
    return None;
  }
  Some(release_dir.join(path))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::digest::{DigestAlgorithm, calculate_bytes};
  use std::fs;
  use tempfile::tempdir;

  fn write_config(dir: &Path, yaml: &str) {
    fs::create_dir_all(dir.join("config")).unwrap();
    fs::write(dir.join("config/final.yml"), yaml).unwrap();
  }

  #[tokio::test]
  async fn local_provider_stores_blobs() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), "blobstore: {provider: local}\n");
    fs::write(
      dir.path().join("config/private.yml"),
      "blobstore: {options: {blobstore_path: store}}\n",
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("store")).unwrap();

    let blobstore = new_blobstore(dir.path()).await;
    let src = dir.path().join("file");
    fs::write(&src, "content").unwrap();

    let (blob_id, digest) = blobstore.create(&src).await.unwrap();
    assert_eq!(digest, calculate_bytes(b"content", DigestAlgorithm::Sha1));
    assert!(dir.path().join("store").join(&blob_id).exists());
  }

  #[tokio::test]
  async fn misconfiguration_fails_on_use() {
    let dir = tempdir().unwrap();

    let blobstore = new_blobstore(dir.path()).await;
    let err = blobstore.validate().await.unwrap_err();
    assert!(err.to_string().contains("blobstore.provider"));

    write_config(dir.path(), "blobstore: {provider: s3}\n");
    let err = new_blobstore(dir.path()).await.validate().await.unwrap_err();
    assert!(err.to_string().contains("unsupported blobstore provider 's3'"));

    write_config(dir.path(), "blobstore: {provider: local}\n");
    let err = new_blobstore(dir.path()).await.validate().await.unwrap_err();
    assert!(err.to_string().contains("blobstore_path"));
  }
}
