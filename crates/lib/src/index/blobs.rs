use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::IndexError;
use crate::blobstore::Blobstore;
use crate::progress::IndexReporter;
use crate::util::digest::{self, Digest};
use crate::util::fs::{copy_file, move_file};

/// Sha1-addressed local cache of indexed archives, optionally mirrored
/// to a blobstore.
pub struct FsIndexBlobs {
  dir: PathBuf,
  reporter: Arc<dyn IndexReporter>,
  blobstore: Option<Arc<dyn Blobstore>>,
}

impl FsIndexBlobs {
  pub fn new(dir: impl Into<PathBuf>, reporter: Arc<dyn IndexReporter>, blobstore: Option<Arc<dyn Blobstore>>) -> Self {
    Self {
      dir: dir.into(),
      reporter,
      blobstore,
    }
  }

  fn blob_path(&self, digest: &Digest) -> PathBuf {
    self.dir.join(digest.hex())
  }

  /// Return a local copy matching `digest`, downloading it when needed.
  /// `kind` and `desc` name the index entry in progress reports.
  pub async fn get(&self, kind: &str, desc: &str, blob_id: Option<&str>, digest: &Digest) -> Result<PathBuf, IndexError> {
    let dst = self.blob_path(digest);

    if tokio::fs::try_exists(&dst).await.unwrap_or(false) {
      let actual = digest::calculate_file(&dst, digest.algorithm())?;
      if actual != *digest {
        return Err(IndexError::LocalCopyMismatch {
          path: dst,
          blob_id: blob_id.unwrap_or_default().to_string(),
          expected: digest.clone(),
          actual,
        });
      }
      return Ok(dst);
    }

    let (Some(blobstore), Some(blob_id)) = (&self.blobstore, blob_id.filter(|id| !id.is_empty())) else {
      return Err(IndexError::MissingBlob {
        name: desc.to_string(),
        sha1: digest.clone(),
      });
    };

    self.reporter.index_entry_download_started(kind, desc);

    let result = async {
      let path = blobstore.get(blob_id, digest).await.map_err(|source| IndexError::Blob {
        desc: desc.to_string(),
        source,
      })?;
      move_file(&path, &dst).await.map_err(|source| IndexError::Cache {
        desc: desc.to_string(),
        path: dst.clone(),
        source,
      })
    }
    .await;

    let err = result.as_ref().err().map(|e| e.to_string());
    self.reporter.index_entry_download_finished(kind, desc, err.as_deref());
    result?;

    debug!(kind, desc, blob_id, sha1 = %digest, path = ?dst, "cached downloaded blob");
    Ok(dst)
  }

  /// Copy `path` into the cache and upload it when a blobstore is
  /// configured. Returns the blob id (if uploaded) and the cached path.
  pub async fn add(
    &self,
    kind: &str,
    desc: &str,
    path: &Path,
    digest: &Digest,
  ) -> Result<(Option<String>, PathBuf), IndexError> {
    let dst = self.blob_path(digest);

    if !tokio::fs::try_exists(&dst).await.unwrap_or(false) {
      copy_file(path, &dst).await.map_err(|source| IndexError::Cache {
        desc: desc.to_string(),
        path: dst.clone(),
        source,
      })?;
    }

    let Some(blobstore) = &self.blobstore else {
      return Ok((None, dst));
    };

    self.reporter.index_entry_upload_started(kind, desc);

    let result = blobstore.create(path).await.map_err(|source| IndexError::Blob {
      desc: desc.to_string(),
      source,
    });

    let err = result.as_ref().err().map(|e| e.to_string());
    self.reporter.index_entry_upload_finished(kind, desc, err.as_deref());
    let (blob_id, _) = result?;
    debug!(kind, desc, blob_id = %blob_id, sha1 = %digest, "uploaded index blob");

    Ok((Some(blob_id), dst))
  }
}
