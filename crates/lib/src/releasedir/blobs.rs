//! Large source files tracked in `config/blobs.yml` and stored under
//! `blobs/`, uploaded to and downloaded from the release blobstore.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::blobstore::{Blobstore, BlobstoreError};
use crate::consts::BLOBS_INDEX_FILENAME;
use crate::error::MultiError;
use crate::progress::BlobsDirReporter;
use crate::util::digest::{self, Digest, DigestAlgorithm, DigestError};
use crate::util::fs::{move_file, remove_all};

#[derive(Debug, Error)]
pub enum BlobsDirError {
  #[error("blobs I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("reading blobs index {path}: {source}")]
  Index {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error(transparent)]
  Digest(#[from] DigestError),

  #[error("creating blob for path '{path}': {source}")]
  Create {
    path: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("getting blob '{blob_id}' for path '{path}': {source}")]
  Get {
    blob_id: String,
    path: String,
    #[source]
    source: BlobstoreError,
  },

  #[error("invalid blob path '{0}': expected a relative path under blobs/")]
  InvalidPath(String),

  #[error("blob download task failed: {0}")]
  Task(String),

  #[error(transparent)]
  Multiple(#[from] MultiError<BlobsDirError>),
}

impl BlobsDirError {
  fn io(path: &Path, source: std::io::Error) -> Self {
    Self::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// A tracked blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blob {
  pub path: String,
  pub size: u64,
  /// Set once the blob has been uploaded.
  pub blob_id: Option<String>,
  pub sha1: Digest,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobEntry {
  size: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  object_id: Option<String>,
  sha: Digest,
}

pub struct FsBlobsDir {
  index_path: PathBuf,
  dir: PathBuf,
  reporter: Arc<dyn BlobsDirReporter>,
  blobstore: Arc<dyn Blobstore>,
}

impl FsBlobsDir {
  pub fn new(release_dir: &Path, reporter: Arc<dyn BlobsDirReporter>, blobstore: Arc<dyn Blobstore>) -> Self {
    Self {
      index_path: release_dir.join("config").join(BLOBS_INDEX_FILENAME),
      dir: release_dir.join("blobs"),
      reporter,
      blobstore,
    }
  }

  /// Write an empty blobs index.
  pub async fn init(&self) -> Result<(), BlobsDirError> {
    if let Some(parent) = self.index_path.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| BlobsDirError::io(parent, e))?;
    }
    tokio::fs::write(&self.index_path, "--- {}\n")
      .await
      .map_err(|e| BlobsDirError::io(&self.index_path, e))
  }

  /// Tracked blobs, sorted by path. A missing index tracks nothing.
  pub async fn blobs(&self) -> Result<Vec<Blob>, BlobsDirError> {
    let contents = match tokio::fs::read_to_string(&self.index_path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
      Err(e) => return Err(BlobsDirError::io(&self.index_path, e)),
    };

    let entries: BTreeMap<String, BlobEntry> = if contents.trim().is_empty() {
      BTreeMap::new()
    } else {
      serde_yaml::from_str::<Option<BTreeMap<String, BlobEntry>>>(&contents)
        .map_err(|source| BlobsDirError::Index {
          path: self.index_path.clone(),
          source,
        })?
        .unwrap_or_default()
    };

    Ok(
      entries
        .into_iter()
        .map(|(path, entry)| Blob {
          path,
          size: entry.size,
          blob_id: entry.object_id.filter(|id| !id.is_empty()),
          sha1: entry.sha,
        })
        .collect(),
    )
  }

  /// Copy `src` into `blobs/<path>` and track it. Re-tracking a path
  /// replaces its entry and forgets any previous upload.
  pub async fn track_blob<R>(&self, path: &str, src: &mut R) -> Result<Blob, BlobsDirError>
  where
    R: AsyncRead + Unpin + ?Sized,
  {
    let dst = self.local_path(path)?;
    let temp = tempfile::NamedTempFile::new().map_err(|e| BlobsDirError::io(&std::env::temp_dir(), e))?;
    let temp_path = temp.path().to_path_buf();

    let mut file = tokio::fs::File::from_std(temp.reopen().map_err(|e| BlobsDirError::io(&temp_path, e))?);
    let size = tokio::io::copy(src, &mut file)
      .await
      .map_err(|e| BlobsDirError::io(&temp_path, e))?;
    file.flush().await.map_err(|e| BlobsDirError::io(&temp_path, e))?;
    drop(file);

    let sha1 = digest::calculate_file(&temp_path, DigestAlgorithm::Sha1)?;

    let mut blobs = self.blobs().await?;
    let blob = Blob {
      path: path.to_string(),
      size,
      blob_id: None,
      sha1,
    };
    blobs.retain(|b| b.path != path);
    blobs.push(blob.clone());

    let temp_path = temp.into_temp_path();
    move_file(&temp_path, &dst).await.map_err(|e| BlobsDirError::io(&dst, e))?;
    self.save(&blobs).await?;

    info!(path, size, sha1 = %blob.sha1, "tracking blob");
    Ok(blob)
  }

  /// Remove `blobs/<path>` and its entry.
  pub async fn untrack_blob(&self, path: &str) -> Result<(), BlobsDirError> {
    let local = self.local_path(path)?;
    let mut blobs = self.blobs().await?;

    remove_all(&local).await.map_err(|e| BlobsDirError::io(&local, e))?;

    let before = blobs.len();
    blobs.retain(|b| b.path != path);
    if blobs.len() != before {
      self.save(&blobs).await?;
      info!(path, "untracked blob");
    }
    Ok(())
  }

  /// Upload every blob without a blob id, one at a time. The index is
  /// saved after each upload so earlier uploads survive a later failure.
  pub async fn upload_blobs(&self) -> Result<(), BlobsDirError> {
    let mut blobs = self.blobs().await?;

    for i in 0..blobs.len() {
      if blobs[i].blob_id.is_some() {
        continue;
      }

      let blob = &blobs[i];
      self
        .reporter
        .blob_upload_started(&blob.path, blob.size, &blob.sha1.to_string());

      let local = self.local_path(&blob.path)?;
      match self.blobstore.create(&local).await {
        Ok((blob_id, _)) => {
          self.reporter.blob_upload_finished(&blob.path, &blob_id, None);
          blobs[i].blob_id = Some(blob_id);
          self.save(&blobs).await?;
        }
        Err(source) => {
          self
            .reporter
            .blob_upload_finished(&blob.path, "", Some(&source.to_string()));
          return Err(BlobsDirError::Create {
            path: blob.path.clone(),
            source,
          });
        }
      }
    }

    Ok(())
  }

  /// Download every uploaded blob missing from `blobs/`, `parallelism`
  /// at a time. Failures do not stop other downloads; all of them are
  /// returned together.
  pub async fn download_blobs(&self, parallelism: usize) -> Result<(), BlobsDirError> {
    let blobs = self.blobs().await?;
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut join_set = JoinSet::new();

    for blob in blobs.into_iter().filter(|b| b.blob_id.is_some()) {
      let semaphore = semaphore.clone();
      let blobstore = self.blobstore.clone();
      let reporter = self.reporter.clone();
      let dst = self.local_path(&blob.path)?;

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire()
          .await
          .map_err(|e| BlobsDirError::Task(e.to_string()))?;
        download_blob(blobstore.as_ref(), reporter.as_ref(), &blob, &dst).await
      });
    }

    let mut errors = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => errors.push(e),
        Err(e) => errors.push(BlobsDirError::Task(e.to_string())),
      }
    }

    Ok(MultiError::from_results(errors)?)
  }

  /// Download missing blobs, then delete files under `blobs/` that are no
  /// longer tracked. Returns the deleted paths.
  pub async fn sync_blobs(&self, parallelism: usize) -> Result<Vec<PathBuf>, BlobsDirError> {
    self.download_blobs(parallelism).await?;

    let tracked: Vec<PathBuf> = self.blobs().await?.iter().map(|b| self.dir.join(&b.path)).collect();
    let mut removed = Vec::new();

    for entry in walkdir::WalkDir::new(&self.dir).into_iter().filter_map(Result::ok) {
      if entry.file_type().is_dir() || tracked.iter().any(|t| t == entry.path()) {
        continue;
      }
      remove_all(entry.path())
        .await
        .map_err(|e| BlobsDirError::io(entry.path(), e))?;
      debug!(path = ?entry.path(), "removed untracked blob");
      removed.push(entry.path().to_path_buf());
    }

    Ok(removed)
  }

  /// `blobs/<path>`, refusing paths that would escape `blobs/` or name it.
  fn local_path(&self, path: &str) -> Result<PathBuf, BlobsDirError> {
    let rel = Path::new(path);
    let mut components = rel.components().peekable();
    if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
      return Err(BlobsDirError::InvalidPath(path.to_string()));
    }
    Ok(self.dir.join(rel))
  }

  async fn save(&self, blobs: &[Blob]) -> Result<(), BlobsDirError> {
    let entries: BTreeMap<&str, BlobEntry> = blobs
      .iter()
      .map(|b| {
        (b.path.as_str(), BlobEntry {
          size: b.size,
          object_id: b.blob_id.clone(),
          sha: b.sha1.clone(),
        })
      })
      .collect();

    let yaml = serde_yaml::to_string(&entries).map_err(|source| BlobsDirError::Index {
      path: self.index_path.clone(),
      source,
    })?;
    if let Some(parent) = self.index_path.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| BlobsDirError::io(parent, e))?;
    }
    tokio::fs::write(&self.index_path, yaml)
      .await
      .map_err(|e| BlobsDirError::io(&self.index_path, e))
  }
}

async fn download_blob(
  blobstore: &dyn Blobstore,
  reporter: &dyn BlobsDirReporter,
  blob: &Blob,
  dst: &Path,
) -> Result<(), BlobsDirError> {
  if tokio::fs::try_exists(dst).await.unwrap_or(false) {
    return Ok(());
  }

  let blob_id = blob.blob_id.as_deref().unwrap_or_default();
  reporter.blob_download_started(&blob.path, blob.size, blob_id, &blob.sha1.to_string());

  let fetched = match blobstore.get(blob_id, &blob.sha1).await {
    Ok(path) => {
      reporter.blob_download_finished(&blob.path, blob_id, None);
      path
    }
    Err(source) => {
      reporter.blob_download_finished(&blob.path, blob_id, Some(&source.to_string()));
      return Err(BlobsDirError::Get {
        blob_id: blob_id.to_string(),
        path: blob.path.clone(),
        source,
      });
    }
  };

  if let Err(e) = move_file(&fetched, dst).await {
    warn!(path = %blob.path, error = %e, "failed to move downloaded blob");
    return Err(BlobsDirError::io(dst, e));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{MemoryBlobstore, RecordingReporter};
  use std::fs;
  use tempfile::{TempDir, tempdir};

  struct Fixture {
    dir: TempDir,
    store: Arc<MemoryBlobstore>,
    reporter: Arc<RecordingReporter>,
    blobs: FsBlobsDir,
  }

  async fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryBlobstore::new());
    let reporter = Arc::new(RecordingReporter::default());
    let blobs = FsBlobsDir::new(dir.path(), reporter.clone(), store.clone());
    blobs.init().await.unwrap();
    Fixture {
      dir,
      store,
      reporter,
      blobs,
    }
  }

  #[tokio::test]
  async fn init_writes_empty_index() {
    let fx = fixture().await;
    assert_eq!(
      fs::read_to_string(fx.dir.path().join("config/blobs.yml")).unwrap(),
      "--- {}\n"
    );
    assert!(fx.blobs.blobs().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn track_and_untrack_round_trip() {
    let fx = fixture().await;

    let blob = fx.blobs.track_blob("go/go.tgz", &mut &b"golang"[..]).await.unwrap();
    assert_eq!(blob.size, 6);
    assert_eq!(blob.sha1, digest::calculate_bytes(b"golang", DigestAlgorithm::Sha1));
    assert_eq!(fs::read(fx.dir.path().join("blobs/go/go.tgz")).unwrap(), b"golang");

    fx.blobs.track_blob("a.tgz", &mut &b"a"[..]).await.unwrap();
    let paths: Vec<String> = fx.blobs.blobs().await.unwrap().into_iter().map(|b| b.path).collect();
    assert_eq!(paths, vec!["a.tgz", "go/go.tgz"]);

    fx.blobs.untrack_blob("go/go.tgz").await.unwrap();
    assert!(!fx.dir.path().join("blobs/go/go.tgz").exists());
    assert_eq!(fx.blobs.blobs().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn reads_existing_index() {
    let fx = fixture().await;
    fs::write(
      fx.dir.path().join("config/blobs.yml"),
      "---\ngo.tgz:\n  object_id: 36764f38\n  sha: 46eecd290d8803887dec718c691cc243f2175fe0\n  size: 77875767\n",
    )
    .unwrap();

    let blobs = fx.blobs.blobs().await.unwrap();
    assert_eq!(blobs[0].blob_id.as_deref(), Some("36764f38"));
    assert_eq!(blobs[0].size, 77875767);
  }

  #[tokio::test]
  async fn upload_assigns_blob_ids() {
    let fx = fixture().await;
    fx.blobs.track_blob("a.tgz", &mut &b"a"[..]).await.unwrap();
    fx.blobs.track_blob("b.tgz", &mut &b"b"[..]).await.unwrap();

    fx.blobs.upload_blobs().await.unwrap();

    let blobs = fx.blobs.blobs().await.unwrap();
    assert!(blobs.iter().all(|b| b.blob_id.is_some()));
    assert_eq!(blobs[0].sha1, digest::calculate_bytes(b"a", DigestAlgorithm::Sha1));
    assert_eq!(blobs[1].sha1, digest::calculate_bytes(b"b", DigestAlgorithm::Sha1));
    assert!(blobs.iter().all(|b| b.size == 1));
    assert_eq!(fx.store.len(), 2);
    assert_eq!(fx.reporter.events(), vec![
      "started upload a.tgz".to_string(),
      "finished upload a.tgz".to_string(),
      "started upload b.tgz".to_string(),
      "finished upload b.tgz".to_string(),
    ]);

    fx.blobs.upload_blobs().await.unwrap();
    assert_eq!(fx.store.len(), 2);
  }

  #[tokio::test]
  async fn upload_blobs_persists_progress_on_failure() {
    let fx = fixture().await;
    for (path, data) in [("a.tgz", b"a"), ("b.tgz", b"b"), ("c.tgz", b"c")] {
      fx.blobs.track_blob(path, &mut &data[..]).await.unwrap();
    }
    fx.store.fail_create("blobs/b.tgz");

    let err = fx.blobs.upload_blobs().await.unwrap_err();
    assert!(matches!(&err, BlobsDirError::Create { path, .. } if path == "b.tgz"));

    let reopened = FsBlobsDir::new(fx.dir.path(), fx.reporter.clone(), fx.store.clone());
    let uploaded: Vec<(String, bool, u64)> = reopened
      .blobs()
      .await
      .unwrap()
      .into_iter()
      .map(|b| (b.path, b.blob_id.is_some(), b.size))
      .collect();
    assert_eq!(uploaded, vec![
      ("a.tgz".to_string(), true, 1),
      ("b.tgz".to_string(), false, 1),
      ("c.tgz".to_string(), false, 1),
    ]);
    assert_eq!(fx.store.len(), 1);
  }

  #[tokio::test]
  async fn download_blobs_continues_past_one_failure() {
    let fx = fixture().await;
    for (path, data) in [("a.tgz", b"a"), ("b.tgz", b"b"), ("c.tgz", b"c"), ("d.tgz", b"d")] {
      fx.blobs.track_blob(path, &mut &data[..]).await.unwrap();
    }
    fx.blobs.upload_blobs().await.unwrap();
    fs::remove_dir_all(fx.dir.path().join("blobs")).unwrap();

    let blobs = fx.blobs.blobs().await.unwrap();
    let failing = blobs[1].blob_id.clone().unwrap();
    fx.store.fail_get(&failing);

    let err = fx.blobs.download_blobs(1).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains(&format!("getting blob '{failing}' for path 'b.tgz'")));
    assert!(!message.contains("'a.tgz'"));

    let present: Vec<bool> = ["a.tgz", "b.tgz", "c.tgz", "d.tgz"]
      .iter()
      .map(|p| fx.dir.path().join("blobs").join(p).exists())
      .collect();
    assert_eq!(present, vec![true, false, true, true]);
  }

  #[tokio::test]
  async fn rejects_paths_outside_blobs_dir() {
    let fx = fixture().await;
    fx.blobs.track_blob("kept.tgz", &mut &b"k"[..]).await.unwrap();

    for path in ["", "..", "../config/final.yml", "/etc/passwd", "a/../../b"] {
      let err = fx.blobs.untrack_blob(path).await.unwrap_err();
      assert!(matches!(err, BlobsDirError::InvalidPath(_)), "{path:?}");
      let err = fx.blobs.track_blob(path, &mut &b"x"[..]).await.unwrap_err();
      assert!(matches!(err, BlobsDirError::InvalidPath(_)), "{path:?}");
    }

    assert!(fx.dir.path().join("blobs/kept.tgz").exists());
    assert!(fx.dir.path().join("config/blobs.yml").exists());
    assert_eq!(fx.blobs.blobs().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn download_fetches_missing_blobs_and_collects_errors() {
    let fx = fixture().await;
    fx.blobs.track_blob("a.tgz", &mut &b"a"[..]).await.unwrap();
    fx.blobs.track_blob("b.tgz", &mut &b"b"[..]).await.unwrap();
    fx.blobs.track_blob("local-only.tgz", &mut &b"l"[..]).await.unwrap();
    fx.blobs.upload_blobs().await.unwrap();
    fx.blobs.untrack_blob("local-only.tgz").await.unwrap();

    fs::remove_dir_all(fx.dir.path().join("blobs")).unwrap();
    fx.blobs.download_blobs(2).await.unwrap();
    assert_eq!(fs::read(fx.dir.path().join("blobs/a.tgz")).unwrap(), b"a");
    assert_eq!(fs::read(fx.dir.path().join("blobs/b.tgz")).unwrap(), b"b");

    fs::remove_dir_all(fx.dir.path().join("blobs")).unwrap();
    for blob in fx.blobs.blobs().await.unwrap() {
      fx.store.fail_get(blob.blob_id.as_deref().unwrap());
    }
    let err = fx.blobs.download_blobs(4).await.unwrap_err();
    match err {
      BlobsDirError::Multiple(multi) => {
        assert_eq!(multi.len(), 2);
        assert!(multi.to_string().contains("for path 'a.tgz'"));
      }
      other => panic!("expected Multiple, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn sync_removes_untracked_files() {
    let fx = fixture().await;
    fx.blobs.track_blob("kept.tgz", &mut &b"k"[..]).await.unwrap();
    fs::create_dir_all(fx.dir.path().join("blobs/old")).unwrap();
    fs::write(fx.dir.path().join("blobs/old/stale.tgz"), "stale").unwrap();

    let removed = fx.blobs.sync_blobs(1).await.unwrap();

    assert_eq!(removed, vec![fx.dir.path().join("blobs/old/stale.tgz")]);
    assert!(fx.dir.path().join("blobs/kept.tgz").exists());
  }
}
