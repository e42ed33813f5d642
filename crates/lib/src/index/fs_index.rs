use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ArchiveIndex, FsIndexBlobs, IndexError};
use crate::consts::INDEX_FORMAT_VERSION;
use crate::progress::IndexReporter;
use crate::resource::ArchiveRef;
use crate::util::digest::Digest;

const INDEX_FILENAME: &str = "index.yml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexFile {
  #[serde(default)]
  builds: BTreeMap<String, IndexEntry>,
  #[serde(rename = "format-version", default = "format_version")]
  format_version: String,
}

fn format_version() -> String {
  INDEX_FORMAT_VERSION.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
  #[serde(default)]
  version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  blobstore_id: Option<String>,
  #[serde(default)]
  sha1: String,
}

/// `index.yml` backed [`ArchiveIndex`] for one resource kind.
///
/// With `name_prefixed` each resource gets `<dir>/<name>/index.yml`,
/// otherwise all entries share `<dir>/index.yml`. Final indices require a
/// blobstore id on every entry, dev indices forbid one.
pub struct FsIndex {
  kind: String,
  dir: PathBuf,
  name_prefixed: bool,
  allow_blob_ids: bool,
  reporter: Arc<dyn IndexReporter>,
  blobs: Arc<FsIndexBlobs>,
}

impl FsIndex {
  pub fn new(
    kind: impl Into<String>,
    dir: impl Into<PathBuf>,
    name_prefixed: bool,
    allow_blob_ids: bool,
    reporter: Arc<dyn IndexReporter>,
    blobs: Arc<FsIndexBlobs>,
  ) -> Self {
    Self {
      kind: kind.into(),
      dir: dir.into(),
      name_prefixed,
      allow_blob_ids,
      reporter,
      blobs,
    }
  }

  fn index_path(&self, name: &str) -> PathBuf {
    if self.name_prefixed {
      self.dir.join(name).join(INDEX_FILENAME)
    } else {
      self.dir.join(INDEX_FILENAME)
    }
  }

  async fn read(&self, path: &Path) -> Result<IndexFile, IndexError> {
    let contents = match tokio::fs::read_to_string(path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexFile::default()),
      Err(source) => {
        return Err(IndexError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    if contents.trim().is_empty() {
      return Ok(IndexFile::default());
    }

    serde_yaml::from_str(&contents).map_err(|source| IndexError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  async fn write(&self, path: &Path, index: &IndexFile) -> Result<(), IndexError> {
    let yaml = serde_yaml::to_string(index).map_err(IndexError::Serialize)?;
    let write_err = |source| IndexError::Write {
      path: path.to_path_buf(),
      source,
    };

    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, yaml).await.map_err(write_err)
  }

  async fn add_entry(&self, name: &str, fingerprint: &str, path: &Path, digest: &Digest) -> Result<ArchiveRef, IndexError> {
    let desc = format!("{name}/{fingerprint}");
    let index_path = self.index_path(name);
    let mut index = self.read(&index_path).await?;

    if index.builds.contains_key(fingerprint) {
      return Err(IndexError::Duplicate {
        desc,
        sha1: digest.to_string(),
      });
    }

    let (blob_id, cached) = self.blobs.add(&self.kind, &desc, path, digest).await?;

    match (self.allow_blob_ids, &blob_id) {
      (true, None) => {
        return Err(IndexError::Inconsistent {
          desc,
          problem: "must include a blob id",
        });
      }
      (false, Some(_)) => {
        return Err(IndexError::Inconsistent {
          desc,
          problem: "must not include a blob id",
        });
      }
      _ => {}
    }

    index.builds.insert(
      fingerprint.to_string(),
      IndexEntry {
        version: fingerprint.to_string(),
        blobstore_id: blob_id,
        sha1: digest.to_string(),
      },
    );
    index.format_version = format_version();
    self.write(&index_path, &index).await?;

    debug!(kind = %self.kind, entry = %desc, "added index entry");
    Ok(ArchiveRef {
      path: cached,
      digest: digest.clone(),
    })
  }
}

#[async_trait]
impl ArchiveIndex for FsIndex {
  async fn find(&self, name: &str, fingerprint: &str) -> Result<Option<ArchiveRef>, IndexError> {
    if name.is_empty() {
      return Err(IndexError::Empty("name"));
    }
    if fingerprint.is_empty() {
      return Err(IndexError::Empty("fingerprint"));
    }

    let index = self.read(&self.index_path(name)).await?;
    let Some(entry) = index.builds.get(fingerprint) else {
      return Ok(None);
    };

    let digest: Digest = entry.sha1.parse()?;
    let desc = format!("{name}/{fingerprint}");
    let path = self.blobs.get(&self.kind, &desc, entry.blobstore_id.as_deref(), &digest).await?;

    Ok(Some(ArchiveRef { path, digest }))
  }

  async fn add(&self, name: &str, fingerprint: &str, path: &Path, digest: &Digest) -> Result<ArchiveRef, IndexError> {
    if name.is_empty() {
      return Err(IndexError::Empty("name"));
    }
    if fingerprint.is_empty() {
      return Err(IndexError::Empty("fingerprint"));
    }
    if path.as_os_str().is_empty() {
      return Err(IndexError::Empty("archive path"));
    }

    let desc = format!("{name}/{fingerprint}");
    self.reporter.index_entry_started_adding(&self.kind, &desc);

    let result = self.add_entry(name, fingerprint, path, digest).await;

    let err = result.as_ref().err().map(|e| e.to_string());
    self.reporter.index_entry_finished_adding(&self.kind, &desc, err.as_deref());
    result
  }
}
