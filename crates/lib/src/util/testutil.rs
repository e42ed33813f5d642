//! In-memory fakes shared by unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::blobstore::{Blobstore, BlobstoreError};
use crate::cmd::{Cmd, CmdError, CmdOutput, CmdRunner};
use crate::progress::{BlobsDirReporter, IndexReporter, Stage};
use crate::util::digest::{self, Digest, DigestAlgorithm};

/// Records every command and optionally fails it.
#[derive(Default)]
pub struct RecordingCmdRunner {
  commands: Mutex<Vec<Cmd>>,
  fail_with: Mutex<Option<i32>>,
}

impl RecordingCmdRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent command exit with `code`.
  pub fn fail_with(&self, code: i32) {
    *self.fail_with.lock().unwrap() = Some(code);
  }

  pub fn commands(&self) -> Vec<Cmd> {
    self.commands.lock().unwrap().clone()
  }

  pub fn count(&self) -> usize {
    self.commands.lock().unwrap().len()
  }
}

#[async_trait]
impl CmdRunner for RecordingCmdRunner {
  async fn run_complex_command(&self, cmd: &Cmd) -> Result<CmdOutput, CmdError> {
    self.commands.lock().unwrap().push(cmd.clone());
    if let Some(code) = *self.fail_with.lock().unwrap() {
      return Err(CmdError::Failed {
        cmd: cmd.display(),
        code,
        stdout: String::new(),
        stderr: "fake failure".to_string(),
      });
    }
    Ok(CmdOutput::default())
  }
}

/// Keeps blobs in memory and hands out copies in a temp dir.
pub struct MemoryBlobstore {
  blobs: Mutex<BTreeMap<String, Vec<u8>>>,
  next_id: AtomicUsize,
  scratch: tempfile::TempDir,
  failing_ids: Mutex<Vec<String>>,
  failing_paths: Mutex<Vec<PathBuf>>,
}

impl Default for MemoryBlobstore {
  fn default() -> Self {
    Self {
      blobs: Mutex::default(),
      next_id: AtomicUsize::new(1),
      scratch: tempfile::tempdir().unwrap(),
      failing_ids: Mutex::default(),
      failing_paths: Mutex::default(),
    }
  }
}

impl MemoryBlobstore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, blob_id: &str, data: &[u8]) -> Digest {
    self.blobs.lock().unwrap().insert(blob_id.to_string(), data.to_vec());
    digest::calculate_bytes(data, DigestAlgorithm::Sha1)
  }

  pub fn contents(&self, blob_id: &str) -> Option<Vec<u8>> {
    self.blobs.lock().unwrap().get(blob_id).cloned()
  }

  pub fn len(&self) -> usize {
    self.blobs.lock().unwrap().len()
  }

  /// Make `get` fail for this id.
  pub fn fail_get(&self, blob_id: &str) {
    self.failing_ids.lock().unwrap().push(blob_id.to_string());
  }

  /// Make `create` fail for any local file whose path ends with `path`.
  pub fn fail_create(&self, path: impl Into<PathBuf>) {
    self.failing_paths.lock().unwrap().push(path.into());
  }
}

#[async_trait]
impl Blobstore for MemoryBlobstore {
  async fn get(&self, blob_id: &str, _digest: &Digest) -> Result<PathBuf, BlobstoreError> {
    if self.failing_ids.lock().unwrap().iter().any(|id| id == blob_id) {
      return Err(BlobstoreError::io(Path::new(blob_id), std::io::Error::other("fake get failure")));
    }
    let data = self
      .contents(blob_id)
      .ok_or_else(|| BlobstoreError::NotFound(blob_id.to_string()))?;
    let n = self.next_id.fetch_add(1, Ordering::SeqCst);
    let path = self.scratch.path().join(format!("get-{n}"));
    std::fs::write(&path, data).map_err(|e| BlobstoreError::io(&path, e))?;
    Ok(path)
  }

  async fn create(&self, path: &Path) -> Result<(String, Digest), BlobstoreError> {
    if self.failing_paths.lock().unwrap().iter().any(|p| path.ends_with(p)) {
      return Err(BlobstoreError::io(path, std::io::Error::other("fake create failure")));
    }
    let data = std::fs::read(path).map_err(|e| BlobstoreError::io(path, e))?;
    let blob_id = format!("blob-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
    let digest = self.insert(&blob_id, &data);
    Ok((blob_id, digest))
  }

  async fn clean_up(&self, path: &Path) -> Result<(), BlobstoreError> {
    let _ = std::fs::remove_file(path);
    Ok(())
  }

  async fn delete(&self, blob_id: &str) -> Result<(), BlobstoreError> {
    self
      .blobs
      .lock()
      .unwrap()
      .remove(blob_id)
      .map(|_| ())
      .ok_or_else(|| BlobstoreError::NotFound(blob_id.to_string()))
  }

  async fn validate(&self) -> Result<(), BlobstoreError> {
    Ok(())
  }
}

/// Collects progress events as plain strings.
#[derive(Default)]
pub struct RecordingReporter {
  events: Mutex<Vec<String>>,
}

impl RecordingReporter {
  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }

  fn push(&self, event: String) {
    self.events.lock().unwrap().push(event);
  }

  fn outcome(&self, what: &str, subject: &str, error: Option<&str>) {
    match error {
      None => self.push(format!("finished {what}{subject}")),
      Some(e) => self.push(format!("failed {what}{subject}: {e}")),
    }
  }
}

impl Stage for RecordingReporter {
  fn step_started(&self, name: &str) {
    self.push(format!("started {name}"));
  }

  fn step_finished(&self, name: &str, error: Option<&str>) {
    self.outcome("", name, error);
  }
}

impl BlobsDirReporter for RecordingReporter {
  fn blob_download_started(&self, path: &str, _size: u64, _blob_id: &str, _sha1: &str) {
    self.push(format!("started download {path}"));
  }

  fn blob_download_finished(&self, path: &str, _blob_id: &str, error: Option<&str>) {
    self.outcome("download ", path, error);
  }

  fn blob_upload_started(&self, path: &str, _size: u64, _sha1: &str) {
    self.push(format!("started upload {path}"));
  }

  fn blob_upload_finished(&self, path: &str, _blob_id: &str, error: Option<&str>) {
    self.outcome("upload ", path, error);
  }
}

impl IndexReporter for RecordingReporter {
  fn index_entry_started_adding(&self, kind: &str, desc: &str) {
    self.push(format!("started adding {kind} {desc}"));
  }

  fn index_entry_finished_adding(&self, kind: &str, desc: &str, error: Option<&str>) {
    self.outcome(&format!("adding {kind} "), desc, error);
  }

  fn index_entry_download_started(&self, kind: &str, desc: &str) {
    self.push(format!("started downloading {kind} {desc}"));
  }

  fn index_entry_download_finished(&self, kind: &str, desc: &str, error: Option<&str>) {
    self.outcome(&format!("downloading {kind} "), desc, error);
  }

  fn index_entry_upload_started(&self, kind: &str, desc: &str) {
    self.push(format!("started uploading {kind} {desc}"));
  }

  fn index_entry_upload_finished(&self, kind: &str, desc: &str, error: Option<&str>) {
    self.outcome(&format!("uploading {kind} "), desc, error);
  }
}
