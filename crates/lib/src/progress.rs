//! Progress reporting collaborators.
//!
//! Long-running operations report named steps to a [`Stage`], blob
//! transfers to a [`BlobsDirReporter`] and index writes to an
//! [`IndexReporter`]. [`TracingReporter`] implements all three by logging.

use std::fmt::Display;
use std::future::Future;

use tracing::{error, info};

pub trait Stage: Send + Sync {
  fn step_started(&self, name: &str);

  /// `error` is `None` when the step succeeded.
  fn step_finished(&self, name: &str, error: Option<&str>);
}

/// Run `fut` as a named step, reporting its start and outcome.
pub async fn perform<T, E, F>(stage: &dyn Stage, name: &str, fut: F) -> Result<T, E>
where
  E: Display,
  F: Future<Output = Result<T, E>>,
{
  stage.step_started(name);
  let result = fut.await;
  match &result {
    Ok(_) => stage.step_finished(name, None),
    Err(e) => stage.step_finished(name, Some(&e.to_string())),
  }
  result
}

pub trait BlobsDirReporter: Send + Sync {
  fn blob_download_started(&self, path: &str, size: u64, blob_id: &str, sha1: &str);
  fn blob_download_finished(&self, path: &str, blob_id: &str, error: Option<&str>);

  fn blob_upload_started(&self, path: &str, size: u64, sha1: &str);
  fn blob_upload_finished(&self, path: &str, blob_id: &str, error: Option<&str>);
}

pub trait IndexReporter: Send + Sync {
  fn index_entry_started_adding(&self, kind: &str, desc: &str);
  fn index_entry_finished_adding(&self, kind: &str, desc: &str, error: Option<&str>);

  fn index_entry_download_started(&self, kind: &str, desc: &str);
  fn index_entry_download_finished(&self, kind: &str, desc: &str, error: Option<&str>);

  fn index_entry_upload_started(&self, kind: &str, desc: &str);
  fn index_entry_upload_finished(&self, kind: &str, desc: &str, error: Option<&str>);
}

/// Writes every progress event to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

fn finished(what: &str, subject: &str, err: Option<&str>) {
  match err {
    None => info!(subject, "{what} finished"),
    Some(e) => error!(subject, error = e, "{what} failed"),
  }
}

impl Stage for TracingReporter {
  fn step_started(&self, name: &str) {
    info!(step = name, "started");
  }

  fn step_finished(&self, name: &str, error: Option<&str>) {
    finished("step", name, error);
  }
}

impl BlobsDirReporter for TracingReporter {
  fn blob_download_started(&self, path: &str, size: u64, blob_id: &str, sha1: &str) {
    info!(path, size, blob_id, sha1, "blob download started");
  }

  fn blob_download_finished(&self, path: &str, _blob_id: &str, error: Option<&str>) {
    finished("blob download", path, error);
  }

  fn blob_upload_started(&self, path: &str, size: u64, sha1: &str) {
    info!(path, size, sha1, "blob upload started");
  }

  fn blob_upload_finished(&self, path: &str, _blob_id: &str, error: Option<&str>) {
    finished("blob upload", path, error);
  }
}

impl IndexReporter for TracingReporter {
  fn index_entry_started_adding(&self, kind: &str, desc: &str) {
    info!(kind, entry = desc, "adding index entry");
  }

  fn index_entry_finished_adding(&self, kind: &str, desc: &str, error: Option<&str>) {
    finished(&format!("adding {kind}"), desc, error);
  }

  fn index_entry_download_started(&self, kind: &str, desc: &str) {
    info!(kind, entry = desc, "downloading index entry");
  }

  fn index_entry_download_finished(&self, kind: &str, desc: &str, error: Option<&str>) {
    finished(&format!("downloading {kind}"), desc, error);
  }

  fn index_entry_upload_started(&self, kind: &str, desc: &str) {
    info!(kind, entry = desc, "uploading index entry");
  }

  fn index_entry_upload_finished(&self, kind: &str, desc: &str, error: Option<&str>) {
    finished(&format!("uploading {kind}"), desc, error);
  }
}
