use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::digest::Digest;

/// Where a compiled package's archive lives in the blobstore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPackageRecord {
  pub blob_id: String,
  pub blob_sha1: Digest,
}

/// A compiled package ready to be installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPackageRef {
  pub name: String,
  /// Package fingerprint.
  pub version: String,
  pub blob_id: String,
  pub sha1: Digest,
}

/// Configuration for compiling packages and transferring blobs.
#[derive(Debug, Clone)]
pub struct CompileConfig {
  /// Shared directory dependencies are installed into while a package
  /// compiles. Removed after every compilation.
  pub packages_dir: PathBuf,

  /// Shell that runs `packaging`.
  pub shell: String,

  /// Maximum number of blob downloads running at once.
  pub parallelism: usize,
}

impl Default for CompileConfig {
  fn default() -> Self {
    Self {
      packages_dir: std::env::temp_dir().join("boshrel-packages"),
      shell: "bash".to_string(),
      parallelism: num_cpus(),
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
