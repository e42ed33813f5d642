mod blobs;
mod compile;
mod create;
mod finalize;
mod init;
mod inspect;

pub use blobs::{BlobCommand, cmd_blob};
pub use compile::{CompileArgs, cmd_compile};
pub use create::{CreateReleaseArgs, cmd_create_release};
pub use finalize::{FinalizeReleaseArgs, cmd_finalize_release};
pub use init::{cmd_init_release, cmd_reset_release};
pub use inspect::cmd_inspect_release;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use boshrel_lib::release::Release;
use boshrel_lib::releasedir::{FsReleaseDir, ReleaseDirConfig};

use crate::output::{OutputFormat, print_json, print_stat, print_success};

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

async fn open_release_dir(dir: &Path) -> FsReleaseDir {
  FsReleaseDir::open(dir, ReleaseDirConfig::default()).await
}

/// What create-release and finalize-release report.
#[derive(Debug, Serialize)]
struct ReleaseSummary {
  name: String,
  version: String,
  commit_hash: String,
  uncommitted_changes: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  archive: Option<PathBuf>,
}

impl ReleaseSummary {
  fn new(release: &Release, archive: Option<PathBuf>) -> Self {
    Self {
      name: release.name().to_string(),
      version: release.version().to_string(),
      commit_hash: release.commit_hash().to_string(),
      uncommitted_changes: release.uncommitted_changes(),
      archive,
    }
  }

  fn print(&self, headline: &str, output: OutputFormat) -> Result<()> {
    if output.is_json() {
      return print_json(self);
    }

    print_success(headline);
    print_stat("Name", &self.name);
    print_stat("Version", &self.version);
    let commit = if self.uncommitted_changes {
      format!("{}+", self.commit_hash)
    } else {
      self.commit_hash.clone()
    };
    print_stat("Commit Hash", &commit);
    if let Some(archive) = &self.archive {
      print_stat("Archive", &archive.display().to_string());
    }
    Ok(())
  }
}
