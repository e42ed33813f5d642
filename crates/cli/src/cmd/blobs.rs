//! Blob commands: tracking, listing, uploading and syncing `blobs/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use boshrel_lib::releasedir::Blob;

use super::{open_release_dir, runtime};
use crate::output::{OutputFormat, format_size, print_blob, print_json, print_note, print_removed, print_success};

#[derive(Subcommand, Debug)]
pub enum BlobCommand {
  /// Copy a file into blobs/ and track it
  AddBlob {
    /// File to add
    path: PathBuf,

    /// Path under blobs/ (e.g. ruby/ruby-3.2.tgz)
    blobs_path: String,
  },

  /// Stop tracking a blob and delete its local copy
  RemoveBlob {
    /// Path under blobs/
    blobs_path: String,
  },

  /// List tracked blobs
  Blobs {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Upload blobs that have not been uploaded yet
  UploadBlobs,

  /// Download missing blobs and delete untracked local files
  SyncBlobs,
}

pub fn cmd_blob(dir: &Path, command: BlobCommand) -> Result<()> {
  match command {
    BlobCommand::AddBlob { path, blobs_path } => cmd_add_blob(dir, &path, &blobs_path),
    BlobCommand::RemoveBlob { blobs_path } => cmd_remove_blob(dir, &blobs_path),
    BlobCommand::Blobs { output } => cmd_blobs(dir, output),
    BlobCommand::UploadBlobs => cmd_upload_blobs(dir),
    BlobCommand::SyncBlobs => cmd_sync_blobs(dir),
  }
}

fn cmd_add_blob(dir: &Path, src: &Path, blobs_path: &str) -> Result<()> {
  let rt = runtime()?;
  let blob = rt.block_on(async {
    let mut file = tokio::fs::File::open(src)
      .await
      .with_context(|| format!("Failed to open {}", src.display()))?;
    let release_dir = open_release_dir(dir).await;
    let blob = release_dir
      .blobs()
      .track_blob(blobs_path, &mut file)
      .await
      .context("Failed to track blob")?;
    anyhow::Ok(blob)
  })?;

  print_success(&format!("Added blob '{}' ({})", blob.path, format_size(blob.size)));
  Ok(())
}

fn cmd_remove_blob(dir: &Path, blobs_path: &str) -> Result<()> {
  let rt = runtime()?;
  rt.block_on(async { open_release_dir(dir).await.blobs().untrack_blob(blobs_path).await })
    .context("Failed to remove blob")?;

  print_success(&format!("Removed blob '{blobs_path}'"));
  Ok(())
}

#[derive(Debug, Serialize)]
struct BlobListing {
  blobs: Vec<Blob>,
  total_size: u64,
}

fn cmd_blobs(dir: &Path, output: OutputFormat) -> Result<()> {
  let rt = runtime()?;
  let blobs = rt
    .block_on(async { open_release_dir(dir).await.blobs().blobs().await })
    .context("Failed to read blobs")?;

  let listing = BlobListing {
    total_size: blobs.iter().map(|b| b.size).sum(),
    blobs,
  };

  if output.is_json() {
    return print_json(&listing);
  }

  if listing.blobs.is_empty() {
    print_note("No blobs tracked");
    return Ok(());
  }

  for blob in &listing.blobs {
    print_blob(&blob.path, blob.size, &blob.sha1.to_string(), blob.blob_id.as_deref());
  }
  println!();
  print_note(&format!(
    "{} blob(s), {}",
    listing.blobs.len(),
    format_size(listing.total_size)
  ));
  Ok(())
}

fn cmd_upload_blobs(dir: &Path) -> Result<()> {
  let rt = runtime()?;
  let uploaded = rt
    .block_on(async {
      let release_dir = open_release_dir(dir).await;
      let before = pending(&release_dir.blobs().blobs().await?);
      release_dir.blobs().upload_blobs().await?;
      Ok::<_, boshrel_lib::releasedir::BlobsDirError>(before)
    })
    .context("Failed to upload blobs")?;

  print_success(&format!("Uploaded {uploaded} blob(s)"));
  Ok(())
}

fn cmd_sync_blobs(dir: &Path) -> Result<()> {
  let rt = runtime()?;
  let removed = rt
    .block_on(async {
      let release_dir = open_release_dir(dir).await;
      release_dir.blobs().sync_blobs(release_dir.parallelism()).await
    })
    .context("Failed to sync blobs")?;

  for path in &removed {
    print_removed(&path.display().to_string());
  }
  print_success("Blobs are in sync");
  Ok(())
}

fn pending(blobs: &[Blob]) -> usize {
  blobs.iter().filter(|b| b.blob_id.is_none()).count()
}
