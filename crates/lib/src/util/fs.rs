//! Filesystem helpers shared by the blob and index layers.

use std::io;
use std::path::Path;

use tokio::fs;
use tracing::debug;

/// Move `src` to `dst`, creating parent directories of `dst`.
///
/// Falls back to copy + delete when a rename is not possible (for example
/// when the temp directory lives on a different device).
pub async fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent).await?;
  }

  match fs::rename(src, dst).await {
    Ok(()) => Ok(()),
    Err(e) => {
      debug!(src = ?src, dst = ?dst, error = %e, "rename failed, copying instead");
      fs::copy(src, dst).await?;
      fs::remove_file(src).await
    }
  }
}

/// Copy `src` to `dst`, creating parent directories of `dst`.
pub async fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent).await?;
  }
  fs::copy(src, dst).await?;
  Ok(())
}

/// Remove a file or directory tree, treating a missing path as success.
pub async fn remove_all(path: &Path) -> io::Result<()> {
  let meta = match fs::symlink_metadata(path).await {
    Ok(meta) => meta,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };

  if meta.is_dir() {
    fs::remove_dir_all(path).await
  } else {
    fs::remove_file(path).await
  }
}
