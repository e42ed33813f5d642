use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::{File, ResourceError, Sources};
use crate::cmd::{Cmd, CmdRunner};
use crate::compress::Compressor;
use crate::util::digest::{self, DigestAlgorithm};

/// Location and digest of a built or downloaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
  pub path: PathBuf,
  pub digest: digest::Digest,
}

/// Turns resource sources into `.tgz` archives.
///
/// Files are staged into a scratch directory keeping symlinks and
/// permissions, prep scripts (`pre_packaging`) run inside it with
/// `BUILD_DIR` and `RELEASE_DIR` set and are removed before compressing.
pub struct Archiver {
  compressor: Arc<dyn Compressor>,
  runner: Arc<dyn CmdRunner>,
  release_dir: PathBuf,
}

impl Archiver {
  pub fn new(compressor: Arc<dyn Compressor>, runner: Arc<dyn CmdRunner>, release_dir: impl Into<PathBuf>) -> Self {
    Self {
      compressor,
      runner,
      release_dir: release_dir.into(),
    }
  }

  pub async fn build(&self, name: &str, sources: &Sources) -> Result<ArchiveRef, ResourceError> {
    let staging = tempfile::Builder::new()
      .prefix("boshrel-resource-")
      .tempdir()
      .map_err(|source| ResourceError::Io {
        path: std::env::temp_dir(),
        source,
      })?;

    for file in sources.files.iter().chain(&sources.prep_files) {
      stage_file(file, staging.path())?;
    }

    for prep in &sources.prep_files {
      let script = staging.path().join(prep.archive_name());
      info!(resource = name, script = %prep.archive_name(), "running prep script");

      let cmd = Cmd::new("bash")
        .arg("-x")
        .arg(script.to_string_lossy())
        .env("BUILD_DIR", staging.path().to_string_lossy())
        .env("RELEASE_DIR", self.release_dir.to_string_lossy())
        .working_dir(staging.path());

      self
        .runner
        .run_complex_command(&cmd)
        .await
        .map_err(|source| ResourceError::PrepScript {
          name: name.to_string(),
          source,
        })?;

      fs::remove_file(&script).map_err(|source| ResourceError::Io { path: script, source })?;
    }

    let path = self.compressor.compress_files_in_dir(staging.path())?;
    let digest = digest::calculate_file(&path, DigestAlgorithm::Sha1)?;

    debug!(resource = name, archive = ?path, sha1 = %digest, "built archive");
    Ok(ArchiveRef { path, digest })
  }

  /// Remove an archive returned by `build` once it has been indexed.
  pub fn clean_up(&self, path: &Path) -> Result<(), ResourceError> {
    Ok(self.compressor.clean_up(path)?)
  }
}

fn stage_file(file: &File, staging: &Path) -> Result<(), ResourceError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source: std::io::Error| ResourceError::Io { path, source }
  };

  let dst = staging.join(file.archive_name());
  if let Some(parent) = dst.parent() {
    create_parents(file, staging, parent)?;
  }

  let meta = fs::symlink_metadata(&file.path).map_err(io_err(&file.path))?;

  if meta.file_type().is_symlink() {
    let target = fs::read_link(&file.path).map_err(io_err(&file.path))?;
    symlink(&target, &dst).map_err(io_err(&dst))?;
  } else if meta.is_dir() {
    fs::create_dir_all(&dst).map_err(io_err(&dst))?;
    fs::set_permissions(&dst, meta.permissions()).map_err(io_err(&dst))?;
  } else {
    fs::copy(&file.path, &dst).map_err(io_err(&file.path))?;
  }

  Ok(())
}

/// Create missing parent directories, copying permissions from the
/// matching source directories when they exist.
fn create_parents(file: &File, staging: &Path, parent: &Path) -> Result<(), ResourceError> {
  if parent.exists() {
    return Ok(());
  }

  fs::create_dir_all(parent).map_err(|source| ResourceError::Io {
    path: parent.to_path_buf(),
    source,
  })?;

  let Ok(rel) = parent.strip_prefix(staging) else {
    return Ok(());
  };

  let mut src = file.dir_path.clone();
  let mut dst = staging.to_path_buf();
  for component in rel.components() {
    src.push(component);
    dst.push(component);
    if let Ok(meta) = fs::metadata(&src) {
      fs::set_permissions(&dst, meta.permissions()).map_err(|source| ResourceError::Io {
        path: dst.clone(),
        source,
      })?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use crate::cmd::ProcessCmdRunner;
  use crate::compress::TarballCompressor;
  use std::os::unix::fs::PermissionsExt;
  use tempfile::tempdir;

  fn sources(root: &Path) -> Sources {
    Sources {
      files: vec![
        File::new(root.join("file1"), root),
        File::new(root.join("dir/file2"), root),
        File::new(root.join("dir/file3"), root),
        File::new(root.join("dir/symlink-file"), root),
        File::new(root.join("dir/symlink-missing"), root),
      ],
      prep_files: vec![
        File::new(root.join("run-release-dir"), root),
        File::new(root.join("run-file3"), root),
      ],
      chunks: vec!["chunk".to_string()],
    }
  }

  #[tokio::test]
  async fn builds_archive_with_links_modes_and_prep_scripts() {
    let src = tempdir().unwrap();
    let root = src.path();
    fs::write(root.join("file1"), "file1").unwrap();
    fs::create_dir(root.join("dir")).unwrap();
    fs::set_permissions(root.join("dir"), fs::Permissions::from_mode(0o744)).unwrap();
    fs::write(root.join("dir/file2"), "file2").unwrap();
    fs::set_permissions(root.join("dir/file2"), fs::Permissions::from_mode(0o745)).unwrap();
    fs::write(root.join("dir/file3"), "file3").unwrap();
    std::os::unix::fs::symlink("../file1", root.join("dir/symlink-file")).unwrap();
    std::os::unix::fs::symlink("nonexistent", root.join("dir/symlink-missing")).unwrap();
    fs::write(root.join("run-release-dir"), "echo -n $RELEASE_DIR > release-dir").unwrap();
    fs::write(root.join("run-file3"), "rm dir/file3").unwrap();

    let compressor = Arc::new(TarballCompressor::new());
    let archiver = Archiver::new(compressor.clone(), Arc::new(ProcessCmdRunner::new()), "/tmp/release");
    let archive = archiver.build("pkg", &sources(root)).await.unwrap();

    archive.digest.verify_file(&archive.path).unwrap();

    let out = tempdir().unwrap();
    compressor
      .decompress_file_to_dir(&archive.path, out.path())
      .unwrap();
    let out = out.path();

    assert_eq!(fs::read_to_string(out.join("file1")).unwrap(), "file1");
    assert_eq!(fs::read_to_string(out.join("dir/file2")).unwrap(), "file2");
    assert_eq!(fs::read_link(out.join("dir/symlink-file")).unwrap(), PathBuf::from("../file1"));
    assert_eq!(fs::read_link(out.join("dir/symlink-missing")).unwrap(), PathBuf::from("nonexistent"));
    assert_eq!(fs::metadata(out.join("dir")).unwrap().permissions().mode() & 0o777, 0o744);
    assert_eq!(fs::metadata(out.join("dir/file2")).unwrap().permissions().mode() & 0o777, 0o745);

    assert_eq!(fs::read_to_string(out.join("release-dir")).unwrap(), "/tmp/release");
    assert!(!out.join("dir/file3").exists());
    assert!(!out.join("run-release-dir").exists());
    assert!(!out.join("run-file3").exists());

    compressor.clean_up(&archive.path).unwrap();
  }
}
