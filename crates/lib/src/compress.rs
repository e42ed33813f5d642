//! Gzipped tarball creation and extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CompressError {
  #[error("failed to compress {path}: {source}")]
  Compress {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to decompress {path}: {source}")]
  Decompress {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to clean up {path}: {source}")]
  CleanUp {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

pub trait Compressor: Send + Sync {
  /// Pack the contents of `dir` (not the directory itself) into a new
  /// temporary tarball and return its path.
  fn compress_files_in_dir(&self, dir: &Path) -> Result<PathBuf, CompressError>;

  fn decompress_file_to_dir(&self, archive: &Path, dir: &Path) -> Result<(), CompressError>;

  /// Remove a tarball previously returned by `compress_files_in_dir`.
  fn clean_up(&self, tarball: &Path) -> Result<(), CompressError>;
}

/// `.tgz` compressor built on `tar` and `flate2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballCompressor;

impl TarballCompressor {
  pub fn new() -> Self {
    Self
  }
}

fn create_temp() -> io::Result<(File, PathBuf)> {
  let named = tempfile::Builder::new()
    .prefix("boshrel-tarball-")
    .suffix(".tgz")
    .tempfile()?;
  named.keep().map_err(|e| e.error)
}

impl Compressor for TarballCompressor {
  fn compress_files_in_dir(&self, dir: &Path) -> Result<PathBuf, CompressError> {
    let err = |source| CompressError::Compress {
      path: dir.to_path_buf(),
      source,
    };

    let (file, tarball) = create_temp().map_err(err)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let result = builder
      .append_dir_all(".", dir)
      .and_then(|_| builder.into_inner())
      .and_then(|encoder| encoder.finish())
      .and_then(|mut writer| io::Write::flush(&mut writer));

    if let Err(e) = result {
      let _ = fs::remove_file(&tarball);
      return Err(err(e));
    }

    debug!(dir = ?dir, tarball = ?tarball, "compressed directory");
    Ok(tarball)
  }

  fn decompress_file_to_dir(&self, archive: &Path, dir: &Path) -> Result<(), CompressError> {
    let err = |source| CompressError::Decompress {
      path: archive.to_path_buf(),
      source,
    };

    fs::create_dir_all(dir).map_err(err)?;
    let file = File::open(archive).map_err(err)?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);

    tar.unpack(dir).map_err(err)?;

    debug!(archive = ?archive, dir = ?dir, "decompressed archive");
    Ok(())
  }

  fn clean_up(&self, tarball: &Path) -> Result<(), CompressError> {
    match fs::remove_file(tarball) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(CompressError::CleanUp {
        path: tarball.to_path_buf(),
        source,
      }),
    }
  }
}
