//! Deterministic fingerprints of file sets.
//!
//! The fingerprint string is the SHA1 of:
//!
//! ```text
//! v2 <name><sha1><mode> ... <sorted chunks joined by ','>
//! ```
//!
//! with files ordered by relative path. Directories contribute their name
//! and mode, symlinks their name, the SHA1 of the link target and the word
//! `symlink`. Nothing depends on absolute paths, timestamps or owners.

use std::fs;

use super::{File, ResourceError};
use crate::consts::FINGERPRINT_VERSION;
use crate::util::digest::{self, DigestAlgorithm};

const DIR_MODE: &str = "40755";
const EXEC_FILE_MODE: &str = "100755";
const FILE_MODE: &str = "100644";

pub fn calculate(files: &[File], chunks: &[String]) -> Result<String, ResourceError> {
  let mut sorted: Vec<&File> = files.iter().collect();
  sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

  let mut input = String::from(FINGERPRINT_VERSION);
  for file in sorted {
    input.push_str(&file_segment(file)?);
  }

  let mut chunks = chunks.to_vec();
  chunks.sort();
  input.push_str(&chunks.join(","));

  Ok(digest::calculate_string(&input))
}

fn file_segment(file: &File) -> Result<String, ResourceError> {
  let meta = fs::symlink_metadata(&file.path).map_err(|source| ResourceError::Stat {
    path: file.path.clone(),
    source,
  })?;
  let name = file.archive_name();

  if meta.file_type().is_symlink() {
    let target = fs::read_link(&file.path).map_err(|source| ResourceError::Stat {
      path: file.path.clone(),
      source,
    })?;
    let target_sha1 = digest::calculate_string(&target.to_string_lossy());
    return Ok(format!("{name}{target_sha1}symlink"));
  }

  if meta.is_dir() {
    return Ok(format!("{name}{DIR_MODE}"));
  }

  let sha1 = digest::calculate_file(&file.path, DigestAlgorithm::Sha1)?;
  if file.exclude_mode {
    Ok(format!("{name}{}", sha1.hex()))
  } else {
    Ok(format!("{name}{}{}", sha1.hex(), file_mode(&meta)))
  }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> &'static str {
  use std::os::unix::fs::PermissionsExt;
  if meta.permissions().mode() & 0o111 != 0 {
    EXEC_FILE_MODE
  } else {
    FILE_MODE
  }
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> &'static str {
  FILE_MODE
}
