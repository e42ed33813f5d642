//! Content digests for archives and blobs.
//!
//! This module provides:
//! - `Digest`: an algorithm-tagged hex digest (`<sha1>` or `sha256:<hex>`)
//! - `calculate_file()`: stream a file through a hash function
//! - `calculate_string()`: SHA1 of a string, used for fingerprints

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use sha2::digest::Output;
use thiserror::Error;

/// Hash function a digest was produced with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
  #[default]
  Sha1,
  Sha256,
}

impl DigestAlgorithm {
  pub fn as_str(&self) -> &'static str {
    match self {
      DigestAlgorithm::Sha1 => "sha1",
      DigestAlgorithm::Sha256 => "sha256",
    }
  }

  fn hex_len(&self) -> usize {
    match self {
      DigestAlgorithm::Sha1 => 40,
      DigestAlgorithm::Sha256 => 64,
    }
  }
}

impl fmt::Display for DigestAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Error)]
pub enum DigestError {
  #[error("empty digest")]
  Empty,

  #[error("unknown digest algorithm '{0}'")]
  UnknownAlgorithm(String),

  #[error("malformed {algorithm} digest '{value}'")]
  Malformed { algorithm: DigestAlgorithm, value: String },

  #[error("failed to read {path}: {source}")]
  ReadFile {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("expected {path} to have digest '{expected}' but was '{actual}'")]
  Mismatch { path: String, expected: Digest, actual: Digest },
}

/// An algorithm-tagged, lowercase hex digest.
///
/// SHA1 digests render as bare hex for compatibility with existing release
/// manifests; every other algorithm renders as `<algorithm>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
  algorithm: DigestAlgorithm,
  hex: String,
}

impl Digest {
  pub fn new(algorithm: DigestAlgorithm, hex: impl Into<String>) -> Result<Self, DigestError> {
    let hex = hex.into().to_lowercase();
    if hex.len() != algorithm.hex_len() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(DigestError::Malformed { algorithm, value: hex });
    }
    Ok(Self { algorithm, hex })
  }

  pub fn algorithm(&self) -> DigestAlgorithm {
    self.algorithm
  }

  pub fn hex(&self) -> &str {
    &self.hex
  }

  /// Recompute the digest of `path` with this digest's algorithm and compare.
  pub fn verify_file(&self, path: &Path) -> Result<(), DigestError> {
    let actual = calculate_file(path, self.algorithm)?;
    if actual != *self {
      return Err(DigestError::Mismatch {
        path: path.display().to_string(),
        expected: self.clone(),
        actual,
      });
    }
    Ok(())
  }
}

impl fmt::Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.algorithm {
      DigestAlgorithm::Sha1 => write!(f, "{}", self.hex),
      other => write!(f, "{}:{}", other, self.hex),
    }
  }
}

impl FromStr for Digest {
  type Err = DigestError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(DigestError::Empty);
    }

    match s.split_once(':') {
      Some(("sha1", hex)) => Digest::new(DigestAlgorithm::Sha1, hex),
      Some(("sha256", hex)) => Digest::new(DigestAlgorithm::Sha256, hex),
      Some((algo, _)) => Err(DigestError::UnknownAlgorithm(algo.to_string())),
      None => Digest::new(DigestAlgorithm::Sha1, s),
    }
  }
}

impl TryFrom<String> for Digest {
  type Error = DigestError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Digest> for String {
  fn from(digest: Digest) -> Self {
    digest.to_string()
  }
}

fn hash_reader<D: sha2::Digest + io::Write>(mut r: impl io::Read) -> io::Result<Output<D>> {
  let mut hasher = D::new();
  io::copy(&mut r, &mut hasher)?;
  Ok(hasher.finalize())
}

/// Hash a file's contents with the given algorithm.
pub fn calculate_file(path: &Path, algorithm: DigestAlgorithm) -> Result<Digest, DigestError> {
  let read_err = |source| DigestError::ReadFile {
    path: path.display().to_string(),
    source,
  };

  let file = fs::File::open(path).map_err(read_err)?;
  let reader = io::BufReader::new(file);

  let hex = match algorithm {
    DigestAlgorithm::Sha1 => hex::encode(hash_reader::<Sha1>(reader).map_err(read_err)?),
    DigestAlgorithm::Sha256 => hex::encode(hash_reader::<Sha256>(reader).map_err(read_err)?),
  };

  Ok(Digest { algorithm, hex })
}

/// Hash arbitrary bytes with the given algorithm.
pub fn calculate_bytes(data: &[u8], algorithm: DigestAlgorithm) -> Digest {
  let hex = match algorithm {
    DigestAlgorithm::Sha1 => hex::encode(<Sha1 as sha2::Digest>::digest(data)),
    DigestAlgorithm::Sha256 => hex::encode(<Sha256 as sha2::Digest>::digest(data)),
  };
  Digest { algorithm, hex }
}

/// SHA1 hex of a string.
pub fn calculate_string(data: &str) -> String {
  calculate_bytes(data.as_bytes(), DigestAlgorithm::Sha1).hex
}
