//! Named, fingerprinted units of a release.
//!
//! Jobs, packages and the license all share [`Resource`]: a name, a
//! fingerprint computed from its files, and an archive that is attached
//! once it has been found in an index or built from sources.

mod archive;
mod file;
pub mod fingerprint;
mod types;

pub use archive::{ArchiveRef, Archiver};
pub use file::File;
pub use types::{Resource, Sources};

use std::path::PathBuf;

use thiserror::Error;

use crate::cmd::CmdError;
use crate::compress::CompressError;
use crate::index::IndexError;
use crate::util::digest::DigestError;

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("failed to stat {path}: {source}")]
  Stat {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Digest(#[from] DigestError),

  #[error("failed to archive resource: {0}")]
  Compress(#[from] CompressError),

  #[error("running prep script for '{name}': {source}")]
  PrepScript {
    name: String,
    #[source]
    source: CmdError,
  },

  #[error(transparent)]
  Index(#[from] IndexError),

  #[error("expected to find '{name}/{fingerprint}' in the dev or final index")]
  ExpectedToExist { name: String, fingerprint: String },

  #[error("resource '{name}/{fingerprint}' has no archive and no sources to build one")]
  NoSources { name: String, fingerprint: String },
}
