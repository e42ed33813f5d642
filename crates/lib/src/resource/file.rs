use std::path::{Path, PathBuf};

/// A file that belongs to a resource, remembered relative to the
/// directory it was collected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
  pub path: PathBuf,
  pub dir_path: PathBuf,
  /// Forward-slash path of `path` below `dir_path`.
  pub relative_path: String,

  /// Leave the permission bits out of the fingerprint.
  pub exclude_mode: bool,
}

impl File {
  pub fn new(path: impl Into<PathBuf>, dir_path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let dir_path = dir_path.into();
    let relative_path = relative(&path, &dir_path);
    Self {
      path,
      dir_path,
      relative_path,
      exclude_mode: false,
    }
  }

  pub fn exclude_mode(mut self) -> Self {
    self.exclude_mode = true;
    self
  }

  /// Same file re-rooted under another directory, keeping its flags.
  pub fn with_new_dir(&self, dir_path: &Path) -> Self {
    Self {
      path: dir_path.join(&self.relative_path),
      dir_path: dir_path.to_path_buf(),
      relative_path: self.relative_path.clone(),
      exclude_mode: self.exclude_mode,
    }
  }

  /// Name the file is recorded under in fingerprints and archives.
  pub fn archive_name(&self) -> &str {
    &self.relative_path
  }
}

fn relative(path: &Path, dir: &Path) -> String {
  let rel = path.strip_prefix(dir).unwrap_or(path);
  rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
