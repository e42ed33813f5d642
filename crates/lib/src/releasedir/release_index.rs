use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ReleaseDirError;
use super::version::ReleaseVersion;
use crate::consts::INDEX_FORMAT_VERSION;
use crate::progress::IndexReporter;
use crate::release::manifest::ReleaseManifest;

const INDEX_FILENAME: &str = "index.yml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReleaseIndexFile {
  #[serde(default)]
  builds: BTreeMap<String, ReleaseIndexEntry>,
  #[serde(rename = "format-version", default = "format_version")]
  format_version: String,
}

fn format_version() -> String {
  INDEX_FORMAT_VERSION.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ReleaseIndexEntry {
  version: String,
}

/// Versions of one kind of release (`dev` or `final`), keyed by a random
/// build id in `<dir>/<name>/index.yml`, with each release manifest next
/// to it as `<name>-<version>.yml`.
pub struct FsReleaseIndex {
  kind: String,
  dir: PathBuf,
  reporter: Arc<dyn IndexReporter>,
}

impl FsReleaseIndex {
  pub fn new(kind: impl Into<String>, dir: impl Into<PathBuf>, reporter: Arc<dyn IndexReporter>) -> Self {
    Self {
      kind: kind.into(),
      dir: dir.into(),
      reporter,
    }
  }

  pub fn manifest_path(&self, name: &str, version: &str) -> PathBuf {
    self.dir.join(name).join(format!("{name}-{version}.yml"))
  }

  pub fn archive_path(&self, name: &str, version: &str) -> PathBuf {
    self.dir.join(name).join(format!("{name}-{version}.tgz"))
  }

  fn index_path(&self, name: &str) -> PathBuf {
    self.dir.join(name).join(INDEX_FILENAME)
  }

  /// Greatest recorded version of `name`, if any.
  pub async fn last_version(&self, name: &str) -> Result<Option<ReleaseVersion>, ReleaseDirError> {
    if name.is_empty() {
      return Err(ReleaseDirError::EmptyName);
    }

    let path = self.index_path(name);
    let index = read_index(&path).await?;

    let mut versions = Vec::with_capacity(index.builds.len());
    for entry in index.builds.values() {
      let version = entry
        .version
        .parse::<ReleaseVersion>()
        .map_err(|source| ReleaseDirError::VersionParse {
          path: path.clone(),
          source,
        })?;
      versions.push(version);
    }

    Ok(versions.into_iter().max())
  }

  pub async fn contains(&self, name: &str, version: &str) -> Result<bool, ReleaseDirError> {
    if name.is_empty() {
      return Err(ReleaseDirError::EmptyName);
    }
    if version.is_empty() {
      return Err(ReleaseDirError::EmptyVersion);
    }

    let index = read_index(&self.index_path(name)).await?;
    Ok(index.builds.values().any(|entry| entry.version == version))
  }

  /// Save `manifest` and record its version under a new build id.
  pub async fn add(&self, manifest: &ReleaseManifest) -> Result<(), ReleaseDirError> {
    if manifest.name.is_empty() {
      return Err(ReleaseDirError::EmptyName);
    }
    if manifest.version.is_empty() {
      return Err(ReleaseDirError::EmptyVersion);
    }

    let path = self.index_path(&manifest.name);
    let mut index = read_index(&path).await?;
    if index.builds.values().any(|entry| entry.version == manifest.version) {
      return Err(ReleaseDirError::VersionExists(manifest.version.clone()));
    }

    let desc = format!("{}/{}", manifest.name, manifest.version);
    self.reporter.index_entry_started_adding(&self.kind, &desc);

    let result = async {
      let manifest_path = self.manifest_path(&manifest.name, &manifest.version);
      write_yaml(&manifest_path, manifest).await?;

      index.builds.insert(
        uuid::Uuid::new_v4().to_string(),
        ReleaseIndexEntry {
          version: manifest.version.clone(),
        },
      );
      write_yaml(&path, &index).await
    }
    .await;

    let err = result.as_ref().err().map(|e| e.to_string());
    self.reporter.index_entry_finished_adding(&self.kind, &desc, err.as_deref());

    if result.is_ok() {
      debug!(kind = %self.kind, release = %desc, "recorded release");
    }
    result
  }
}

async fn read_index(path: &Path) -> Result<ReleaseIndexFile, ReleaseDirError> {
  let contents = match tokio::fs::read_to_string(path).await {
    Ok(contents) => contents,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReleaseIndexFile::default()),
    Err(e) => return Err(ReleaseDirError::io(path, e)),
  };

  if contents.trim().is_empty() {
    return Ok(ReleaseIndexFile::default());
  }

  serde_yaml::from_str(&contents).map_err(|source| ReleaseDirError::Yaml {
    path: path.to_path_buf(),
    source,
  })
}

async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), ReleaseDirError> {
  let yaml = serde_yaml::to_string(value).map_err(|source| ReleaseDirError::Yaml {
    path: path.to_path_buf(),
    source,
  })?;

  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|e| ReleaseDirError::io(parent, e))?;
  }
  tokio::fs::write(path, yaml).await.map_err(|e| ReleaseDirError::io(path, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::RecordingReporter;
  use std::fs;
  use tempfile::{TempDir, tempdir};

  fn index() -> (TempDir, Arc<RecordingReporter>, FsReleaseIndex) {
    let dir = tempdir().unwrap();
    let reporter = Arc::new(RecordingReporter::default());
    let index = FsReleaseIndex::new("dev", dir.path(), reporter.clone());
    (dir, reporter, index)
  }

  fn manifest(version: &str) -> ReleaseManifest {
    ReleaseManifest {
      name: "name".into(),
      version: version.into(),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn last_version_picks_greatest() {
    let (dir, _, index) = index();
    assert_eq!(index.last_version("name").await.unwrap(), None);

    fs::create_dir_all(dir.path().join("name")).unwrap();
    fs::write(dir.path().join("name/index.yml"), "").unwrap();
    assert_eq!(index.last_version("name").await.unwrap(), None);

    fs::write(
      dir.path().join("name/index.yml"),
      "builds:\n  uuid1: {version: \"1.1\"}\n  uuid2: {version: \"1\"}\nformat-version: \"2\"\n",
    )
    .unwrap();
    assert_eq!(index.last_version("name").await.unwrap().unwrap().to_string(), "1.1");

    fs::write(dir.path().join("name/index.yml"), "builds:\n  uuid2: {version: \"-\"}\n").unwrap();
    assert!(matches!(
      index.last_version("name").await.unwrap_err(),
      ReleaseDirError::VersionParse { .. }
    ));

    assert_eq!(
      index.last_version("").await.unwrap_err().to_string(),
      "expected non-empty release name"
    );
  }

  #[tokio::test]
  async fn add_saves_manifest_and_entry() {
    let (dir, reporter, index) = index();

    index.add(&manifest("ver1")).await.unwrap();

    let saved: ReleaseManifest =
      serde_yaml::from_str(&fs::read_to_string(dir.path().join("name/name-ver1.yml")).unwrap()).unwrap();
    assert_eq!(saved, manifest("ver1"));
    let yaml = fs::read_to_string(dir.path().join("name/index.yml")).unwrap();
    let saved: ReleaseIndexFile = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(saved.format_version, "2");
    assert_eq!(saved.builds.values().next().unwrap().version, "ver1");
    assert!(index.contains("name", "ver1").await.unwrap());
    assert!(!index.contains("name", "ver2").await.unwrap());
    assert_eq!(reporter.events(), vec![
      "started adding dev name/ver1".to_string(),
      "finished adding dev name/ver1".to_string()
    ]);

    let err = index.add(&manifest("ver1")).await.unwrap_err();
    assert_eq!(err.to_string(), "release version 'ver1' already exists");

    index.add(&manifest("ver2")).await.unwrap();
    let yaml = fs::read_to_string(dir.path().join("name/index.yml")).unwrap();
    assert_eq!(yaml.matches("version:").count(), 2);
  }

  #[tokio::test]
  async fn rejects_empty_name_and_version() {
    let (_dir, _, index) = index();
    assert!(matches!(
      index.add(&manifest("")).await.unwrap_err(),
      ReleaseDirError::EmptyVersion
    ));
    assert!(matches!(
      index.contains("", "1").await.unwrap_err(),
      ReleaseDirError::EmptyName
    ));
  }

  #[test]
  fn paths() {
    let index = FsReleaseIndex::new("final", "/dir", Arc::new(RecordingReporter::default()));
    assert_eq!(index.manifest_path("name", "ver1"), PathBuf::from("/dir/name/name-ver1.yml"));
    assert_eq!(index.archive_path("name", "ver1"), PathBuf::from("/dir/name/name-ver1.tgz"));
  }
}
