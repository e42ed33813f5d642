use std::path::Path;

use tracing::debug;

use super::{ArchiveRef, Archiver, File, ResourceError, fingerprint};
use crate::index::ArchiveIndex;
use crate::util::digest::{self, Digest, DigestAlgorithm};

/// Inputs an archive is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sources {
  pub files: Vec<File>,
  /// Scripts run inside the staging dir and then dropped from the archive.
  pub prep_files: Vec<File>,
  /// Extra fingerprint input, e.g. dependency names.
  pub chunks: Vec<String>,
}

impl Sources {
  /// Fingerprint over files, prep files and chunks.
  pub fn fingerprint(&self) -> Result<String, ResourceError> {
    let all: Vec<File> = self.files.iter().chain(&self.prep_files).cloned().collect();
    fingerprint::calculate(&all, &self.chunks)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
  name: String,
  fingerprint: String,
  archive: Option<ArchiveRef>,
  sources: Option<Sources>,
  expects_to_exist: bool,
}

impl Resource {
  /// A resource that will be built from `sources` if no index has it.
  pub fn from_sources(name: impl Into<String>, sources: Sources) -> Result<Self, ResourceError> {
    let fingerprint = sources.fingerprint()?;
    Ok(Self {
      name: name.into(),
      fingerprint,
      archive: None,
      sources: Some(sources),
      expects_to_exist: false,
    })
  }

  /// A resource known only by fingerprint that must already be indexed.
  pub fn existing(name: impl Into<String>, fingerprint: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      fingerprint: fingerprint.into(),
      archive: None,
      sources: None,
      expects_to_exist: true,
    }
  }

  /// A resource whose archive is already on disk, e.g. from a release tarball.
  pub fn with_archive(name: impl Into<String>, fingerprint: impl Into<String>, archive: ArchiveRef) -> Self {
    Self {
      name: name.into(),
      fingerprint: fingerprint.into(),
      archive: Some(archive),
      sources: None,
      expects_to_exist: false,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn fingerprint(&self) -> &str {
    &self.fingerprint
  }

  pub fn expects_to_exist(&self) -> bool {
    self.expects_to_exist
  }

  pub fn has_archive(&self) -> bool {
    self.archive.is_some()
  }

  pub fn sources(&self) -> Option<&Sources> {
    self.sources.as_ref()
  }

  /// Path of the attached archive.
  ///
  /// # Panics
  ///
  /// Panics when no archive has been attached by `build`, `finalize` or
  /// the constructor.
  pub fn archive_path(&self) -> &Path {
    match &self.archive {
      Some(archive) => &archive.path,
      None => panic!("archive path of '{}/{}' requested before build", self.name, self.fingerprint),
    }
  }

  /// Digest of the attached archive.
  ///
  /// # Panics
  ///
  /// Panics when no archive has been attached.
  pub fn archive_digest(&self) -> &Digest {
    match &self.archive {
      Some(archive) => &archive.digest,
      None => panic!("archive digest of '{}/{}' requested before build", self.name, self.fingerprint),
    }
  }

  /// Find the archive in the dev index, then the final index, else build
  /// it from sources and add it to the dev index.
  pub async fn build(
    &mut self,
    dev_index: &dyn ArchiveIndex,
    final_index: &dyn ArchiveIndex,
    archiver: &Archiver,
  ) -> Result<(), ResourceError> {
    if self.archive.is_some() {
      return Ok(());
    }

    if let Some(found) = dev_index.find(&self.name, &self.fingerprint).await? {
      debug!(name = %self.name, fingerprint = %self.fingerprint, "found in dev index");
      self.archive = Some(found);
      return Ok(());
    }

    if let Some(found) = final_index.find(&self.name, &self.fingerprint).await? {
      debug!(name = %self.name, fingerprint = %self.fingerprint, "found in final index");
      self.archive = Some(found);
      return Ok(());
    }

    if self.expects_to_exist {
      return Err(ResourceError::ExpectedToExist {
        name: self.name.clone(),
        fingerprint: self.fingerprint.clone(),
      });
    }

    let sources = self.sources.as_ref().ok_or_else(|| ResourceError::NoSources {
      name: self.name.clone(),
      fingerprint: self.fingerprint.clone(),
    })?;

    let built = archiver.build(&self.name, sources).await?;
    let added = dev_index
      .add(&self.name, &self.fingerprint, &built.path, &built.digest)
      .await;
    archiver.clean_up(&built.path)?;

    self.archive = Some(added?);
    Ok(())
  }

  /// Adopt the final index's archive, or publish the built one to it.
  ///
  /// # Panics
  ///
  /// Panics when the final index lacks the resource and no archive has
  /// been attached yet.
  pub async fn finalize(&mut self, final_index: &dyn ArchiveIndex) -> Result<(), ResourceError> {
    if let Some(found) = final_index.find(&self.name, &self.fingerprint).await? {
      self.archive = Some(found);
      return Ok(());
    }

    let added = final_index
      .add(&self.name, &self.fingerprint, self.archive_path(), self.archive_digest())
      .await?;
    self.archive = Some(added);
    Ok(())
  }

  /// Copy of this resource with `prefix` prepended to its name.
  pub fn prefixed(&self, prefix: &str) -> Self {
    Self {
      name: format!("{prefix}{}", self.name),
      ..self.clone()
    }
  }

  /// Copy of this resource with its archive digest recomputed with `algorithm`.
  pub fn rehash_with_calculator(&self, algorithm: DigestAlgorithm) -> Result<Self, ResourceError> {
    let path = self.archive_path().to_path_buf();
    let digest = digest::calculate_file(&path, algorithm)?;
    Ok(Self {
      archive: Some(ArchiveRef { path, digest }),
      ..self.clone()
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cmd::ProcessCmdRunner;
  use crate::compress::TarballCompressor;
  use crate::index::IndexError;
  use async_trait::async_trait;
  use std::collections::BTreeMap;
  use std::path::PathBuf;
  use std::sync::{Arc, Mutex};
  use tempfile::tempdir;

  #[derive(Default)]
  struct MapIndex {
    entries: Mutex<BTreeMap<(String, String), ArchiveRef>>,
    adds: Mutex<usize>,
  }

  impl MapIndex {
    fn with(name: &str, fp: &str, archive: ArchiveRef) -> Self {
      let index = Self::default();
      index
        .entries
        .lock()
        .unwrap()
        .insert((name.to_string(), fp.to_string()), archive);
      index
    }

    fn adds(&self) -> usize {
      *self.adds.lock().unwrap()
    }
  }

  #[async_trait]
  impl ArchiveIndex for MapIndex {
    async fn find(&self, name: &str, fingerprint: &str) -> Result<Option<ArchiveRef>, IndexError> {
      Ok(
        self
          .entries
          .lock()
          .unwrap()
          .get(&(name.to_string(), fingerprint.to_string()))
          .cloned(),
      )
    }

    async fn add(&self, name: &str, fingerprint: &str, path: &Path, digest: &Digest) -> Result<ArchiveRef, IndexError> {
      *self.adds.lock().unwrap() += 1;
      let archive = ArchiveRef {
        path: path.with_extension("indexed"),
        digest: digest.clone(),
      };
      self
        .entries
        .lock()
        .unwrap()
        .insert((name.to_string(), fingerprint.to_string()), archive.clone());
      Ok(archive)
    }
  }

  fn archive_ref(path: &str, content: &[u8]) -> ArchiveRef {
    ArchiveRef {
      path: PathBuf::from(path),
      digest: digest::calculate_bytes(content, DigestAlgorithm::Sha1),
    }
  }

  fn archiver() -> Archiver {
    Archiver::new(
      Arc::new(TarballCompressor::new()),
      Arc::new(ProcessCmdRunner::new()),
      "/tmp/release",
    )
  }

  #[test]
  #[should_panic(expected = "requested before build")]
  fn archive_path_panics_before_build() {
    let resource = Resource::existing("name", "fp");
    let _ = resource.archive_path();
  }

  #[tokio::test]
  async fn build_prefers_dev_index_then_final_index() {
    let dev = MapIndex::with("name", "fp", archive_ref("/dev/archive", b"dev"));
    let fin = MapIndex::with("name", "fp", archive_ref("/final/archive", b"final"));

    let mut resource = Resource::existing("name", "fp");
    resource.build(&dev, &fin, &archiver()).await.unwrap();
    assert_eq!(resource.archive_path(), Path::new("/dev/archive"));

    let mut resource = Resource::existing("name", "fp");
    resource.build(&MapIndex::default(), &fin, &archiver()).await.unwrap();
    assert_eq!(resource.archive_path(), Path::new("/final/archive"));
  }

  #[tokio::test]
  async fn existing_resource_missing_from_indices_fails() {
    let mut resource = Resource::existing("name", "fp");
    let err = resource
      .build(&MapIndex::default(), &MapIndex::default(), &archiver())
      .await
      .unwrap_err();
    assert!(matches!(err, ResourceError::ExpectedToExist { .. }));
  }

  #[tokio::test]
  async fn builds_and_adds_to_dev_index_when_not_indexed() {
    let src = tempdir().unwrap();
    std::fs::write(src.path().join("file"), "content").unwrap();
    let sources = Sources {
      files: vec![File::new(src.path().join("file"), src.path())],
      ..Default::default()
    };

    let dev = MapIndex::default();
    let fin = MapIndex::default();
    let mut resource = Resource::from_sources("name", sources).unwrap();
    resource.build(&dev, &fin, &archiver()).await.unwrap();

    assert_eq!(dev.adds(), 1);
    assert_eq!(fin.adds(), 0);
    assert_eq!(resource.archive_path().extension().unwrap(), "indexed");
    assert!(dev.find("name", resource.fingerprint()).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn build_is_noop_with_attached_archive() {
    let dev = MapIndex::default();
    let mut resource = Resource::with_archive("name", "fp", archive_ref("/given", b"x"));
    resource.build(&dev, &MapIndex::default(), &archiver()).await.unwrap();
    assert_eq!(resource.archive_path(), Path::new("/given"));
    assert_eq!(dev.adds(), 0);
  }

  #[tokio::test]
  async fn finalize_adopts_or_adds() {
    let fin = MapIndex::with("name", "fp", archive_ref("/final/archive", b"final"));
    let mut resource = Resource::with_archive("name", "fp", archive_ref("/built", b"built"));
    resource.finalize(&fin).await.unwrap();
    assert_eq!(resource.archive_path(), Path::new("/final/archive"));
    assert_eq!(fin.adds(), 0);

    let fin = MapIndex::default();
    let mut resource = Resource::with_archive("name", "fp", archive_ref("/built.tgz", b"built"));
    resource.finalize(&fin).await.unwrap();
    assert_eq!(fin.adds(), 1);
    assert_eq!(resource.archive_path(), Path::new("/built.indexed"));
  }

  #[tokio::test]
  #[should_panic(expected = "requested before build")]
  async fn finalize_panics_without_archive() {
    let mut resource = Resource::existing("name", "fp");
    let _ = resource.finalize(&MapIndex::default()).await;
  }

  #[test]
  fn prefixed_and_rehash_return_new_values() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("archive.tgz");
    std::fs::write(&path, "hello").unwrap();
    let resource = Resource::with_archive("pkg", "fp", ArchiveRef {
      path: path.clone(),
      digest: digest::calculate_file(&path, DigestAlgorithm::Sha1).unwrap(),
    });

    let prefixed = resource.prefixed("compiled-");
    assert_eq!(prefixed.name(), "compiled-pkg");
    assert_eq!(resource.name(), "pkg");

    let rehashed = resource.rehash_with_calculator(DigestAlgorithm::Sha256).unwrap();
    assert_eq!(rehashed.archive_digest().algorithm(), DigestAlgorithm::Sha256);
    assert_eq!(resource.archive_digest().algorithm(), DigestAlgorithm::Sha1);
  }
}
