use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::blobs::FsBlobsDir;
use super::config::FsConfig;
use super::git::GitRepo;
use super::release_index::FsReleaseIndex;
use super::version::ReleaseVersion;
use super::ReleaseDirError;
use crate::blobstore::Blobstore;
use crate::cmd::{CmdRunner, ProcessCmdRunner};
use crate::compress::{Compressor, TarballCompressor};
use crate::index::ArchiveIndices;
use crate::platform::paths;
use crate::progress::{BlobsDirReporter, IndexReporter, TracingReporter};
use crate::release::manifest::{ReleaseManifest, read_yaml};
use crate::release::{ArchiveWriter, DirReader, Release};
use crate::resource::Archiver;
use crate::util::fs::{move_file, remove_all};

/// Collaborators and knobs of a release directory.
#[derive(Clone)]
pub struct ReleaseDirConfig {
  pub runner: Arc<dyn CmdRunner>,
  pub compressor: Arc<dyn Compressor>,
  pub index_reporter: Arc<dyn IndexReporter>,
  pub blobs_reporter: Arc<dyn BlobsDirReporter>,
  /// Local cache of index blobs.
  pub cache_dir: PathBuf,
  /// Concurrent blob downloads.
  pub parallelism: usize,
}

impl Default for ReleaseDirConfig {
  fn default() -> Self {
    Self {
      runner: Arc::new(ProcessCmdRunner::new()),
      compressor: Arc::new(TarballCompressor::new()),
      index_reporter: Arc::new(TracingReporter),
      blobs_reporter: Arc::new(TracingReporter),
      cache_dir: paths::cache_dir(),
      parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
    }
  }
}

/// A release directory on disk.
///
/// Dev releases are recorded in `dev_releases/`, final releases in
/// `releases/`; the archives of their jobs, packages and license in
/// `.dev_builds/` and `.final_builds/`.
pub struct FsReleaseDir {
  dir: PathBuf,
  config: FsConfig,
  git: GitRepo,
  blobs: FsBlobsDir,
  dev_releases: FsReleaseIndex,
  final_releases: FsReleaseIndex,
  dev_indices: ArchiveIndices,
  final_indices: ArchiveIndices,
  archiver: Archiver,
  blobstore: Arc<dyn Blobstore>,
  compressor: Arc<dyn Compressor>,
  runner: Arc<dyn CmdRunner>,
  parallelism: usize,
}

impl FsReleaseDir {
  pub fn new(dir: impl Into<PathBuf>, blobstore: Arc<dyn Blobstore>, config: ReleaseDirConfig) -> Self {
    let dir = dir.into();
    let (dev_indices, final_indices) = ArchiveIndices::dev_and_final(
      &dir,
      &config.cache_dir,
      config.index_reporter.clone(),
      blobstore.clone(),
    );

    Self {
      config: FsConfig::in_release_dir(&dir),
      git: GitRepo::new(&dir, config.runner.clone()),
      blobs: FsBlobsDir::new(&dir, config.blobs_reporter.clone(), blobstore.clone()),
      dev_releases: FsReleaseIndex::new("dev", dir.join("dev_releases"), config.index_reporter.clone()),
      final_releases: FsReleaseIndex::new("final", dir.join("releases"), config.index_reporter.clone()),
      dev_indices,
      final_indices,
      archiver: Archiver::new(config.compressor.clone(), config.runner.clone(), &dir),
      blobstore,
      compressor: config.compressor,
      runner: config.runner,
      parallelism: config.parallelism,
      dir,
    }
  }

  /// Open `dir` with the blobstore its config describes.
  pub async fn open(dir: impl Into<PathBuf>, config: ReleaseDirConfig) -> Self {
    let dir = dir.into();
    let blobstore = super::new_blobstore(&dir).await;
    Self::new(dir, blobstore, config)
  }

  pub fn path(&self) -> &Path {
    &self.dir
  }

  pub fn blobstore(&self) -> Arc<dyn Blobstore> {
    self.blobstore.clone()
  }

  pub fn compressor(&self) -> Arc<dyn Compressor> {
    self.compressor.clone()
  }

  pub fn runner(&self) -> Arc<dyn CmdRunner> {
    self.runner.clone()
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism
  }

  pub fn blobs(&self) -> &FsBlobsDir {
    &self.blobs
  }

  pub fn config(&self) -> &FsConfig {
    &self.config
  }

  pub fn dev_releases(&self) -> &FsReleaseIndex {
    &self.dev_releases
  }

  pub fn final_releases(&self) -> &FsReleaseIndex {
    &self.final_releases
  }

  /// Lay out an empty release named after the directory.
  pub async fn init(&self, git: bool) -> Result<(), ReleaseDirError> {
    for sub in ["jobs", "packages", "src"] {
      let path = self.dir.join(sub);
      tokio::fs::create_dir_all(&path)
        .await
        .map_err(|e| ReleaseDirError::io(&path, e))?;
    }

    let resolved = dunce::canonicalize(&self.dir).map_err(|e| ReleaseDirError::io(&self.dir, e))?;
    let name = resolved
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    self.config.save_name(&name)?;
    self.blobs.init().await?;

    if git {
      self.git.init().await?;
    }

    info!(dir = ?self.dir, name = %name, "initialized release directory");
    Ok(())
  }

  /// Forget every dev release and dev build.
  pub async fn reset(&self) -> Result<(), ReleaseDirError> {
    for sub in [".dev_builds", "dev_releases"] {
      let path = self.dir.join(sub);
      remove_all(&path).await.map_err(|e| ReleaseDirError::io(&path, e))?;
    }
    info!(dir = ?self.dir, "removed dev releases");
    Ok(())
  }

  pub fn default_name(&self) -> Result<String, ReleaseDirError> {
    self.config.name()
  }

  pub async fn next_final_version(&self, name: &str) -> Result<ReleaseVersion, ReleaseDirError> {
    let last = self
      .final_releases
      .last_version(name)
      .await?
      .unwrap_or_else(ReleaseVersion::zero);

    last
      .next_final()
      .map_err(|source| ReleaseDirError::Increment { kind: "final", source })
  }

  /// Next dev version after the greater of the last dev and last final
  /// versions.
  pub async fn next_dev_version(&self, name: &str) -> Result<ReleaseVersion, ReleaseDirError> {
    let last = self.last_version(name).await?.unwrap_or_else(ReleaseVersion::zero);

    last
      .next_dev()
      .map_err(|source| ReleaseDirError::Increment { kind: "dev", source })
  }

  async fn last_version(&self, name: &str) -> Result<Option<ReleaseVersion>, ReleaseDirError> {
    let dev = self.dev_releases.last_version(name).await?;
    let final_ = self.final_releases.last_version(name).await?;
    Ok(dev.into_iter().chain(final_).max())
  }

  /// Most recent dev or final release of the default release name, with
  /// archives found in the indices.
  pub async fn last_release(&self) -> Result<Release, ReleaseDirError> {
    let name = self.default_name()?;

    let dev = self.dev_releases.last_version(&name).await?;
    let final_ = self.final_releases.last_version(&name).await?;

    let path = match (dev, final_) {
      (None, None) => return Err(ReleaseDirError::NoVersions),
      (Some(dev), Some(final_)) if final_ >= dev => self.final_releases.manifest_path(&name, &final_.to_string()),
      (Some(dev), _) => self.dev_releases.manifest_path(&name, &dev.to_string()),
      (None, Some(final_)) => self.final_releases.manifest_path(&name, &final_.to_string()),
    };

    debug!(manifest = ?path, "reading last release");
    let manifest: ReleaseManifest = read_yaml(&path)?;
    let mut release = Release::from_manifest(&manifest)?;
    release
      .build(&self.dev_indices, &self.final_indices, &self.archiver)
      .await?;
    Ok(release)
  }

  /// Build a dev release from the directory contents and record it.
  pub async fn build_release(&self, name: &str, version: &ReleaseVersion, force: bool) -> Result<Release, ReleaseDirError> {
    let dirty = self.git.must_not_be_dirty(force).await?;
    let commit = self.git.last_commit_sha().await?;

    self.blobs.download_blobs(self.parallelism).await?;

    let mut release = DirReader::new(&self.dir).read()?;
    release.set_name(name);
    release.set_version(version.to_string());
    release.set_commit_hash(commit, dirty);

    release
      .build(&self.dev_indices, &self.final_indices, &self.archiver)
      .await?;
    self.dev_releases.add(&release.manifest()).await?;

    info!(release = %name, version = %version, "built dev release");
    Ok(release)
  }

  /// Publish `release` to the final indices and record it as final.
  pub async fn finalize_release(&self, release: &mut Release, force: bool) -> Result<(), ReleaseDirError> {
    self.git.must_not_be_dirty(force).await?;

    if self.final_releases.contains(release.name(), release.version()).await? {
      return Err(ReleaseDirError::ReleaseExists {
        name: release.name().to_string(),
        version: release.version().to_string(),
      });
    }

    release.finalize(&self.final_indices).await?;
    self.final_releases.add(&release.manifest()).await?;

    info!(release = %release.name(), version = %release.version(), "finalized release");
    Ok(())
  }

  /// Write `release` as a tarball to `dst`, or next to its dev or final
  /// manifest when no destination is given.
  pub async fn build_release_archive(&self, release: &Release, dst: Option<&Path>) -> Result<PathBuf, ReleaseDirError> {
    let tarball = ArchiveWriter::new(self.compressor.clone()).write(release, &[])?;

    let dst = match dst {
      Some(dst) => dst.to_path_buf(),
      None => {
        let is_dev = release
          .version()
          .parse::<ReleaseVersion>()
          .map(|v| v.is_dev())
          .unwrap_or(false);
        let index = if is_dev { &self.dev_releases } else { &self.final_releases };
        index.archive_path(release.name(), release.version())
      }
    };

    move_file(&tarball, &dst)
      .await
      .map_err(|e| ReleaseDirError::io(&dst, e))?;

    info!(tarball = ?dst, "wrote release tarball");
    Ok(dst)
  }
}
