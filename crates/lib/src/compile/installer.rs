use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{CompileError, CompiledPackageRef};
use crate::blobstore::Blobstore;
use crate::compress::Compressor;

/// Unpacks compiled packages from the blobstore into a packages dir.
pub struct PackageInstaller {
  blobstore: Arc<dyn Blobstore>,
  compressor: Arc<dyn Compressor>,
}

impl PackageInstaller {
  pub fn new(blobstore: Arc<dyn Blobstore>, compressor: Arc<dyn Compressor>) -> Self {
    Self { blobstore, compressor }
  }

  /// Install `pkg` into `<packages_dir>/<name>`.
  pub async fn install(&self, pkg: &CompiledPackageRef, packages_dir: &Path) -> Result<(), CompileError> {
    let target = packages_dir.join(&pkg.name);
    debug!(package = %pkg.name, blob_id = %pkg.blob_id, target = ?target, "installing compiled package");

    let blob = self
      .blobstore
      .get(&pkg.blob_id, &pkg.sha1)
      .await
      .map_err(|source| CompileError::Fetch {
        name: pkg.name.clone(),
        source,
      })?;

    let result = self
      .compressor
      .decompress_file_to_dir(&blob, &target)
      .map_err(|source| CompileError::Install {
        name: pkg.name.clone(),
        dir: packages_dir.to_path_buf(),
        source,
      });

    if let Err(e) = self.blobstore.clean_up(&blob).await {
      warn!(blob = ?blob, error = %e, "failed to clean up fetched blob");
    }

    result
  }
}
