use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ReleaseDirError;

pub type BlobstoreOptions = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PublicConfig {
  #[serde(default, skip_serializing)]
  name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  final_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  blobstore: Option<BlobstoreConfig>,
  #[serde(flatten)]
  extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BlobstoreConfig {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  provider: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  options: BlobstoreOptions,
}

#[derive(Debug, Default, Deserialize)]
struct PrivateConfig {
  #[serde(default)]
  blobstore: Option<BlobstoreConfig>,
}

/// `config/final.yml` plus its uncommitted companion `config/private.yml`.
#[derive(Debug, Clone)]
pub struct FsConfig {
  public_path: PathBuf,
  private_path: PathBuf,
}

impl FsConfig {
  pub fn new(public_path: impl Into<PathBuf>, private_path: impl Into<PathBuf>) -> Self {
    Self {
      public_path: public_path.into(),
      private_path: private_path.into(),
    }
  }

  /// Config files of the release directory at `dir`.
  pub fn in_release_dir(dir: &Path) -> Self {
    Self::new(dir.join("config/final.yml"), dir.join("config/private.yml"))
  }

  /// Final release name: `final_name`, falling back to `name`.
  pub fn name(&self) -> Result<String, ReleaseDirError> {
    let (public, _) = self.read()?;

    let name = public.final_name.or(public.name).unwrap_or_default();
    if name.is_empty() {
      return Err(ReleaseDirError::MissingConfig {
        key: "final_name",
        path: self.public_path.clone(),
      });
    }
    Ok(name)
  }

  /// Store `name` as `final_name`, keeping every other public entry.
  pub fn save_name(&self, name: &str) -> Result<(), ReleaseDirError> {
    let (mut public, _) = self.read()?;
    public.name = None;
    public.final_name = Some(name.to_string());

    let yaml = serde_yaml::to_string(&public).map_err(|source| ReleaseDirError::Yaml {
      path: self.public_path.clone(),
      source,
    })?;
    if let Some(parent) = self.public_path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| ReleaseDirError::io(parent, e))?;
    }
    std::fs::write(&self.public_path, yaml).map_err(|e| ReleaseDirError::io(&self.public_path, e))?;

    debug!(name, path = ?self.public_path, "saved final name");
    Ok(())
  }

  /// Blobstore provider and its options; private options override public
  /// ones.
  pub fn blobstore(&self) -> Result<(String, BlobstoreOptions), ReleaseDirError> {
    let (public, private) = self.read()?;

    let public = public.blobstore.unwrap_or_default();
    if public.provider.is_empty() {
      return Err(ReleaseDirError::MissingConfig {
        key: "blobstore.provider",
        path: self.public_path.clone(),
      });
    }

    let mut options = public.options;
    if let Some(private) = private.blobstore {
      options.extend(private.options);
    }
    Ok((public.provider, options))
  }

  fn read(&self) -> Result<(PublicConfig, PrivateConfig), ReleaseDirError> {
    Ok((read_optional(&self.public_path)?, read_optional(&self.private_path)?))
  }
}

fn read_optional<T: Default + serde::de::DeserializeOwned>(path: &Path) -> Result<T, ReleaseDirError> {
  let contents = match std::fs::read_to_string(path) {
    Ok(contents) => contents,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
    Err(e) => return Err(ReleaseDirError::io(path, e)),
  };

  if contents.trim().is_empty() {
    return Ok(T::default());
  }

  serde_yaml::from_str(&contents).map_err(|source| ReleaseDirError::Yaml {
    path: path.to_path_buf(),
    source,
  })
}
