use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::IndexError;

#[derive(Debug, Serialize, Deserialize)]
struct Entry<K, V> {
  key: K,
  value: V,
}

/// Keyed records persisted as a YAML list in a single file.
///
/// Writes go through an internal lock, and every `save` rewrites the
/// whole file.
pub struct FileIndex<K, V> {
  path: PathBuf,
  lock: Mutex<()>,
  _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> FileIndex<K, V>
where
  K: Serialize + DeserializeOwned + PartialEq,
  V: Serialize + DeserializeOwned + Clone,
{
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      lock: Mutex::new(()),
      _marker: PhantomData,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Value stored under `key`, or [`IndexError::NotFound`].
  pub fn find(&self, key: &K) -> Result<V, IndexError> {
    let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
    self
      .load()?
      .into_iter()
      .find(|entry| entry.key == *key)
      .map(|entry| entry.value)
      .ok_or(IndexError::NotFound)
  }

  /// Insert or replace the value stored under `key`.
  pub fn save(&self, key: K, value: V) -> Result<(), IndexError> {
    let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
    let mut entries = self.load()?;

    match entries.iter_mut().find(|entry| entry.key == key) {
      Some(entry) => entry.value = value,
      None => entries.push(Entry { key, value }),
    }

    let yaml = serde_yaml::to_string(&entries).map_err(IndexError::Serialize)?;
    let write_err = |source| IndexError::Write {
      path: self.path.clone(),
      source,
    };
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(&self.path, yaml).map_err(write_err)
  }

  fn load(&self) -> Result<Vec<Entry<K, V>>, IndexError> {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(IndexError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };

    if contents.trim().is_empty() {
      return Ok(Vec::new());
    }

    serde_yaml::from_str(&contents).map_err(|source| IndexError::Parse {
      path: self.path.clone(),
      source,
    })
  }
}
