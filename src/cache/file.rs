// SPDX-License-Identifier: GPL-3.0-only
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cache::traits::{KeyValueStore, StorageError};
use crate::utils::validate_storage_key;

const VALUE_EXTENSION: &str = "dat";

/// One file per key inside a data directory.
///
/// Values are written to a temp file in the same directory and renamed over
/// the target, so a reader never sees a half-written value.
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!(path = %dir.display(), quota_bytes = ?quota_bytes, "Opened file store");

        Ok(Self { dir, quota_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_storage_key(key).map_err(|e| StorageError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        Ok(self.dir.join(format!("{}.{}", key, VALUE_EXTENSION)))
    }

    /// Bytes used by every stored value except the one at `skip`
    fn used_bytes_except(&self, skip: &Path) -> Result<u64, StorageError> {
        let mut total = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == skip {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            total += entry.metadata()?.len();
        }

        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        if let Some(quota) = self.quota_bytes {
            let required = self.used_bytes_except(&path)? + value.len() as u64;
            if required > quota {
                return Err(StorageError::QuotaExceeded { required, quota });
            }
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(key = %key, bytes = value.len(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
