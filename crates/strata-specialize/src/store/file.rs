use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strata_utils::{
    error::FileSystemError,
    fs::{atomic_write, ensure_dir_exists, safe_remove},
    hash::checksum_bytes,
};
use tracing::warn;

use super::KeyValueStore;
use crate::error::StoreResult;

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    value: String,
}

/// Snapshot store keeping one JSON file per key in a directory.
///
/// Identity keys are not valid file names everywhere, so files are named by
/// the digest of their key and carry the key inside.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir_exists(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = checksum_bytes(key.as_bytes());
        self.dir.join(format!("{}.json", &digest[..32]))
    }

    fn read_record(path: &Path) -> StoreResult<Option<Record>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(FileSystemError::File {
                    path: path.to_path_buf(),
                    action: "read",
                    source: err,
                }
                .into())
            }
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(Self::read_record(&self.path_for(key))?
            .filter(|record| record.key == key)
            .map(|record| record.value))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let record = Record {
            key: key.to_string(),
            value: value.to_string(),
        };
        atomic_write(self.path_for(key), serde_json::to_string(&record)?.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key);
        let existed = path.exists();
        safe_remove(&path)?;
        Ok(existed)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|err| {
            FileSystemError::Directory {
                path: self.dir.clone(),
                action: "read",
                source: err,
            }
        })?;

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) => keys.push(record.key),
                Ok(None) => {}
                Err(err) => warn!("Skipping unreadable state file {}: {}", path.display(), err),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
