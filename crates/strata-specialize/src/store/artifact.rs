use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use strata_utils::{
    error::FileSystemError,
    fs::{atomic_write, ensure_dir_exists},
};

use super::ArtifactStore;
use crate::error::{StoreError, StoreResult};

/// Artifact names are bare file names; anything that could escape the
/// artifact directory is refused.
fn validate(path: &str) -> StoreResult<()> {
    let plain = !path.is_empty()
        && !path.starts_with('.')
        && !path.contains(['/', '\\'])
        && Path::new(path).file_name().is_some();
    if plain {
        Ok(())
    } else {
        Err(StoreError::InvalidArtifactPath(path.to_string()))
    }
}

/// Artifact store in a directory, published with write-then-rename.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir_exists(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, path: &str, source: &str) -> StoreResult<()> {
        validate(path)?;
        atomic_write(self.dir.join(path), source.as_bytes())?;
        Ok(())
    }

    fn read(&self, path: &str) -> StoreResult<String> {
        validate(path)?;
        let full = self.dir.join(path);
        fs::read_to_string(&full).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ArtifactNotFound(path.to_string())
            } else {
                FileSystemError::File {
                    path: full.clone(),
                    action: "read",
                    source: err,
                }
                .into()
            }
        })
    }
}

/// Process-local artifact store; clones share their contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    artifacts: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops an artifact, as a cleanup of the shared directory would.
    pub fn evict(&self, path: &str) -> StoreResult<bool> {
        Ok(self.artifacts.lock()?.remove(path).is_some())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write(&self, path: &str, source: &str) -> StoreResult<()> {
        validate(path)?;
        self.artifacts
            .lock()?
            .insert(path.to_string(), source.to_string());
        Ok(())
    }

    fn read(&self, path: &str) -> StoreResult<String> {
        self.artifacts
            .lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::ArtifactNotFound(path.to_string()))
    }
}
