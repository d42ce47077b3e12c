//! Durable storage shared by every process using the same state location.
//!
//! Two stores are involved: a key-value store holding one
//! [`crate::snapshot::SnapshotEntry`] per procedure identity, and an artifact
//! store holding compiled plans under content-addressed names. Neither is
//! locked; concurrent writers race and the last one wins.

mod artifact;
mod file;
mod memory;
mod sqlite;

pub use artifact::{FsArtifactStore, MemoryArtifactStore};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::{artifact::CompiledArtifact, error::StoreResult};

/// Durable string store keyed by identity key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`; returns whether it existed.
    fn remove(&self, key: &str) -> StoreResult<bool>;

    /// Every stored key, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Storage for generated artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Publishes `source` under `path`. A reader never observes a partially
    /// written artifact.
    fn write(&self, path: &str, source: &str) -> StoreResult<()>;

    fn read(&self, path: &str) -> StoreResult<String>;

    fn load_executable(&self, path: &str) -> StoreResult<CompiledArtifact> {
        CompiledArtifact::load(&self.read(path)?)
    }
}
