//! Model artifact storage
//!
//! Versions are immutable once written. Promotion only moves the active
//! pointer, and the previously active set is copied under a timestamped
//! backup key first, so a bad promotion can always be rolled back by hand.

mod fs;
mod memory;
mod set;

pub use self::fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;
pub use set::{ArtifactMetadata, CorpusCounts, ModelArtifactSet, ModelVersion};

use crate::Result;
use chrono::{DateTime, Utc};

/// Backup key for `version` taken at `at`: `YYYYmmdd_HHMMSS-v000001`
#[must_use]
pub fn backup_key(at: DateTime<Utc>, version: ModelVersion) -> String {
    format!("{}-{version}", at.format("%Y%m%d_%H%M%S"))
}

/// Durable home of every trained version and the active pointer.
pub trait ArtifactStore: Send + Sync {
    /// All stored versions, ascending
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed
    fn versions(&self) -> Result<Vec<ModelVersion>>;

    /// Version number to use for the next write
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed
    fn next_version(&self) -> Result<ModelVersion> {
        Ok(self
            .versions()?
            .last()
            .map_or(ModelVersion::FIRST, |v| v.next()))
    }

    /// Persist a new version. Existing versions are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `Error::Artifact` if the version already exists or the write fails
    fn write_version(&self, set: &ModelArtifactSet) -> Result<()>;

    /// Load and validate a version.
    ///
    /// # Errors
    ///
    /// `Error::ArtifactNotFound` for an unknown version, `Error::SchemaMismatch`
    /// for a version trained under another feature schema
    fn load(&self, version: ModelVersion) -> Result<ModelArtifactSet>;

    /// Load only the metadata of a version (no schema check).
    ///
    /// # Errors
    ///
    /// `Error::ArtifactNotFound` for an unknown version
    fn load_metadata(&self, version: ModelVersion) -> Result<ArtifactMetadata>;

    /// The active version, if any has been promoted
    ///
    /// # Errors
    ///
    /// Returns an error if the pointer cannot be read
    fn active_version(&self) -> Result<Option<ModelVersion>>;

    /// Atomically point the active pointer at `version`.
    ///
    /// # Errors
    ///
    /// `Error::ArtifactNotFound` if the version was never written
    fn activate(&self, version: ModelVersion) -> Result<()>;

    /// Copy `version` under `key`. Backups are never deleted.
    ///
    /// # Errors
    ///
    /// `Error::ArtifactNotFound` if the version was never written
    fn backup(&self, version: ModelVersion, key: &str) -> Result<()>;

    /// All backup keys, ascending
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed
    fn backups(&self) -> Result<Vec<String>>;

    /// Load the active version, if any.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load)
    fn load_active(&self) -> Result<Option<ModelArtifactSet>> {
        self.active_version()?.map(|v| self.load(v)).transpose()
    }
}
