//! In-memory artifact store using `DashMap`.
//!
//! Same promotion semantics as the filesystem store; nothing survives a
//! restart.

use super::{ArtifactMetadata, ArtifactStore, ModelArtifactSet, ModelVersion};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::{PoisonError, RwLock};

/// Volatile [`ArtifactStore`].
pub struct MemoryArtifactStore {
    versions: DashMap<ModelVersion, ModelArtifactSet>,
    backups: DashMap<String, ModelArtifactSet>,
    active: RwLock<Option<ModelVersion>>,
}

impl MemoryArtifactStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
            backups: DashMap::new(),
            active: RwLock::new(None),
        }
    }

    /// Number of stored versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn versions(&self) -> Result<Vec<ModelVersion>> {
        let mut versions: Vec<ModelVersion> = self.versions.iter().map(|e| *e.key()).collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn write_version(&self, set: &ModelArtifactSet) -> Result<()> {
        match self.versions.entry(set.version()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::Artifact(format!(
                "{} already exists; versions are immutable",
                set.version()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(set.clone());
                Ok(())
            }
        }
    }

    fn load(&self, version: ModelVersion) -> Result<ModelArtifactSet> {
        self.versions
            .get(&version)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::ArtifactNotFound(version.to_string()))
    }

    fn load_metadata(&self, version: ModelVersion) -> Result<ArtifactMetadata> {
        self.load(version).map(|set| set.metadata().clone())
    }

    fn active_version(&self) -> Result<Option<ModelVersion>> {
        Ok(*self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn activate(&self, version: ModelVersion) -> Result<()> {
        if !self.versions.contains_key(&version) {
            return Err(Error::ArtifactNotFound(version.to_string()));
        }
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(version);
        Ok(())
    }

    fn backup(&self, version: ModelVersion, key: &str) -> Result<()> {
        let set = self.load(version)?;
        self.backups.entry(key.to_string()).or_insert(set);
        Ok(())
    }

    fn backups(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.backups.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}
