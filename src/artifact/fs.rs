//! Directory-backed artifact store
//!
//! ```text
//! models/ACTIVE                                  "v000003"
//! models/versions/v000003/{forest,network,scaler,vocabulary,metadata}.json
//! models/backups/20240307_090501-v000002/...
//! ```
//!
//! Version and backup directories are assembled under a dot-prefixed temp
//! name and renamed into place; `ACTIVE` is replaced the same way. A reader
//! therefore sees either the old or the new state, never a partial one.

use super::{ArtifactMetadata, ArtifactStore, ModelArtifactSet, ModelVersion};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const ACTIVE_FILE: &str = "ACTIVE";
const FOREST_FILE: &str = "forest.json";
const NETWORK_FILE: &str = "network.json";
const SCALER_FILE: &str = "scaler.json";
const VOCABULARY_FILE: &str = "vocabulary.json";
const METADATA_FILE: &str = "metadata.json";
const PARTS: [&str; 5] = [FOREST_FILE, NETWORK_FILE, SCALER_FILE, VOCABULARY_FILE, METADATA_FILE];

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    write_synced(&dir.join(name), &serde_json::to_vec_pretty(value)?)
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let bytes = fs::read(&path).map_err(|e| Error::Artifact(format!("{}: {e}", path.display())))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Fill a temp directory with `fill`, then rename it to `target`.
fn publish_dir(target: &Path, fill: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::Artifact(format!("{} has no parent", target.display())))?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Artifact(format!("{} has no name", target.display())))?;
    let staging = parent.join(format!(".{name}.tmp"));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = fill(&staging).and_then(|()| {
        sync_dir(&staging)?;
        fs::rename(&staging, target)?;
        sync_dir(parent)
    });
    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
    }
    result
}

fn list_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// [`ArtifactStore`] rooted at a models directory.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (creating as needed) a store under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("versions"))?;
        fs::create_dir_all(root.join("backups"))?;
        Ok(Self { root })
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, version: ModelVersion) -> PathBuf {
        self.root.join("versions").join(version.to_string())
    }

    fn existing_version_dir(&self, version: ModelVersion) -> Result<PathBuf> {
        let dir = self.version_dir(version);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(Error::ArtifactNotFound(version.to_string()))
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn versions(&self) -> Result<Vec<ModelVersion>> {
        let mut versions: Vec<ModelVersion> = list_names(&self.root.join("versions"))?
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn write_version(&self, set: &ModelArtifactSet) -> Result<()> {
        let target = self.version_dir(set.version());
        if target.exists() {
            return Err(Error::Artifact(format!(
                "{} already exists; versions are immutable",
                set.version()
            )));
        }
        let model = set.model();
        publish_dir(&target, |dir| {
            write_json(dir, FOREST_FILE, model.forest())?;
            write_json(dir, NETWORK_FILE, model.network())?;
            write_json(dir, SCALER_FILE, model.scaler())?;
            write_json(dir, VOCABULARY_FILE, model.encoder())?;
            write_json(dir, METADATA_FILE, set.metadata())
        })?;
        tracing::debug!(version = %set.version(), dir = %target.display(), "artifact set written");
        Ok(())
    }

    fn load(&self, version: ModelVersion) -> Result<ModelArtifactSet> {
        let dir = self.existing_version_dir(version)?;
        ModelArtifactSet::from_parts(
            read_json(&dir, METADATA_FILE)?,
            read_json(&dir, VOCABULARY_FILE)?,
            read_json(&dir, SCALER_FILE)?,
            read_json(&dir, FOREST_FILE)?,
            read_json(&dir, NETWORK_FILE)?,
        )
    }

    fn load_metadata(&self, version: ModelVersion) -> Result<ArtifactMetadata> {
        read_json(&self.existing_version_dir(version)?, METADATA_FILE)
    }

    fn active_version(&self) -> Result<Option<ModelVersion>> {
        let path = self.root.join(ACTIVE_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => contents.parse().map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn activate(&self, version: ModelVersion) -> Result<()> {
        self.existing_version_dir(version)?;
        let tmp = self.root.join(format!("{ACTIVE_FILE}.tmp"));
        write_synced(&tmp, format!("{version}\n").as_bytes())?;
        fs::rename(&tmp, self.root.join(ACTIVE_FILE))?;
        sync_dir(&self.root)
    }

    fn backup(&self, version: ModelVersion, key: &str) -> Result<()> {
        let source = self.existing_version_dir(version)?;
        let target = self.root.join("backups").join(key);
        if target.exists() {
            return Ok(());
        }
        publish_dir(&target, |dir| {
            for part in PARTS {
                fs::copy(source.join(part), dir.join(part))?;
            }
            Ok(())
        })?;
        tracing::info!(%version, key, "previous artifact set backed up");
        Ok(())
    }

    fn backups(&self) -> Result<Vec<String>> {
        list_names(&self.root.join("backups"))
    }
}
