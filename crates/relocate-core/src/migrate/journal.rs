//! On-disk progress record for interrupted moves.
//!
//! One JSON file per resource under `<state_dir>/journal/`, written after each
//! stage and removed once the move completes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MigrationStage;
use crate::clone::ClonedResource;
use crate::error::{MigrationError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub resource_uuid: String,
    pub resource_name: String,
    pub source_host: String,
    pub target_host: String,
    pub stage: MigrationStage,
    #[serde(default)]
    pub clone: Option<ClonedResource>,
    /// Source volume names already copied.
    #[serde(default)]
    pub transferred: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new(
        resource_uuid: impl Into<String>,
        resource_name: impl Into<String>,
        source_host: impl Into<String>,
        target_host: impl Into<String>,
    ) -> Self {
        Self {
            resource_uuid: resource_uuid.into(),
            resource_name: resource_name.into(),
            source_host: source_host.into(),
            target_host: target_host.into(),
            stage: MigrationStage::Located,
            clone: None,
            transferred: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn reached(&self, stage: MigrationStage) -> bool {
        self.stage >= stage
    }

    pub fn is_transferred(&self, volume: &str) -> bool {
        self.transferred.iter().any(|v| v == volume)
    }
}

#[derive(Debug, Clone)]
pub struct JournalStore {
    dir: PathBuf,
}

impl JournalStore {
    /// Journal rooted at `<state_dir>/journal`.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: state_dir.as_ref().join("journal"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, resource_uuid: &str) -> PathBuf {
        self.dir.join(format!("{resource_uuid}.json"))
    }

    /// The entry for `resource_uuid`, or `None` if no move is in progress.
    pub fn load(&self, resource_uuid: &str) -> Result<Option<JournalEntry>> {
        let path = self.path_for(resource_uuid);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            MigrationError::Journal(format!("failed to read {}: {e}", path.display()))
        })?;
        let entry = serde_json::from_slice(&bytes).map_err(|e| {
            MigrationError::Journal(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(entry))
    }

    /// Write atomically through a temporary file.
    pub fn save(&self, entry: &JournalEntry) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            MigrationError::Journal(format!("failed to create {}: {e}", self.dir.display()))
        })?;
        let path = self.path_for(&entry.resource_uuid);
        let tmp_path = self
            .dir
            .join(format!("{}.json.{}.tmp", entry.resource_uuid, std::process::id()));

        let bytes = serde_json::to_vec_pretty(entry)
            .map_err(|e| MigrationError::Journal(format!("failed to serialize entry: {e}")))?;
        fs::write(&tmp_path, bytes).map_err(|e| {
            MigrationError::Journal(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            MigrationError::Journal(format!("failed to replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    pub fn remove(&self, resource_uuid: &str) -> Result<()> {
        let path = self.path_for(resource_uuid);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MigrationError::Journal(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_entry_loads_as_none() {
        let temp = TempDir::new().unwrap();
        let store = JournalStore::new(temp.path());
        assert!(store.load("abc").unwrap().is_none());
        store.remove("abc").unwrap();
    }

    #[test]
    fn save_then_load_keeps_progress() {
        let temp = TempDir::new().unwrap();
        let store = JournalStore::new(temp.path());
        let mut entry = JournalEntry::new("abc", "app", "h1", "h2");
        entry.stage = MigrationStage::Cloned;
        entry.transferred.push("abc_data".into());
        store.save(&entry).unwrap();

        let loaded = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert!(loaded.reached(MigrationStage::SourceStopped));
        assert!(!loaded.reached(MigrationStage::VolumesTransferred));
        assert!(loaded.is_transferred("abc_data"));

        store.remove("abc").unwrap();
        assert!(!store.path_for("abc").exists());
    }

    #[test]
    fn corrupt_entry_is_a_journal_error() {
        let temp = TempDir::new().unwrap();
        let store = JournalStore::new(temp.path());
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path_for("abc"), "{not json").unwrap();
        assert!(matches!(store.load("abc"), Err(MigrationError::Journal(_))));
    }
}
