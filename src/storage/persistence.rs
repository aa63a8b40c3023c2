//! Snapshot persistence for the reservation store

use crate::core::{DbError, Result};
use crate::storage::table::ReservationTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Database Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub table: ReservationTable,
    /// Next value of the identity sequence at checkpoint time
    pub next_identity: i64,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
}

impl DatabaseSnapshot {
    pub fn new(table: ReservationTable, next_identity: i64) -> Self {
        let row_count = table.row_count();
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            table,
            next_identity,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                row_count,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// Checkpoint only when asked to
    #[default]
    None,
    /// Checkpoint after every successful commit
    OnCommit,
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write the snapshot atomically: temp file in the same directory, then rename
    pub fn save(&self, snapshot: &DatabaseSnapshot) -> Result<()> {
        let dir = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let serialized = rmp_serde::to_vec(snapshot)?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            writer.write_all(&serialized)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.snapshot_path)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<DatabaseSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let snapshot: DatabaseSnapshot = rmp_serde::from_slice(&data)?;

        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(DbError::PersistenceError(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ReservationId;
    use crate::storage::table::ReservationRow;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("reservations.snapshot"));

        let mut table = ReservationTable::new();
        table
            .insert(ReservationRow::new(ReservationId::new(1), Some("Alice".into())))
            .unwrap();
        table
            .insert(ReservationRow::new(ReservationId::new(2), None))
            .unwrap();

        manager.save(&DatabaseSnapshot::new(table, 3)).unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.metadata.row_count, 2);
        assert_eq!(loaded.next_identity, 3);
        assert_eq!(loaded.table.get(ReservationId::new(2)).unwrap().name, None);
    }

    #[test]
    fn test_load_missing_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("missing.snapshot"));
        assert!(manager.load().unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("nested/dir/store.snapshot"));

        manager.save(&DatabaseSnapshot::new(ReservationTable::new(), 1)).unwrap();

        let mut table = ReservationTable::new();
        table
            .insert(ReservationRow::new(ReservationId::new(5), Some("x".into())))
            .unwrap();
        manager.save(&DatabaseSnapshot::new(table, 6)).unwrap();

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.metadata.row_count, 1);

        manager.delete().unwrap();
        assert!(!manager.exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.snapshot");
        fs::write(&path, b"not a snapshot").unwrap();

        let err = SnapshotManager::new(&path).load().unwrap_err();
        assert!(matches!(err, DbError::PersistenceError(_)));
    }
}
