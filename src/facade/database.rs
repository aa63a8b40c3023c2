use crate::connection::Connection;
use crate::connection::config::StoreConfig;
use crate::core::{DbError, Result};
use crate::storage::{DatabaseSnapshot, DurabilityMode, InMemoryStorage, SnapshotManager};
use crate::transaction::TransactionManager;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Shared handle to one reservation store
///
/// Cloning is cheap; all clones see the same committed rows and the same
/// transaction manager. Hand each request its own `Connection`.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: StoreConfig,
    storage: InMemoryStorage,
    transactions: TransactionManager,
    snapshots: Option<SnapshotManager>,
    /// Serializes checkpoints so two commits never race on the snapshot file
    checkpoint_lock: Mutex<()>,
    checkpoint_failures: AtomicU64,
    next_connection_id: AtomicU64,
}

/// Point-in-time counters of a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub row_count: usize,
    pub active_transactions: usize,
    pub commits: u64,
    pub rollbacks: u64,
    pub next_identity: i64,
    /// On-commit checkpoints that could not be written
    pub checkpoint_failures: u64,
}

impl Database {
    /// Create an empty store
    ///
    /// A configured snapshot path is only written to, never read; use
    /// [`Database::open`] to restore previous contents.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let storage = InMemoryStorage::new(config.identity_start);
        Ok(Self::assemble(config, storage))
    }

    /// Memory-only store with default configuration
    pub fn in_memory() -> Self {
        let config = StoreConfig::default();
        let storage = InMemoryStorage::new(config.identity_start);
        Self::assemble(config, storage)
    }

    /// Create a store, restoring the last checkpoint when one exists
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let restored = match &config.snapshot_path {
            Some(path) => SnapshotManager::new(path).load()?,
            None => None,
        };

        let storage = match restored {
            Some(snapshot) => {
                info!(
                    "Restored {} reservation(s) into '{}' from snapshot taken at {}",
                    snapshot.metadata.row_count, config.database, snapshot.metadata.created_at
                );
                let next_identity = snapshot.next_identity.max(config.identity_start);
                InMemoryStorage::from_table(snapshot.table, next_identity)
            }
            None => InMemoryStorage::new(config.identity_start),
        };

        Ok(Self::assemble(config, storage))
    }

    fn assemble(config: StoreConfig, storage: InMemoryStorage) -> Self {
        let snapshots = config.snapshot_path.as_ref().map(SnapshotManager::new);
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                storage,
                transactions: TransactionManager::new(),
                snapshots,
                checkpoint_lock: Mutex::new(()),
                checkpoint_failures: AtomicU64::new(0),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new connection
    pub fn connect(&self) -> Connection {
        let id = self.inner.next_connection_id.fetch_add(1, Ordering::SeqCst);
        Connection::new(id, self.clone())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub(crate) fn storage(&self) -> &InMemoryStorage {
        &self.inner.storage
    }

    pub(crate) fn transactions(&self) -> &TransactionManager {
        &self.inner.transactions
    }

    /// Write the committed state to the configured snapshot path
    pub async fn checkpoint(&self) -> Result<()> {
        let snapshots = self.inner.snapshots.as_ref().ok_or_else(|| {
            DbError::ConfigError(format!(
                "database '{}' has no snapshot path configured",
                self.inner.config.database
            ))
        })?;

        let _guard = self.inner.checkpoint_lock.lock().await;
        let table = self.inner.storage.table_snapshot().await;
        let next_identity = self.inner.storage.sequence().peek();
        snapshots.save(&DatabaseSnapshot::new(table, next_identity))
    }

    /// Checkpoint after a write has reached storage, when configured to
    ///
    /// The write already happened, so a failed checkpoint is logged and
    /// counted in `StoreStats::checkpoint_failures` rather than returned.
    pub(crate) async fn after_commit(&self) {
        if self.inner.config.durability != DurabilityMode::OnCommit {
            return;
        }
        if let Err(err) = self.checkpoint().await {
            self.inner.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Checkpoint of '{}' after commit failed: {}",
                self.inner.config.database, err
            );
        }
    }

    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            row_count: self.inner.storage.row_count().await,
            active_transactions: self.inner.transactions.active_count().await,
            commits: self.inner.transactions.commit_count(),
            rollbacks: self.inner.transactions.rollback_count(),
            next_identity: self.inner.storage.sequence().peek(),
            checkpoint_failures: self.inner.checkpoint_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_get_distinct_ids() {
        let db = Database::in_memory();
        let first = db.connect();
        let second = db.connect();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_identity_start_is_honoured() {
        let db = Database::new(StoreConfig::new("test").identity_start(100)).unwrap();
        let mut conn = db.connect();

        let id = conn.insert_row(None, Some("foo".into())).await.unwrap();
        assert_eq!(id.value(), 100);
        assert_eq!(db.stats().await.next_identity, 101);
    }

    #[tokio::test]
    async fn test_checkpoint_without_path_fails() {
        let db = Database::in_memory();
        assert!(matches!(db.checkpoint().await, Err(DbError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_stats_track_transactions() {
        let db = Database::in_memory();
        let mut conn = db.connect();

        conn.begin().await.unwrap();
        conn.insert_row(None, Some("foo".into())).await.unwrap();
        assert_eq!(db.stats().await.active_transactions, 1);
        conn.commit().await.unwrap();

        conn.begin().await.unwrap();
        conn.rollback().await.unwrap();

        let stats = db.stats().await;
        assert_eq!(stats.row_count, 1);
        assert_eq!(stats.active_transactions, 0);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.rollbacks, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = StoreConfig::new("test").durability(DurabilityMode::OnCommit);
        assert!(Database::new(config).is_err());
    }
}
