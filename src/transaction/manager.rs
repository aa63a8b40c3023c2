// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Change, Savepoint, Transaction, TransactionId, TransactionState};
use crate::core::{DbError, Result};
use crate::entity::ReservationId;
use crate::storage::{InMemoryStorage, ReservationRow};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{Level, event};

pub struct TransactionManager {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(txn_id: TransactionId) -> DbError {
    DbError::TransactionNotActive(format!("{} not found", txn_id))
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    pub async fn begin(&self) -> TransactionId {
        let transaction_id = TransactionId::new();
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction_id, Transaction::new(transaction_id));

        event!(Level::DEBUG, txn = %transaction_id, "transaction started");
        transaction_id
    }

    pub async fn savepoint(&self, txn_id: TransactionId) -> Result<Savepoint> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions.get_mut(&txn_id).ok_or_else(|| not_found(txn_id))?;
        let savepoint = transaction.create_savepoint()?;

        event!(Level::DEBUG, txn = %txn_id, savepoint = savepoint.name(), "savepoint created");
        Ok(savepoint)
    }

    pub async fn release_savepoint(&self, savepoint: &Savepoint) -> Result<()> {
        let txn_id = savepoint.transaction_id();
        let mut transactions = self.transactions.write().await;
        let transaction = transactions.get_mut(&txn_id).ok_or_else(|| not_found(txn_id))?;
        transaction.release_savepoint(savepoint)?;

        event!(Level::DEBUG, txn = %txn_id, savepoint = savepoint.name(), "savepoint released");
        Ok(())
    }

    /// Returns the number of changes discarded
    pub async fn rollback_to_savepoint(&self, savepoint: &Savepoint) -> Result<usize> {
        let txn_id = savepoint.transaction_id();
        let mut transactions = self.transactions.write().await;
        let transaction = transactions.get_mut(&txn_id).ok_or_else(|| not_found(txn_id))?;
        let discarded = transaction.rollback_to_savepoint(savepoint)?;

        event!(
            Level::DEBUG,
            txn = %txn_id,
            savepoint = savepoint.name(),
            discarded,
            "rolled back to savepoint"
        );
        Ok(discarded)
    }

    pub async fn record_change(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions.get_mut(&txn_id).ok_or_else(|| not_found(txn_id))?;
        transaction.record_change(change)
    }

    /// Row as seen from inside the transaction: own writes first, then committed data
    pub async fn visible_row(
        &self,
        txn_id: TransactionId,
        storage: &InMemoryStorage,
        id: ReservationId,
    ) -> Result<Option<ReservationRow>> {
        {
            let transactions = self.transactions.read().await;
            let transaction = transactions.get(&txn_id).ok_or_else(|| not_found(txn_id))?;
            if let Some(row) = transaction.find_row(id) {
                return Ok(Some(row.clone()));
            }
        }
        Ok(storage.get_row(id).await)
    }

    /// All rows as seen from inside the transaction, in key order
    pub async fn visible_rows(
        &self,
        txn_id: TransactionId,
        storage: &InMemoryStorage,
    ) -> Result<Vec<ReservationRow>> {
        let committed = storage.scan().await;
        let transactions = self.transactions.read().await;
        let transaction = transactions.get(&txn_id).ok_or_else(|| not_found(txn_id))?;
        Ok(transaction.overlay(committed))
    }

    /// Apply the redo log to storage and finish the transaction
    ///
    /// If storage rejects the log (for example a concurrently committed row
    /// took one of the explicit keys) nothing is applied and the transaction
    /// ends as aborted.
    pub async fn commit(&self, txn_id: TransactionId, storage: &InMemoryStorage) -> Result<usize> {
        let mut transaction = {
            let mut transactions = self.transactions.write().await;
            transactions.remove(&txn_id).ok_or_else(|| not_found(txn_id))?
        };

        if transaction.state() != TransactionState::Active {
            return Err(DbError::TransactionNotActive(txn_id.to_string()));
        }

        let applied = transaction.change_count();
        if let Err(err) = storage.apply(transaction.changes()).await {
            transaction.rollback()?;
            self.rollbacks.fetch_add(1, Ordering::Relaxed);
            event!(Level::WARN, txn = %txn_id, error = %err, "commit failed, transaction aborted");
            return Err(err);
        }

        transaction.commit()?;
        self.commits.fetch_add(1, Ordering::Relaxed);
        event!(Level::DEBUG, txn = %txn_id, applied, "transaction committed");
        Ok(applied)
    }

    pub async fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut transaction = {
            let mut transactions = self.transactions.write().await;
            transactions.remove(&txn_id).ok_or_else(|| not_found(txn_id))?
        };

        transaction.rollback()?;
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        event!(Level::DEBUG, txn = %txn_id, "transaction rolled back");
        Ok(())
    }

    pub async fn is_active(&self, txn_id: TransactionId) -> bool {
        let transactions = self.transactions.read().await;
        transactions
            .get(&txn_id)
            .is_some_and(|txn| txn.state().is_active())
    }

    pub async fn active_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn rollback_count(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub async fn get_transaction_info(&self, txn_id: TransactionId) -> Option<TransactionInfo> {
        let transactions = self.transactions.read().await;
        transactions.get(&txn_id).map(|txn| TransactionInfo {
            id: txn.id(),
            state: txn.state(),
            change_count: txn.change_count(),
            savepoint_depth: txn.savepoint_depth(),
            started_at: txn.started_at(),
            duration: txn.duration(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub change_count: usize,
    pub savepoint_depth: usize,
    pub started_at: DateTime<Utc>,
    pub duration: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(id: i64, name: &str) -> Change {
        Change::Insert {
            row: ReservationRow::new(ReservationId::new(id), Some(name.to_string())),
        }
    }

    #[tokio::test]
    async fn test_begin_and_commit() {
        let tm = TransactionManager::new();
        let storage = InMemoryStorage::default();

        let txn = tm.begin().await;
        assert!(tm.is_active(txn).await);

        tm.record_change(txn, insert(1, "foo")).await.unwrap();
        assert_eq!(storage.row_count().await, 0);

        assert_eq!(tm.commit(txn, &storage).await.unwrap(), 1);
        assert!(!tm.is_active(txn).await);
        assert_eq!(storage.row_count().await, 1);
        assert_eq!(tm.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let tm = TransactionManager::new();
        let storage = InMemoryStorage::default();

        let txn = tm.begin().await;
        tm.record_change(txn, insert(1, "foo")).await.unwrap();
        tm.rollback(txn).await.unwrap();

        assert_eq!(storage.row_count().await, 0);
        assert_eq!(tm.active_count().await, 0);
        assert_eq!(tm.rollback_count(), 1);
        assert!(tm.rollback(txn).await.is_err());
    }

    #[tokio::test]
    async fn test_visible_rows_include_own_writes_only() {
        let tm = TransactionManager::new();
        let storage = InMemoryStorage::default();

        let mine = tm.begin().await;
        let other = tm.begin().await;
        tm.record_change(mine, insert(1, "foo")).await.unwrap();

        assert_eq!(tm.visible_rows(mine, &storage).await.unwrap().len(), 1);
        assert!(tm.visible_rows(other, &storage).await.unwrap().is_empty());
        assert!(
            tm.visible_row(other, &storage, ReservationId::new(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_commit_aborts() {
        let tm = TransactionManager::new();
        let storage = InMemoryStorage::default();

        let first = tm.begin().await;
        let second = tm.begin().await;
        tm.record_change(first, insert(5, "first")).await.unwrap();
        tm.record_change(second, insert(5, "second")).await.unwrap();

        tm.commit(first, &storage).await.unwrap();
        let err = tm.commit(second, &storage).await.unwrap_err();
        assert!(err.is_constraint_violation());

        assert_eq!(tm.active_count().await, 0);
        assert_eq!(
            storage.get_row(ReservationId::new(5)).await.unwrap().name.as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_savepoint_roundtrip_through_manager() {
        let tm = TransactionManager::new();
        let storage = InMemoryStorage::default();

        let txn = tm.begin().await;
        tm.record_change(txn, insert(1, "kept")).await.unwrap();

        let sp = tm.savepoint(txn).await.unwrap();
        tm.record_change(txn, insert(2, "dropped")).await.unwrap();
        assert_eq!(tm.rollback_to_savepoint(&sp).await.unwrap(), 1);

        let info = tm.get_transaction_info(txn).await.unwrap();
        assert_eq!(info.change_count, 1);
        assert_eq!(info.savepoint_depth, 0);

        tm.commit(txn, &storage).await.unwrap();
        assert_eq!(storage.row_count().await, 1);
    }

    #[tokio::test]
    async fn test_savepoint_on_unknown_transaction() {
        let tm = TransactionManager::new();
        let err = tm.savepoint(TransactionId::new()).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionNotActive(_)));
    }
}
