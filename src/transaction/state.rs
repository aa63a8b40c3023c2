// ============================================================================
// Transaction State Management
// ============================================================================
//
// Implements the State Pattern for transaction lifecycle management.
// Each transaction moves through defined states: Active -> Committed/Aborted
//
// While active, a transaction owns:
// - a redo log of buffered changes, invisible to other connections
// - a stack of savepoints, each remembering a position in that log
//
// ============================================================================

use super::Change;
use crate::core::{DbError, Result};
use crate::entity::ReservationId;
use crate::storage::ReservationRow;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Handle to a nested scope inside an ambient transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
    transaction_id: TransactionId,
}

impl Savepoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

#[derive(Debug)]
struct SavepointMark {
    name: String,
    log_position: usize,
}

/// An ambient transaction with buffered writes
///
/// # Thread Safety
/// This structure is designed to be used from a single connection.
/// The TransactionManager handles synchronization across connections.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,

    /// Redo log (Command Pattern)
    changes: Vec<Change>,

    /// Open savepoints, innermost last
    savepoints: Vec<SavepointMark>,
    savepoint_seq: u32,

    start_time: std::time::Instant,
    started_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            changes: Vec::new(),
            savepoints: Vec::new(),
            savepoint_seq: 0,
            start_time: std::time::Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Number of savepoints currently open
    pub fn savepoint_depth(&self) -> usize {
        self.savepoints.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn ensure_active(&self, action: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::TransactionNotActive(format!(
                "{} (cannot {}: transaction is {})",
                self.id, action, self.state
            )));
        }
        Ok(())
    }

    /// Record a change in this transaction
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_change(&mut self, change: Change) -> Result<()> {
        self.ensure_active("record change")?;
        self.changes.push(change);
        Ok(())
    }

    /// Open a nested scope at the current end of the redo log
    pub fn create_savepoint(&mut self) -> Result<Savepoint> {
        self.ensure_active("create savepoint")?;

        self.savepoint_seq += 1;
        let name = format!("sp_{}", self.savepoint_seq);
        self.savepoints.push(SavepointMark {
            name: name.clone(),
            log_position: self.changes.len(),
        });

        Ok(Savepoint {
            name,
            transaction_id: self.id,
        })
    }

    fn savepoint_index(&self, savepoint: &Savepoint) -> Result<usize> {
        if savepoint.transaction_id != self.id {
            return Err(DbError::SavepointNotFound(format!(
                "{} belongs to {}, not {}",
                savepoint.name, savepoint.transaction_id, self.id
            )));
        }
        self.savepoints
            .iter()
            .rposition(|mark| mark.name == savepoint.name)
            .ok_or_else(|| DbError::SavepointNotFound(savepoint.name.clone()))
    }

    /// Merge a nested scope into its parent
    ///
    /// Savepoints opened after `savepoint` are released with it; their
    /// changes stay in the log.
    pub fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.ensure_active("release savepoint")?;
        let index = self.savepoint_index(savepoint)?;
        self.savepoints.truncate(index);
        Ok(())
    }

    /// Undo everything recorded since `savepoint` and close the scope
    ///
    /// Returns the number of discarded changes. Savepoints opened after
    /// `savepoint` are discarded too.
    pub fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<usize> {
        self.ensure_active("roll back to savepoint")?;
        let index = self.savepoint_index(savepoint)?;

        let position = self.savepoints[index].log_position;
        let discarded = self.changes.len() - position;
        self.changes.truncate(position);
        self.savepoints.truncate(index);
        Ok(discarded)
    }

    /// Latest image of a row written by this transaction, if any
    pub fn find_row(&self, id: ReservationId) -> Option<&ReservationRow> {
        self.changes
            .iter()
            .rev()
            .find(|change| change.row_id() == id)
            .map(Change::row)
    }

    /// Replay the redo log over committed rows
    pub fn overlay(&self, committed: Vec<ReservationRow>) -> Vec<ReservationRow> {
        let mut view: BTreeMap<ReservationId, ReservationRow> =
            committed.into_iter().map(|row| (row.id, row)).collect();
        for change in &self.changes {
            view.insert(change.row_id(), change.row().clone());
        }
        view.into_values().collect()
    }

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active("commit")?;
        self.savepoints.clear();
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active("rollback")?;
        self.changes.clear();
        self.savepoints.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(id: i64, name: &str) -> Change {
        Change::Insert {
            row: ReservationRow::new(ReservationId::new(id), Some(name.to_string())),
        }
    }

    fn update(id: i64, name: &str) -> Change {
        Change::Update {
            row: ReservationRow::new(ReservationId::new(id), Some(name.to_string())),
        }
    }

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = Transaction::new(TransactionId::new());

        assert_eq!(txn.state(), TransactionState::Active);
        assert!(txn.state().is_active());
        assert!(!txn.state().is_terminal());

        txn.commit().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.state().is_terminal());
    }

    #[test]
    fn test_cannot_commit_twice() {
        let mut txn = Transaction::new(TransactionId::new());

        txn.commit().unwrap();
        assert!(txn.commit().is_err());
    }

    #[test]
    fn test_rollback_clears_changes() {
        let mut txn = Transaction::new(TransactionId::new());

        txn.record_change(insert(1, "foo")).unwrap();
        assert_eq!(txn.change_count(), 1);

        txn.rollback().unwrap();
        assert_eq!(txn.change_count(), 0);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_cannot_record_change_after_commit() {
        let mut txn = Transaction::new(TransactionId::new());
        txn.commit().unwrap();
        assert!(txn.record_change(insert(1, "foo")).is_err());
    }

    #[test]
    fn test_rollback_to_savepoint_keeps_earlier_changes() {
        let mut txn = Transaction::new(TransactionId::new());
        txn.record_change(insert(1, "kept")).unwrap();

        let sp = txn.create_savepoint().unwrap();
        txn.record_change(insert(2, "discarded")).unwrap();
        txn.record_change(update(1, "discarded")).unwrap();

        assert_eq!(txn.rollback_to_savepoint(&sp).unwrap(), 2);
        assert_eq!(txn.change_count(), 1);
        assert_eq!(txn.savepoint_depth(), 0);
        assert_eq!(
            txn.find_row(ReservationId::new(1)).unwrap().name.as_deref(),
            Some("kept")
        );
        assert!(txn.find_row(ReservationId::new(2)).is_none());
    }

    #[test]
    fn test_release_merges_into_parent() {
        let mut txn = Transaction::new(TransactionId::new());
        let outer = txn.create_savepoint().unwrap();
        txn.record_change(insert(1, "a")).unwrap();

        let inner = txn.create_savepoint().unwrap();
        txn.record_change(insert(2, "b")).unwrap();
        txn.release_savepoint(&inner).unwrap();
        assert_eq!(txn.savepoint_depth(), 1);

        // rolling back the outer scope also undoes the released inner one
        assert_eq!(txn.rollback_to_savepoint(&outer).unwrap(), 2);
        assert_eq!(txn.change_count(), 0);
    }

    #[test]
    fn test_nested_rollback_discards_inner_savepoints() {
        let mut txn = Transaction::new(TransactionId::new());
        let outer = txn.create_savepoint().unwrap();
        let inner = txn.create_savepoint().unwrap();
        assert_ne!(outer.name(), inner.name());

        txn.rollback_to_savepoint(&outer).unwrap();
        assert!(matches!(
            txn.release_savepoint(&inner),
            Err(DbError::SavepointNotFound(_))
        ));
    }

    #[test]
    fn test_savepoint_of_other_transaction_is_rejected() {
        let mut first = Transaction::new(TransactionId::new());
        let mut second = Transaction::new(TransactionId::new());

        let sp = first.create_savepoint().unwrap();
        second.create_savepoint().unwrap();
        assert!(matches!(
            second.rollback_to_savepoint(&sp),
            Err(DbError::SavepointNotFound(_))
        ));
    }

    #[test]
    fn test_overlay_applies_changes_in_order() {
        let mut txn = Transaction::new(TransactionId::new());
        txn.record_change(update(1, "updated")).unwrap();
        txn.record_change(insert(3, "new")).unwrap();

        let committed = vec![
            ReservationRow::new(ReservationId::new(1), Some("old".into())),
            ReservationRow::new(ReservationId::new(2), None),
        ];
        let view = txn.overlay(committed);

        let names: Vec<Option<&str>> = view.iter().map(|r| r.name.as_deref()).collect();
        assert_eq!(names, vec![Some("updated"), None, Some("new")]);
    }
}
