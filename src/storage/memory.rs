use super::table::{ReservationRow, ReservationTable};
use crate::core::Result;
use crate::entity::ReservationId;
use crate::transaction::Change;
use log::debug;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Identity sequence backing auto-assigned keys
///
/// Values are handed out once and never reused, even when the inserting
/// transaction rolls back.
#[derive(Debug)]
pub struct IdentitySequence {
    next: AtomicI64,
}

impl IdentitySequence {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    pub fn next_id(&self) -> ReservationId {
        ReservationId::new(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Value the next call to `next_id` will return
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Move the sequence forward so it never hands out `floor` or lower
    pub fn advance_past(&self, floor: i64) {
        self.next.fetch_max(floor.saturating_add(1), Ordering::SeqCst);
    }
}

/// Committed state of the store
pub struct InMemoryStorage {
    table: RwLock<ReservationTable>,
    sequence: IdentitySequence,
}

impl InMemoryStorage {
    pub fn new(identity_start: i64) -> Self {
        Self {
            table: RwLock::new(ReservationTable::new()),
            sequence: IdentitySequence::new(identity_start),
        }
    }

    /// Rebuild storage from restored rows
    pub fn from_table(table: ReservationTable, next_identity: i64) -> Self {
        let sequence = IdentitySequence::new(next_identity);
        if let Some(max) = table.max_id() {
            sequence.advance_past(max.value());
        }
        Self {
            table: RwLock::new(table),
            sequence,
        }
    }

    pub fn sequence(&self) -> &IdentitySequence {
        &self.sequence
    }

    pub async fn get_row(&self, id: ReservationId) -> Option<ReservationRow> {
        self.table.read().await.get(id)
    }

    pub async fn scan(&self) -> Vec<ReservationRow> {
        self.table.read().await.scan()
    }

    pub async fn row_count(&self) -> usize {
        self.table.read().await.row_count()
    }

    /// Single-statement insert outside of any transaction
    pub async fn insert_row(&self, row: ReservationRow) -> Result<()> {
        let mut table = self.table.write().await;
        table.insert(row)
    }

    /// Single-statement update outside of any transaction
    pub async fn update_row(&self, row: ReservationRow) -> bool {
        let mut table = self.table.write().await;
        table.update(row)
    }

    /// Apply a committed redo log atomically
    ///
    /// Either every change lands or none does: the whole log is validated
    /// against a scratch copy first.
    pub async fn apply(&self, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut table = self.table.write().await;
        let mut staged = table.clone();
        for change in changes {
            change.apply_to(&mut staged)?;
        }
        *table = staged;

        debug!("Applied {} change(s) to '{}'", changes.len(), table.name());
        Ok(())
    }

    /// Copy of the committed table for checkpoints
    pub async fn table_snapshot(&self) -> ReservationTable {
        self.table.read().await.clone()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(1)
    }
}
