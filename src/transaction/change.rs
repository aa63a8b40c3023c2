// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Implements the Command Pattern for buffered writes. Each Change is recorded
// in the owning transaction's redo log, replayed over committed rows for reads
// inside that transaction, and applied to storage on COMMIT. ROLLBACK (full or
// to a savepoint) simply truncates the log.
//
// ============================================================================

use crate::core::{DbError, Result};
use crate::entity::ReservationId;
use crate::storage::{ReservationRow, ReservationTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Insert a new row
    Insert { row: ReservationRow },

    /// Replace the mutable columns of an existing row
    Update { row: ReservationRow },
}

impl Change {
    /// Key of the row this change touches
    pub fn row_id(&self) -> ReservationId {
        match self {
            Change::Insert { row } | Change::Update { row } => row.id,
        }
    }

    /// Row image after this change
    pub fn row(&self) -> &ReservationRow {
        match self {
            Change::Insert { row } | Change::Update { row } => row,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Change::Insert { .. })
    }

    /// Apply this change to a table
    ///
    /// # Errors
    /// Fails on a duplicate key for inserts and on a missing row for updates
    pub fn apply_to(&self, table: &mut ReservationTable) -> Result<()> {
        match self {
            Change::Insert { row } => table.insert(row.clone()),
            Change::Update { row } => {
                if table.update(row.clone()) {
                    Ok(())
                } else {
                    Err(DbError::ExecutionError(format!(
                        "Cannot apply update: row {} vanished before commit",
                        row.id.value()
                    )))
                }
            }
        }
    }
}
