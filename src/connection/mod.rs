pub mod config;

use crate::core::{DbError, Result};
use crate::entity::ReservationId;
use crate::facade::Database;
use crate::storage::ReservationRow;
use crate::transaction::{Change, Savepoint, TransactionId};
use log::{debug, warn};

/// Database connection handle
///
/// A connection is the explicit transaction scope callers pass around.
/// Without `begin()` every write is its own auto-committed statement; after
/// `begin()` writes are buffered in the ambient transaction until `commit()`,
/// and `savepoint()` opens nested scopes inside it.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Shared database handle
    db: Database,
    /// Connection state
    state: ConnectionState,
    /// Ambient transaction (if any)
    transaction_id: Option<TransactionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
    Closed,
}

impl Connection {
    pub(crate) fn new(id: u64, db: Database) -> Self {
        Self {
            id,
            db,
            state: ConnectionState::Active,
            transaction_id: None,
        }
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Ambient transaction ID, if a transaction is open
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(DbError::ConnectionClosed(self.id));
        }
        Ok(())
    }

    fn ambient(&self, action: &str) -> Result<TransactionId> {
        self.ensure_open()?;
        self.transaction_id.ok_or_else(|| {
            DbError::NoActiveTransaction(format!(
                "cannot {} on connection {} outside a transaction",
                action, self.id
            ))
        })
    }

    /// Begin the ambient transaction
    ///
    /// # Examples
    ///
    /// ```
    /// # use reservadb::Database;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::in_memory();
    /// let mut conn = db.connect();
    ///
    /// conn.begin().await?;
    /// conn.insert_row(None, Some("Alice".into())).await?;
    /// conn.commit().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.state == ConnectionState::InTransaction {
            return Err(DbError::ExecutionError("Transaction already active".into()));
        }

        let txn_id = self.db.transactions().begin().await;
        self.state = ConnectionState::InTransaction;
        self.transaction_id = Some(txn_id);

        debug!("Connection {} began {}", self.id, txn_id);
        Ok(())
    }

    /// Commit the ambient transaction
    ///
    /// The connection leaves the transaction even when the commit fails; in
    /// that case nothing was applied.
    pub async fn commit(&mut self) -> Result<()> {
        let txn_id = self.ambient("commit")?;
        self.state = ConnectionState::Active;
        self.transaction_id = None;

        let applied = self.db.transactions().commit(txn_id, self.db.storage()).await?;
        debug!("Connection {} committed {} ({} change(s))", self.id, txn_id, applied);

        if applied > 0 {
            self.db.after_commit().await;
        }
        Ok(())
    }

    /// Roll back the ambient transaction
    pub async fn rollback(&mut self) -> Result<()> {
        let txn_id = self.ambient("rollback")?;
        self.state = ConnectionState::Active;
        self.transaction_id = None;

        self.db.transactions().rollback(txn_id).await?;
        debug!("Connection {} rolled back {}", self.id, txn_id);
        Ok(())
    }

    /// Open a nested scope inside the ambient transaction
    ///
    /// Fails fast with `NoActiveTransaction` when no ambient transaction is
    /// open: a nested scope never silently becomes a top-level transaction.
    pub async fn savepoint(&mut self) -> Result<Savepoint> {
        let txn_id = self.ambient("open a savepoint")?;
        self.db.transactions().savepoint(txn_id).await
    }

    fn check_owner(&self, txn_id: TransactionId, savepoint: &Savepoint) -> Result<()> {
        if savepoint.transaction_id() != txn_id {
            return Err(DbError::SavepointNotFound(format!(
                "{} does not belong to connection {}",
                savepoint.name(),
                self.id
            )));
        }
        Ok(())
    }

    /// Keep the nested scope's changes as part of the ambient transaction
    pub async fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        let txn_id = self.ambient("release a savepoint")?;
        self.check_owner(txn_id, savepoint)?;
        self.db.transactions().release_savepoint(savepoint).await
    }

    /// Undo the nested scope, leaving earlier work of the ambient transaction intact
    pub async fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        let txn_id = self.ambient("roll back to a savepoint")?;
        self.check_owner(txn_id, savepoint)?;
        let discarded = self.db.transactions().rollback_to_savepoint(savepoint).await?;
        debug!(
            "Connection {} rolled back to {} ({} change(s) discarded)",
            self.id,
            savepoint.name(),
            discarded
        );
        Ok(())
    }

    /// Check if connection is in a transaction
    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Close the connection, rolling back an open transaction
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::InTransaction {
            self.rollback().await?;
        }

        self.state = ConnectionState::Closed;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Row access
    // ------------------------------------------------------------------------

    /// Insert a row, drawing the key from the identity sequence when `id` is `None`
    ///
    /// # Errors
    /// `ConstraintViolation` when the key is already visible to this connection
    pub async fn insert_row(
        &mut self,
        id: Option<ReservationId>,
        name: Option<String>,
    ) -> Result<ReservationId> {
        self.ensure_open()?;
        let storage = self.db.storage();
        let explicit = id.is_some();
        let id = id.unwrap_or_else(|| storage.sequence().next_id());
        let row = ReservationRow::new(id, name);

        match self.transaction_id {
            Some(txn_id) => {
                let transactions = self.db.transactions();
                if transactions.visible_row(txn_id, storage, id).await?.is_some() {
                    return Err(DbError::ConstraintViolation(format!(
                        "Primary key violation: id {} already exists",
                        id.value()
                    )));
                }
                transactions.record_change(txn_id, Change::Insert { row }).await?;
            }
            None => {
                storage.insert_row(row).await?;
                self.db.after_commit().await;
            }
        }

        // an accepted explicit key is never handed out again
        if explicit {
            storage.sequence().advance_past(id.value());
        }

        debug!("Connection {} inserted row {}", self.id, id.value());
        Ok(id)
    }

    /// Update the mutable columns of a row; returns the number of rows matched (0 or 1)
    pub async fn update_row(&mut self, row: ReservationRow) -> Result<u64> {
        self.ensure_open()?;
        let storage = self.db.storage();
        let id = row.id;

        let matched = match self.transaction_id {
            Some(txn_id) => {
                let transactions = self.db.transactions();
                if transactions.visible_row(txn_id, storage, id).await?.is_none() {
                    false
                } else {
                    transactions.record_change(txn_id, Change::Update { row }).await?;
                    true
                }
            }
            None => {
                let matched = storage.update_row(row).await;
                if matched {
                    self.db.after_commit().await;
                }
                matched
            }
        };

        debug!("Connection {} updated row {}: matched={}", self.id, id.value(), matched);
        Ok(u64::from(matched))
    }

    pub async fn get_row(&self, id: ReservationId) -> Result<Option<ReservationRow>> {
        self.ensure_open()?;
        let storage = self.db.storage();
        match self.transaction_id {
            Some(txn_id) => self.db.transactions().visible_row(txn_id, storage, id).await,
            None => Ok(storage.get_row(id).await),
        }
    }

    /// All visible rows in key order
    pub async fn scan_rows(&self) -> Result<Vec<ReservationRow>> {
        self.ensure_open()?;
        let storage = self.db.storage();
        match self.transaction_id {
            Some(txn_id) => self.db.transactions().visible_rows(txn_id, storage).await,
            None => Ok(storage.scan().await),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Buffered writes never reach storage without commit; this only
        // releases the transaction's bookkeeping.
        if let Some(txn_id) = self.transaction_id.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let db = self.db.clone();
                    let conn_id = self.id;
                    handle.spawn(async move {
                        if let Err(err) = db.transactions().rollback(txn_id).await {
                            warn!(
                                "Connection {} failed to roll back {} on drop: {}",
                                conn_id, txn_id, err
                            );
                        }
                    });
                }
                Err(_) => warn!(
                    "Connection {} dropped outside a runtime with {} open",
                    self.id, txn_id
                ),
            }
        }
    }
}
