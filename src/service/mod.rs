// ============================================================================
// Reservation Service
// ============================================================================
//
// Upsert coordinator on top of `ReservationDao`.
//
// - `create` inserts inside the caller's ambient scope: if it fails, what
//   happens to the rest of the transaction is the caller's decision.
// - `save` runs its insert or update inside a nested scope (savepoint), so a
//   failed save never undoes earlier work of the ambient transaction.
//
// ============================================================================

mod nested;
mod policy;

pub use policy::SavePolicy;

use crate::connection::Connection;
use crate::core::Result;
use crate::dao::ReservationDao;
use crate::entity::{Reservation, ReservationId};
use nested::finish_scope;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

pub struct ReservationService<D: ReservationDao + ?Sized = dyn ReservationDao> {
    dao: Arc<D>,
    policy: SavePolicy,
}

impl<D: ReservationDao + ?Sized> Clone for ReservationService<D> {
    fn clone(&self) -> Self {
        Self {
            dao: Arc::clone(&self.dao),
            policy: self.policy,
        }
    }
}

impl<D: ReservationDao + ?Sized> ReservationService<D> {
    pub fn new(dao: Arc<D>, policy: SavePolicy) -> Self {
        Self { dao, policy }
    }

    pub fn policy(&self) -> SavePolicy {
        self.policy
    }

    pub fn dao(&self) -> &Arc<D> {
        &self.dao
    }

    pub async fn find_by_id(&self, conn: &Connection, id: ReservationId) -> Result<Option<Reservation>> {
        self.dao.select_by_id(conn, id).await
    }

    pub async fn find_all(&self, conn: &Connection) -> Result<Vec<Reservation>> {
        self.dao.select_all(conn).await
    }

    /// Insert in the caller's scope, without a savepoint
    pub async fn create(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64> {
        self.dao.insert(conn, reservation).await
    }

    /// Insert or update `reservation`, isolated in a nested scope
    ///
    /// Requires an ambient transaction on `conn`. Returns the affected row
    /// count: 1 for an insert, 1 or 0 for an update depending on whether the
    /// id matched a row. On insert the assigned id is written into
    /// `reservation`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use reservadb::{Database, Reservation, ReservationService, SavePolicy, TableReservationDao};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::in_memory();
    /// let service = ReservationService::new(Arc::new(TableReservationDao::new()), SavePolicy::Strict);
    ///
    /// let mut conn = db.connect();
    /// conn.begin().await?;
    ///
    /// let mut reservation = Reservation::new("foo");
    /// assert_eq!(service.save(&mut conn, &mut reservation).await?, 1);
    ///
    /// reservation.name = Some("bar".into());
    /// assert_eq!(service.save(&mut conn, &mut reservation).await?, 1);
    ///
    /// conn.commit().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn save(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64> {
        let span = info_span!(
            "reservation_save",
            policy = %self.policy,
            id = ?reservation.id().map(|id| id.value()),
            connection = conn.id()
        );

        async move {
            let affected = match self.policy {
                SavePolicy::Strict => self.save_strict(conn, reservation).await?,
                SavePolicy::InsertThenUpdate => self.save_with_fallback(conn, reservation).await?,
            };
            event!(Level::DEBUG, affected, "reservation saved");
            Ok(affected)
        }
        .instrument(span)
        .await
    }

    async fn save_strict(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64> {
        if reservation.is_new() {
            self.nested_insert(conn, reservation).await
        } else {
            self.nested_update(conn, reservation).await
        }
    }

    async fn save_with_fallback(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64> {
        match self.nested_insert(conn, reservation).await {
            Ok(affected) => Ok(affected),
            Err(err) => {
                event!(Level::WARN, error = %err, "insert failed, falling back to update");
                self.nested_update(conn, reservation).await
            }
        }
    }

    async fn nested_insert(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64> {
        let savepoint = conn.savepoint().await?;
        let outcome = self.dao.insert(conn, reservation).await;
        finish_scope(conn, savepoint, outcome).await
    }

    async fn nested_update(&self, conn: &mut Connection, reservation: &Reservation) -> Result<u64> {
        let savepoint = conn.savepoint().await?;
        let outcome = self.dao.update(conn, reservation).await;
        finish_scope(conn, savepoint, outcome).await
    }
}
