// ============================================================================
// Reservation Record Store
// ============================================================================
//
// `ReservationDao` is the seam between the upsert coordinator and storage.
// Every operation runs in the transaction scope of the connection it is
// handed; the DAO itself is stateless.
//
// ============================================================================

mod table;

pub use table::TableReservationDao;

use crate::connection::Connection;
use crate::core::Result;
use crate::entity::{Reservation, ReservationId};
use async_trait::async_trait;

#[async_trait]
pub trait ReservationDao: Send + Sync {
    /// `Ok(None)` when no row carries `id`
    async fn select_by_id(&self, conn: &Connection, id: ReservationId) -> Result<Option<Reservation>>;

    /// Every row, ordered by name (NULL first) then id
    async fn select_all(&self, conn: &Connection) -> Result<Vec<Reservation>>;

    /// Insert the reservation and write the assigned id back into it
    ///
    /// Returns the number of affected rows (1).
    async fn insert(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64>;

    /// Update the row matching `reservation.id()`
    ///
    /// Returns 1 if a row matched, 0 otherwise (including a reservation that
    /// has no id yet).
    async fn update(&self, conn: &mut Connection, reservation: &Reservation) -> Result<u64>;
}
