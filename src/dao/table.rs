use super::ReservationDao;
use crate::connection::Connection;
use crate::core::Result;
use crate::entity::{Reservation, ReservationId};
use crate::storage::{RESERVATION_TABLE, ReservationRow};
use async_trait::async_trait;
use log::debug;

/// `ReservationDao` over the connection's `reservation` table
#[derive(Debug, Clone, Copy, Default)]
pub struct TableReservationDao;

impl TableReservationDao {
    pub fn new() -> Self {
        Self
    }
}

fn to_entity(row: ReservationRow) -> Reservation {
    Reservation::with_id(row.id, row.name)
}

#[async_trait]
impl ReservationDao for TableReservationDao {
    async fn select_by_id(&self, conn: &Connection, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(conn.get_row(id).await?.map(to_entity))
    }

    async fn select_all(&self, conn: &Connection) -> Result<Vec<Reservation>> {
        let mut rows = conn.scan_rows().await?;
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows.into_iter().map(to_entity).collect())
    }

    async fn insert(&self, conn: &mut Connection, reservation: &mut Reservation) -> Result<u64> {
        let id = conn
            .insert_row(reservation.id(), reservation.name.clone())
            .await?;
        reservation.assign_id(id);
        Ok(1)
    }

    async fn update(&self, conn: &mut Connection, reservation: &Reservation) -> Result<u64> {
        let Some(id) = reservation.id() else {
            debug!("Skipping update of '{}' row without id", RESERVATION_TABLE);
            return Ok(0);
        };
        conn.update_row(ReservationRow::new(id, reservation.name.clone()))
            .await
    }
}
