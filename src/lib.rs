// ============================================================================
// ReservaDB Library
// ============================================================================
//
// Reservation record store with a savepoint-isolated upsert coordinator.
//
// Layers, top to bottom:
// - service:     ReservationService (save / create / find)
// - dao:         ReservationDao trait and its table-backed implementation
// - connection:  Connection, the explicit transaction scope
// - transaction: ambient transactions, redo logs and savepoints
// - storage:     committed rows, identity sequence, snapshots
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod dao;
pub mod entity;
pub mod facade;
pub mod service;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use connection::Connection;
pub use connection::config::StoreConfig;
pub use crate::core::{DbError, Result};
pub use dao::{ReservationDao, TableReservationDao};
pub use entity::{Reservation, ReservationId};
pub use facade::{Database, StoreStats};
pub use service::{ReservationService, SavePolicy};
pub use storage::DurabilityMode;
pub use transaction::Savepoint;
