pub mod memory;
pub mod persistence;
pub mod table;

pub use memory::{IdentitySequence, InMemoryStorage};
pub use persistence::{DatabaseSnapshot, DurabilityMode, SnapshotManager};
pub use table::{RESERVATION_TABLE, ReservationRow, ReservationTable};
