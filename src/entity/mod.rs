// ============================================================================
// Reservation Entity
// ============================================================================
//
// The single record type kept by the store. `id` stays `None` until the
// first successful insert, after which the store owns the value.
//
// ============================================================================

pub mod id;

pub use id::ReservationId;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: Option<ReservationId>,

    /// Free-form reservation name, may be NULL
    pub name: Option<String>,
}

impl Reservation {
    /// Create a new, not yet persisted reservation
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// Create a reservation without a name
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// Build a reservation that refers to an existing row
    pub fn with_id(id: ReservationId, name: Option<String>) -> Self {
        Self { id: Some(id), name }
    }

    pub fn id(&self) -> Option<ReservationId> {
        self.id
    }

    /// True until the store assigned an identifier
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Record the key the store assigned on insert
    ///
    /// Meant for `ReservationDao` implementations; the coordinator never calls it.
    pub fn assign_id(&mut self, id: ReservationId) {
        self.id = Some(id);
    }
}
