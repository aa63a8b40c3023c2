use crate::core::{DbError, Result};
use crate::entity::ReservationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RESERVATION_TABLE: &str = "reservation";

/// Physical row of the `reservation` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRow {
    pub id: ReservationId,
    pub name: Option<String>,
}

impl ReservationRow {
    pub fn new(id: ReservationId, name: Option<String>) -> Self {
        Self { id, name }
    }
}

/// Committed contents of the `reservation` table, keyed by primary key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationTable {
    rows: BTreeMap<ReservationId, Option<String>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        RESERVATION_TABLE
    }

    pub fn contains(&self, id: ReservationId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn get(&self, id: ReservationId) -> Option<ReservationRow> {
        self.rows
            .get(&id)
            .map(|name| ReservationRow::new(id, name.clone()))
    }

    pub fn insert(&mut self, row: ReservationRow) -> Result<()> {
        self.check_primary_key(row.id)?;
        self.rows.insert(row.id, row.name);
        Ok(())
    }

    /// Returns false when no row carries the key
    pub fn update(&mut self, row: ReservationRow) -> bool {
        match self.rows.get_mut(&row.id) {
            Some(name) => {
                *name = row.name;
                true
            }
            None => false,
        }
    }

    /// All rows in primary key order
    pub fn scan(&self) -> Vec<ReservationRow> {
        self.rows
            .iter()
            .map(|(id, name)| ReservationRow::new(*id, name.clone()))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Highest key in use, used to keep the identity sequence ahead of restored rows
    pub fn max_id(&self) -> Option<ReservationId> {
        self.rows.keys().next_back().copied()
    }

    pub fn check_primary_key(&self, id: ReservationId) -> Result<()> {
        if self.rows.contains_key(&id) {
            return Err(DbError::ConstraintViolation(format!(
                "Primary key violation: table '{}' already contains id {}",
                RESERVATION_TABLE,
                id.value()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str) -> ReservationRow {
        ReservationRow::new(ReservationId::new(id), Some(name.to_string()))
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = ReservationTable::new();
        table.insert(row(1, "foo")).unwrap();

        assert_eq!(table.get(ReservationId::new(1)), Some(row(1, "foo")));
        assert_eq!(table.get(ReservationId::new(2)), None);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut table = ReservationTable::new();
        table.insert(row(1, "foo")).unwrap();

        let err = table.insert(row(1, "bar")).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(table.get(ReservationId::new(1)), Some(row(1, "foo")));
    }

    #[test]
    fn test_update_missing_row() {
        let mut table = ReservationTable::new();
        assert!(!table.update(row(999, "x")));
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_update_to_null_name() {
        let mut table = ReservationTable::new();
        table.insert(row(1, "foo")).unwrap();

        assert!(table.update(ReservationRow::new(ReservationId::new(1), None)));
        assert_eq!(table.get(ReservationId::new(1)).unwrap().name, None);
    }

    #[test]
    fn test_scan_in_key_order() {
        let mut table = ReservationTable::new();
        table.insert(row(3, "c")).unwrap();
        table.insert(row(1, "a")).unwrap();
        table.insert(row(2, "b")).unwrap();

        let ids: Vec<i64> = table.scan().iter().map(|r| r.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(table.max_id(), Some(ReservationId::new(3)));
    }
}
