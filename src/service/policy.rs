use crate::core::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How `ReservationService::save` picks between insert and update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePolicy {
    /// Insert when the id is absent, update otherwise; failures propagate
    #[default]
    Strict,

    /// Always try insert first; on any failure log it and try update
    ///
    /// A reservation that already has an id always pays for a failed insert
    /// (primary key collision) before it is updated.
    InsertThenUpdate,
}

impl SavePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavePolicy::Strict => "strict",
            SavePolicy::InsertThenUpdate => "insert_then_update",
        }
    }
}

impl fmt::Display for SavePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SavePolicy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(SavePolicy::Strict),
            "insert_then_update" => Ok(SavePolicy::InsertThenUpdate),
            other => Err(DbError::ConfigError(format!("Unknown save policy '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for policy in [SavePolicy::Strict, SavePolicy::InsertThenUpdate] {
            assert_eq!(policy.to_string().parse::<SavePolicy>().unwrap(), policy);
        }
        assert!("upsert".parse::<SavePolicy>().is_err());
    }

    #[test]
    fn test_default_is_strict() {
        assert_eq!(SavePolicy::default(), SavePolicy::Strict);
    }
}
