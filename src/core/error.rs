use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("No active transaction: {0}")]
    NoActiveTransaction(String),

    #[error("Transaction {0} is not active")]
    TransactionNotActive(String),

    #[error("Savepoint '{0}' not found")]
    SavepointNotFound(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// True for duplicate-key failures raised by insert or commit
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }

    /// True when the caller used the transaction scope incorrectly
    pub fn is_scope_misuse(&self) -> bool {
        matches!(
            self,
            DbError::NoActiveTransaction(_)
                | DbError::TransactionNotActive(_)
                | DbError::SavepointNotFound(_)
                | DbError::ConnectionClosed(_)
        )
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for DbError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::PersistenceError(format!("Failed to serialize snapshot: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for DbError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::PersistenceError(format!("Failed to deserialize snapshot: {}", err))
    }
}

impl From<tempfile::PersistError> for DbError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::PersistenceError(format!("Failed to persist snapshot: {}", err.error))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DbError::ConstraintViolation("pk".into()).is_constraint_violation());
        assert!(!DbError::ExecutionError("boom".into()).is_constraint_violation());

        assert!(DbError::NoActiveTransaction("savepoint".into()).is_scope_misuse());
        assert!(DbError::ConnectionClosed(7).is_scope_misuse());
        assert!(!DbError::ConstraintViolation("pk".into()).is_scope_misuse());
    }

    #[test]
    fn test_error_display() {
        let err = DbError::SavepointNotFound("sp_1".into());
        assert_eq!(err.to_string(), "Savepoint 'sp_1' not found");
    }
}
