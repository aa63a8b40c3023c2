// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Ambient transactions buffer their writes in a redo log that is applied to
// storage atomically on commit. Savepoints mark positions in that log, so a
// nested scope can be undone without touching the rest of the transaction.
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Command Pattern: Buffered, replayable write operations
// - Memento: Savepoints as redo-log positions
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionInfo, TransactionManager};
pub use state::{Savepoint, Transaction, TransactionId, TransactionState};
