use crate::connection::Connection;
use crate::core::Result;
use crate::transaction::Savepoint;
use tracing::{Level, event};

/// Close a nested scope according to the outcome of the work done inside it
///
/// Success releases the savepoint into the ambient transaction; failure rolls
/// back to it and hands the original error back unchanged.
pub(super) async fn finish_scope(
    conn: &mut Connection,
    savepoint: Savepoint,
    outcome: Result<u64>,
) -> Result<u64> {
    match outcome {
        Ok(affected) => {
            conn.release_savepoint(&savepoint).await?;
            Ok(affected)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback_to_savepoint(&savepoint).await {
                event!(
                    Level::ERROR,
                    savepoint = savepoint.name(),
                    error = %rollback_err,
                    "rollback to savepoint failed"
                );
            }
            Err(err)
        }
    }
}
