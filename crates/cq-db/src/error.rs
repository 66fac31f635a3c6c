//! Error types for cq-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Query exceeded its wall-clock limit (D004)
    #[error("[D004] Query timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },

    /// Query stopped because its cancellation token fired (D005)
    #[error("[D005] Query cancelled")]
    Cancelled,

    /// Pool no longer hands out connections (D006)
    #[error("[D006] Connection pool is closed")]
    PoolClosed,

    /// Lease used after its connection was returned (D007)
    #[error("[D007] Lease already released")]
    LeaseReleased,

    /// Internal error (D008)
    #[error("[D008] Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Whether the query failed while running, as opposed to an
    /// infrastructure problem with the pool or the connection.
    #[cfg(test)]
    pub(crate) fn is_query_failure(&self) -> bool {
        matches!(
            self,
            DbError::ExecutionError(_)
                | DbError::TableNotFound(_)
                | DbError::TimedOut { .. }
                | DbError::Cancelled
        )
    }
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error carries no structured variant for missing relations.
        let msg = err.to_string();
        if msg.contains("Table with name")
            || msg.contains("View with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}
