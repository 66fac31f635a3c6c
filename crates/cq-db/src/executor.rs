//! Timeout-guarded query execution.
//!
//! The query runs on a blocking worker that owns the lease's connection. The
//! caller waits up to the deadline; on expiry it cancels the worker's token,
//! which also interrupts the engine, and joins the worker before the connection goes back to the pool, so a
//! connection is never used by two threads at once.

use crate::cancel::CancellationToken;
use crate::error::{DbError, DbResult};
use crate::output::QueryOutput;
use crate::pool::Lease;
use crate::traits::{Connector, QueryConnection};
use std::time::Duration;
use tokio::task::JoinError;

/// Runs queries on leased connections with a wall-clock limit.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    default_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute with the default timeout.
    pub async fn execute<C: Connector>(&self, lease: Lease<C>, sql: &str) -> DbResult<QueryOutput> {
        self.execute_with_timeout(lease, sql, self.default_timeout)
            .await
    }

    /// Execute `sql` on the lease's connection, giving up after `timeout`.
    ///
    /// The lease is released exactly once before this returns, whatever the
    /// outcome.
    pub async fn execute_with_timeout<C: Connector>(
        &self,
        mut lease: Lease<C>,
        sql: &str,
        timeout: Duration,
    ) -> DbResult<QueryOutput> {
        let result = run_guarded(&mut lease, sql, timeout).await;
        lease.release();
        result
    }
}

async fn run_guarded<C: Connector>(
    lease: &mut Lease<C>,
    sql: &str,
    timeout: Duration,
) -> DbResult<QueryOutput> {
    let mut conn = lease.take_connection()?;
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let sql = sql.to_string();

    let mut handle = tokio::task::spawn_blocking(move || {
        let result = conn.query(&sql, &worker_token);
        (conn, result)
    });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => finish(lease, joined),
        Err(_) => {
            token.cancel();
            log::warn!(
                "Query exceeded {} ms, waiting for the worker to stop",
                timeout.as_millis()
            );
            // No second deadline: the connection must be idle before reuse.
            let joined = handle.await;
            match &joined {
                Ok((_, Ok(_))) => {
                    log::debug!("Discarding result that arrived after the deadline")
                }
                Ok((_, Err(e))) => log::debug!("Timed-out query stopped: {}", e),
                Err(e) => log::warn!("Timed-out query worker failed, connection lost: {}", e),
            }
            // The worker's own result is superseded by the timeout.
            let _ = finish(lease, joined);
            Err(DbError::TimedOut {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

fn finish<C: Connector>(
    lease: &mut Lease<C>,
    joined: Result<(C::Connection, DbResult<QueryOutput>), JoinError>,
) -> DbResult<QueryOutput> {
    match joined {
        Ok((conn, result)) => {
            lease.restore_connection(conn);
            result
        }
        Err(e) => Err(DbError::Internal(format!("query worker failed: {e}"))),
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
