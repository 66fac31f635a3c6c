//! Connector and connection traits

use crate::cancel::CancellationToken;
use crate::error::DbResult;
use crate::output::QueryOutput;

/// An exclusive, blocking database connection.
///
/// Connections are moved onto blocking worker threads, so they must be
/// `Send` but need not be `Sync`.
pub trait QueryConnection: Send + 'static {
    /// Run a query and collect its rows.
    ///
    /// Implementations check `cancel` before running and periodically while
    /// fetching, and may register an engine interrupt with it. They return
    /// `DbError::Cancelled` once it fires.
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> DbResult<QueryOutput>;

    /// Execute one or more statements without collecting results.
    fn execute_batch(&mut self, sql: &str) -> DbResult<()>;
}

/// Opens connections to one database.
pub trait Connector: Send + Sync + 'static {
    type Connection: QueryConnection;

    /// Open a new connection
    fn connect(&self) -> DbResult<Self::Connection>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
