//! cq-db - Database layer for caseql
//!
//! This crate provides the connector/connection traits, a DuckDB
//! implementation, a bounded connection pool with leases, the
//! timeout-guarded query executor and the persisted event table.

pub mod cancel;
pub mod duckdb;
pub mod error;
pub mod executor;
pub mod output;
pub mod pool;
pub mod table;
pub mod traits;

pub use cancel::{CancellationToken, InterruptGuard};
pub use duckdb::{DuckDbConnection, DuckDbConnector};
pub use error::{DbError, DbResult};
pub use executor::QueryExecutor;
pub use output::{ColumnDescriptor, QueryOutput};
pub use pool::{Lease, ResourcePool};
pub use table::{EventTable, StageProfile};
pub use traits::{Connector, QueryConnection};
