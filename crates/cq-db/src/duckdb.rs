//! DuckDB connector implementation

use crate::cancel::CancellationToken;
use crate::error::{DbError, DbResult};
use crate::output::{ColumnDescriptor, QueryOutput};
use crate::traits::{Connector, QueryConnection};
use chrono::{NaiveDate, NaiveDateTime};
use duckdb::types::ValueRef;
use duckdb::Connection;
use std::path::Path;
use std::sync::Mutex;

const DEFAULT_POLL_INTERVAL_ROWS: usize = 1000;

/// Opens connections that share one DuckDB database.
///
/// Every connection is cloned from a root connection, so in-memory databases
/// are shared as well.
pub struct DuckDbConnector {
    root: Mutex<Connection>,
    poll_interval_rows: usize,
}

impl DuckDbConnector {
    /// Create a connector for a new in-memory database
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Create a connector for a database file
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            root: Mutex::new(conn),
            poll_interval_rows: DEFAULT_POLL_INTERVAL_ROWS,
        }
    }

    /// Rows fetched between two cancellation checks.
    pub fn with_poll_interval(mut self, rows: usize) -> Self {
        self.poll_interval_rows = rows.max(1);
        self
    }
}

impl Connector for DuckDbConnector {
    type Connection = DuckDbConnection;

    fn connect(&self) -> DbResult<DuckDbConnection> {
        let root = self.root.lock().unwrap_or_else(|e| e.into_inner());
        let conn = root
            .try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(DuckDbConnection {
            conn,
            poll_interval_rows: self.poll_interval_rows,
        })
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

/// One DuckDB connection.
pub struct DuckDbConnection {
    conn: Connection,
    poll_interval_rows: usize,
}

impl QueryConnection for DuckDbConnection {
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> DbResult<QueryOutput> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }

        // Stops the engine inside blocking operators that yield no rows.
        let interrupt = self.conn.interrupt_handle();
        let _guard = cancel.interrupt_with(move || interrupt.interrupt());

        self.run(sql, cancel).map_err(|e| {
            if cancel.is_cancelled() {
                log::debug!("Query interrupted: {}", e);
                DbError::Cancelled
            } else {
                e
            }
        })
    }

    fn execute_batch(&mut self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl DuckDbConnection {
    fn run(&mut self, sql: &str, cancel: &CancellationToken) -> DbResult<QueryOutput> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut collected: Vec<Vec<String>> = Vec::new();
        {
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let col_count = row.as_ref().column_count();
                collected.push((0..col_count).map(|i| get_column_as_string(row, i)).collect());
                if collected.len() % self.poll_interval_rows == 0 && cancel.is_cancelled() {
                    log::debug!("Query cancelled after {} rows", collected.len());
                    return Err(DbError::Cancelled);
                }
            }
        }

        // Column metadata is only valid once the statement has run.
        let column_count = stmt.column_count();
        let columns = (0..column_count)
            .map(|i| {
                ColumnDescriptor::new(stmt.column_name(i).map_or("?".to_string(), |v| v.to_string()))
            })
            .collect();

        Ok(QueryOutput {
            columns,
            rows: collected,
        })
    }
}

/// Read a column value as a String, trying multiple DuckDB types.
///
/// Scalar types are matched on the raw value; the typed getters convert
/// loosely (floats truncate to integers, timestamps read as integers).
/// Everything else tries String -> timestamp -> i64 -> "null".
pub fn get_column_as_string(row: &duckdb::Row<'_>, idx: usize) -> String {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => return "null".to_string(),
        Ok(ValueRef::Boolean(b)) => return b.to_string(),
        Ok(ValueRef::TinyInt(n)) => return n.to_string(),
        Ok(ValueRef::SmallInt(n)) => return n.to_string(),
        Ok(ValueRef::Int(n)) => return n.to_string(),
        Ok(ValueRef::BigInt(n)) => return n.to_string(),
        Ok(ValueRef::HugeInt(n)) => return n.to_string(),
        Ok(ValueRef::UBigInt(n)) => return n.to_string(),
        Ok(ValueRef::Float(f)) => return f.to_string(),
        Ok(ValueRef::Double(f)) => return f.to_string(),
        Ok(ValueRef::Decimal(d)) => return d.to_string(),
        Ok(ValueRef::Date32(_)) => {
            if let Ok(d) = row.get::<_, NaiveDate>(idx) {
                return d.to_string();
            }
        }
        _ => {}
    }
    if let Ok(Some(s)) = row.get::<_, Option<String>>(idx) {
        return s;
    }
    if let Ok(Some(ts)) = row.get::<_, Option<NaiveDateTime>>(idx) {
        return ts.to_string();
    }
    if let Ok(Some(n)) = row.get::<_, Option<i64>>(idx) {
        return n.to_string();
    }
    "null".to_string()
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
