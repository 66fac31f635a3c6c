//! The persisted event table that derived columns are added to.
//!
//! Rows are addressed by a stable row-index column, assigned once by ordering
//! on the case and timestamp columns. Derived columns are staged into a
//! temporary table, profiled, then back-filled with a row-aligned
//! `UPDATE ... FROM` inside a transaction.

use crate::cancel::CancellationToken;
use crate::error::{DbError, DbResult};
use crate::output::QueryOutput;
use crate::traits::QueryConnection;
use cq_core::config::TableConfig;
use cq_core::StorageKind;
use std::path::Path;

/// Prefix of the temporary staging tables
const STAGE_PREFIX: &str = "__cq_stage_";

/// Quote a SQL identifier, doubling embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Shape of a staged column as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProfile {
    /// Engine type of the produced column; `None` when the column is missing
    pub data_type: Option<String>,
    /// Whether the staged relation carries the row-index column
    pub has_row_index: bool,
    /// Rows in the staged relation
    pub rows: u64,
    /// Null values in the produced column
    pub nulls: u64,
    /// Distinct row-index values in the staged relation
    pub distinct_indices: u64,
    /// Staged rows whose row index does not exist in the event table
    pub unknown_indices: u64,
}

/// Names and layout of the event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTable {
    pub name: String,
    pub case_column: String,
    pub timestamp_column: String,
    pub row_index_column: String,
}

impl EventTable {
    pub fn from_config(config: &TableConfig) -> Self {
        Self {
            name: config.name.clone(),
            case_column: config.case_column.clone(),
            timestamp_column: config.timestamp_column.clone(),
            row_index_column: config.row_index_column.clone(),
        }
    }

    /// Make sure the table exists and carries a row index.
    ///
    /// When the table is missing it is loaded from `source_csv`.
    pub fn prepare<C: QueryConnection>(
        &self,
        conn: &mut C,
        source_csv: Option<&Path>,
    ) -> DbResult<()> {
        if !self.exists(conn)? {
            let Some(csv) = source_csv else {
                return Err(DbError::TableNotFound(format!(
                    "{} (no source_csv configured)",
                    self.name
                )));
            };
            log::info!("Loading {} from {}", self.name, csv.display());
            conn.execute_batch(&format!(
                "CREATE TABLE {} AS SELECT * FROM read_csv_auto({})",
                quote_ident(&self.name),
                quote_literal(&csv.display().to_string())
            ))?;
        }

        let columns = self.columns(conn)?;
        for required in [&self.case_column, &self.timestamp_column] {
            if !columns.iter().any(|c| c == required) {
                return Err(DbError::ExecutionError(format!(
                    "table {} has no column {}",
                    self.name, required
                )));
            }
        }

        if !columns.iter().any(|c| c == &self.row_index_column) {
            self.add_row_index(conn)?;
        }
        Ok(())
    }

    fn add_row_index<C: QueryConnection>(&self, conn: &mut C) -> DbResult<()> {
        log::info!(
            "Adding row index {} to {}",
            self.row_index_column,
            self.name
        );
        let indexed = format!("{}__indexed", self.name);
        let sql = format!(
            "CREATE OR REPLACE TABLE {indexed} AS \
             SELECT CAST(row_number() OVER (ORDER BY {case}, {ts}) - 1 AS BIGINT) AS {idx}, * FROM {table}; \
             DROP TABLE {table}; \
             ALTER TABLE {indexed} RENAME TO {table};",
            indexed = quote_ident(&indexed),
            case = quote_ident(&self.case_column),
            ts = quote_ident(&self.timestamp_column),
            idx = quote_ident(&self.row_index_column),
            table = quote_ident(&self.name),
        );
        conn.execute_batch(&sql)
    }

    /// Whether the table exists
    pub fn exists<C: QueryConnection>(&self, conn: &mut C) -> DbResult<bool> {
        let output = query(
            conn,
            &format!(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = {}",
                quote_literal(&self.name)
            ),
        )?;
        Ok(parse_count(&output)? > 0)
    }

    /// Column names in table order
    pub fn columns<C: QueryConnection>(&self, conn: &mut C) -> DbResult<Vec<String>> {
        describe(conn, &self.name).map(|cols| cols.into_iter().map(|(name, _)| name).collect())
    }

    /// `(column_name, column_type)` pairs in table order
    pub fn schema<C: QueryConnection>(&self, conn: &mut C) -> DbResult<Vec<(String, String)>> {
        describe(conn, &self.name)
    }

    pub fn has_column<C: QueryConnection>(&self, conn: &mut C, column: &str) -> DbResult<bool> {
        Ok(self.columns(conn)?.iter().any(|c| c == column))
    }

    pub fn row_count<C: QueryConnection>(&self, conn: &mut C) -> DbResult<u64> {
        let output = query(conn, &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.name)))?;
        parse_count(&output)
    }

    /// Name of the staging table for a column
    pub fn stage_name(column: &str) -> String {
        format!("{STAGE_PREFIX}{column}")
    }

    /// Run `select_sql` into the column's staging table and profile the result.
    pub fn stage<C: QueryConnection>(
        &self,
        conn: &mut C,
        column: &str,
        select_sql: &str,
    ) -> DbResult<StageProfile> {
        let stage = Self::stage_name(column);
        let select_sql = select_sql.trim().trim_end_matches(';');
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TEMP TABLE {} AS {}",
            quote_ident(&stage),
            select_sql
        ))?;

        let described = describe(conn, &stage)?;
        let data_type = described
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| ty.clone());
        let has_row_index = described
            .iter()
            .any(|(name, _)| name == &self.row_index_column);

        let counted = match data_type {
            Some(_) => format!(
                "SELECT COUNT(*), COUNT(*) - COUNT({}) FROM {}",
                quote_ident(column),
                quote_ident(&stage)
            ),
            None => format!("SELECT COUNT(*), 0 FROM {}", quote_ident(&stage)),
        };
        let output = query(conn, &counted)?;
        let row = output
            .rows
            .first()
            .ok_or_else(|| DbError::Internal("count query returned no rows".to_string()))?;
        let rows = parse_u64(row.first())?;
        let nulls = parse_u64(row.get(1))?;

        let (distinct_indices, unknown_indices) = if has_row_index {
            self.profile_indices(conn, &stage)?
        } else {
            (0, 0)
        };

        Ok(StageProfile {
            data_type,
            has_row_index,
            rows,
            nulls,
            distinct_indices,
            unknown_indices,
        })
    }

    /// Distinct row indices of a staged relation, and how many staged rows
    /// point at no row of the table.
    fn profile_indices<C: QueryConnection>(
        &self,
        conn: &mut C,
        stage: &str,
    ) -> DbResult<(u64, u64)> {
        let idx = quote_ident(&self.row_index_column);
        let output = query(
            conn,
            &format!(
                "SELECT \
                   (SELECT COUNT(DISTINCT {idx}) FROM {stage}), \
                   (SELECT COUNT(*) FROM {stage} AS s \
                    WHERE NOT EXISTS (SELECT 1 FROM {table} AS t WHERE t.{idx} = s.{idx}))",
                stage = quote_ident(stage),
                table = quote_ident(&self.name),
            ),
        )?;
        let row = output
            .rows
            .first()
            .ok_or_else(|| DbError::Internal("index profile returned no rows".to_string()))?;
        Ok((parse_u64(row.first())?, parse_u64(row.get(1))?))
    }

    /// Add (or replace) `column` with the staged values, aligned on the row index.
    pub fn commit_column<C: QueryConnection>(
        &self,
        conn: &mut C,
        column: &str,
        kind: StorageKind,
    ) -> DbResult<()> {
        let replace = self.has_column(conn, column)?;
        let table = quote_ident(&self.name);
        let col = quote_ident(column);
        let idx = quote_ident(&self.row_index_column);
        let stage = quote_ident(&Self::stage_name(column));

        transaction(conn, |conn| {
            if replace {
                log::info!("Dropping existing column {} before regenerating it", column);
                conn.execute_batch(&format!("ALTER TABLE {table} DROP COLUMN {col}"))?;
            }
            conn.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {col} {}",
                kind.sql_type()
            ))?;
            conn.execute_batch(&format!(
                "UPDATE {table} SET {col} = s.{col} FROM {stage} AS s WHERE {table}.{idx} = s.{idx}"
            ))
        })
    }

    /// Drop the column's staging table if present.
    pub fn drop_stage<C: QueryConnection>(&self, conn: &mut C, column: &str) -> DbResult<()> {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}",
            quote_ident(&Self::stage_name(column))
        ))
    }
}

/// Run `f` between BEGIN and COMMIT, rolling back on error.
pub fn transaction<C, F, T>(conn: &mut C, f: F) -> DbResult<T>
where
    C: QueryConnection,
    F: FnOnce(&mut C) -> DbResult<T>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

fn query<C: QueryConnection>(conn: &mut C, sql: &str) -> DbResult<QueryOutput> {
    conn.query(sql, &CancellationToken::new())
}

/// `(column_name, column_type)` pairs of a relation
fn describe<C: QueryConnection>(conn: &mut C, relation: &str) -> DbResult<Vec<(String, String)>> {
    let output = query(conn, &format!("DESCRIBE {}", quote_ident(relation)))?;
    let name_idx = output.column_index("column_name").unwrap_or(0);
    let type_idx = output.column_index("column_type").unwrap_or(1);
    Ok(output
        .rows
        .into_iter()
        .filter_map(|row| {
            let name = row.get(name_idx)?.clone();
            let ty = row.get(type_idx)?.clone();
            Some((name, ty))
        })
        .collect())
}

fn parse_count(output: &QueryOutput) -> DbResult<u64> {
    parse_u64(output.rows.first().and_then(|r| r.first()))
}

fn parse_u64(value: Option<&String>) -> DbResult<u64> {
    let value = value.ok_or_else(|| DbError::Internal("missing count value".to_string()))?;
    value
        .parse()
        .map_err(|_| DbError::Internal(format!("expected a count, got '{value}'")))
}

#[cfg(test)]
#[path = "table_test.rs"]
mod tests;
