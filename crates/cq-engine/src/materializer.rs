//! Generates derived columns and writes them into the event table.
//!
//! A column transform is staged into a temporary table, checked against the
//! column's storage kind and the table's row count, then committed with a
//! row-aligned back-fill. Staging tables are dropped whatever the outcome.

use crate::catalog::SchemaCatalog;
use crate::collaborators::{ColumnGenerator, ColumnRequest, SchemaRetriever};
use crate::error::{EngineError, EngineResult, GenerationFailure};
use cq_core::{ColumnSpec, StorageKind};
use cq_db::{Connector, EventTable, QueryConnection, ResourcePool, StageProfile};
use std::sync::Arc;

pub struct ColumnMaterializer<C: Connector> {
    pool: ResourcePool<C>,
    table: EventTable,
    expected_rows: u64,
    catalog: Arc<SchemaCatalog>,
    retriever: Arc<dyn SchemaRetriever>,
    generator: Arc<dyn ColumnGenerator>,
}

impl<C: Connector> ColumnMaterializer<C> {
    pub fn new(
        pool: ResourcePool<C>,
        table: EventTable,
        expected_rows: u64,
        catalog: Arc<SchemaCatalog>,
        retriever: Arc<dyn SchemaRetriever>,
        generator: Arc<dyn ColumnGenerator>,
    ) -> Self {
        Self {
            pool,
            table,
            expected_rows,
            catalog,
            retriever,
            generator,
        }
    }

    /// Generate `spec` following `instruction` and register its description.
    ///
    /// Returns the description that went into the catalog.
    pub async fn materialize(&self, spec: &ColumnSpec, instruction: &str) -> EngineResult<String> {
        let column = spec.name.as_str();
        log::info!("Materializing column {} ({})", column, spec.kind);

        let context = self
            .retriever
            .retrieve(instruction, Some(&spec.definition))
            .await
            .map_err(|e| {
                EngineError::generation(
                    column,
                    GenerationFailure::CollaboratorFailure,
                    format!("schema retrieval failed: {e}"),
                )
            })?;

        let request = ColumnRequest {
            column: spec.name.clone(),
            kind: spec.kind,
            instruction: instruction.to_string(),
            table: self.table.name.clone(),
            row_index_column: self.table.row_index_column.clone(),
        };
        let transform = self
            .generator
            .generate(&request, &context)
            .await
            .map_err(|e| {
                EngineError::generation(column, GenerationFailure::CollaboratorFailure, e.to_string())
            })?;
        log::debug!("Transform for {}: {}", column, transform.sql);

        let mut lease = self.pool.acquire().await?;
        let table = self.table.clone();
        let name = column.to_string();
        let kind = spec.kind;
        let expected_rows = self.expected_rows;
        let sql = transform.sql;
        let written = lease
            .run_blocking(move |conn| {
                let outcome = stage_and_commit(&table, conn, &name, kind, expected_rows, &sql);
                if let Err(e) = table.drop_stage(conn, &name) {
                    log::warn!("Failed to drop staging table for {}: {}", name, e);
                }
                Ok(outcome)
            })
            .await;
        lease.release();
        written??;

        let description = transform
            .description
            .unwrap_or_else(|| spec.description_text());
        self.catalog.register(spec.name.clone(), description.clone());
        log::info!("Column {} materialized", column);
        Ok(description)
    }
}

fn stage_and_commit<Q: QueryConnection>(
    table: &EventTable,
    conn: &mut Q,
    column: &str,
    kind: StorageKind,
    expected_rows: u64,
    sql: &str,
) -> EngineResult<()> {
    let profile = table.stage(conn, column, sql).map_err(|e| {
        EngineError::generation(
            column,
            GenerationFailure::CollaboratorFailure,
            format!("transform did not run: {e}"),
        )
    })?;
    validate_profile(column, kind, expected_rows, &table.row_index_column, &profile)?;
    table.commit_column(conn, column, kind)?;
    Ok(())
}

/// Check a staged column against its storage kind and the table's row count.
///
/// Every row index of the table must appear exactly once, so the back-fill
/// leaves no row without a value.
pub fn validate_profile(
    column: &str,
    kind: StorageKind,
    expected_rows: u64,
    row_index_column: &str,
    profile: &StageProfile,
) -> EngineResult<()> {
    let Some(data_type) = profile.data_type.as_deref() else {
        return Err(EngineError::generation(
            column,
            GenerationFailure::WrongType,
            "column is missing from the transform result",
        ));
    };
    if !kind.accepts(data_type) {
        return Err(EngineError::generation(
            column,
            GenerationFailure::WrongType,
            format!("expected {} but got {}", kind.sql_type(), data_type),
        ));
    }
    if profile.nulls > 0 {
        return Err(EngineError::generation(
            column,
            GenerationFailure::NullsPresent,
            format!("{} null value(s)", profile.nulls),
        ));
    }
    if profile.rows != expected_rows {
        return Err(EngineError::generation(
            column,
            GenerationFailure::RowCountMismatch,
            format!("expected {} rows but got {}", expected_rows, profile.rows),
        ));
    }
    if !profile.has_row_index {
        return Err(EngineError::generation(
            column,
            GenerationFailure::CollaboratorFailure,
            format!("transform result has no '{row_index_column}' column"),
        ));
    }
    if profile.distinct_indices != expected_rows || profile.unknown_indices > 0 {
        return Err(EngineError::generation(
            column,
            GenerationFailure::RowCountMismatch,
            format!(
                "'{}' covers {} of {} rows ({} unknown index value(s))",
                row_index_column, profile.distinct_indices, expected_rows, profile.unknown_indices
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "materializer_test.rs"]
mod tests;
