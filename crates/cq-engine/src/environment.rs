//! Everything a question flow shares with the others.

use crate::catalog::{CatalogRetriever, SchemaCatalog};
use crate::collaborators::{Collaborators, SchemaRetriever};
use crate::error::{EngineError, EngineResult};
use cq_core::config::OrchestratorConfig;
use cq_core::{ColumnFile, Config, DependencyGraph};
use cq_db::{Connector, DbError, DuckDbConnector, EventTable, QueryExecutor, ResourcePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared, read-mostly state of a run.
///
/// The graph is immutable; the catalog is append-only; the pool hands out
/// exclusive leases. Nothing else is shared between flows.
pub struct Environment<C: Connector> {
    pub graph: Arc<DependencyGraph>,
    pub pool: ResourcePool<C>,
    pub executor: QueryExecutor,
    pub table: EventTable,
    /// Row count every derived column must match
    pub expected_rows: u64,
    pub catalog: Arc<SchemaCatalog>,
    pub retriever: Arc<dyn SchemaRetriever>,
    pub collaborators: Collaborators,
    pub settings: OrchestratorConfig,
}

impl Environment<DuckDbConnector> {
    /// Open the project's database and column file.
    pub async fn open(config: &Config, root: &Path, collaborators: Collaborators) -> EngineResult<Self> {
        let columns_path = config.columns_file_absolute(root);
        log::debug!("Loading columns from {}", columns_path.display());
        let file = ColumnFile::load(&columns_path)?;
        let graph = DependencyGraph::from_column_file(&file, &config.table.always_available()?)?;

        let db_path = config.database_path_absolute(root);
        log::debug!("Opening database {}", db_path);
        let connector =
            DuckDbConnector::new(&db_path)?.with_poll_interval(config.executor.poll_interval_rows);

        Self::from_connector(
            config,
            graph,
            connector,
            config.source_csv_absolute(root),
            collaborators,
        )
        .await
    }
}

impl<C: Connector> Environment<C> {
    /// Build an environment over an existing connector.
    ///
    /// Prepares the event table, checks its row count and seeds the catalog
    /// with the columns the table already has.
    pub async fn from_connector(
        config: &Config,
        graph: DependencyGraph,
        connector: C,
        source_csv: Option<PathBuf>,
        collaborators: Collaborators,
    ) -> EngineResult<Self> {
        let pool = ResourcePool::new(connector, config.pool.size)?;
        let table = EventTable::from_config(&config.table);

        let mut lease = pool.acquire().await?;
        let prepared = table.clone();
        let (schema, rows) = lease
            .run_blocking(move |conn| {
                prepared.prepare(conn, source_csv.as_deref())?;
                Ok((prepared.schema(conn)?, prepared.row_count(conn)?))
            })
            .await?;
        lease.release();

        let expected_rows = match config.table.expected_rows {
            Some(expected) if expected != rows => {
                return Err(EngineError::Db(DbError::ExecutionError(format!(
                    "table {} has {} rows, expected {}",
                    table.name, rows, expected
                ))));
            }
            _ => rows,
        };
        log::info!("Table {} ready with {} rows", table.name, expected_rows);

        let catalog = Arc::new(SchemaCatalog::for_table(&table));
        for (name, data_type) in schema {
            if name == table.row_index_column {
                continue;
            }
            let Some(column) = cq_core::ColumnName::try_new(name.as_str()) else {
                continue;
            };
            let text = match graph.spec(&name) {
                Some(spec) => spec.description_text(),
                None => format!("- '{name}' ({data_type})"),
            };
            catalog.register(column, text);
        }

        let retriever: Arc<dyn SchemaRetriever> = match &collaborators.retriever {
            Some(retriever) => Arc::clone(retriever),
            None => Arc::new(CatalogRetriever::new(
                Arc::clone(&catalog),
                config.retrieval.max_documents,
            )),
        };

        Ok(Self {
            graph: Arc::new(graph),
            pool,
            executor: QueryExecutor::new(config.executor.timeout()),
            table,
            expected_rows,
            catalog,
            retriever,
            collaborators,
            settings: config.orchestrator.clone(),
        })
    }
}
