//! Query command implementation

use anyhow::{Context, Result};
use cq_db::{DuckDbConnector, EventTable, QueryExecutor, ResourcePool};
use cq_engine::format_table;
use std::time::Duration;

use crate::cli::{GlobalArgs, QueryArgs};
use crate::commands::common::{self, load_config};

/// Execute the query command
pub(crate) async fn execute(args: &QueryArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let root = common::project_root(global);

    let db_path = config.database_path_absolute(&root);
    let connector = DuckDbConnector::new(&db_path)
        .with_context(|| format!("Failed to open database {db_path}"))?
        .with_poll_interval(config.executor.poll_interval_rows);
    let pool = ResourcePool::new(connector, 1)?;

    let table = EventTable::from_config(&config.table);
    let source_csv = config.source_csv_absolute(&root);
    let mut lease = pool.acquire().await?;
    lease
        .run_blocking(move |conn| table.prepare(conn, source_csv.as_deref()))
        .await?;
    lease.release();

    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.executor.timeout());
    let executor = QueryExecutor::new(timeout);
    let lease = pool.acquire().await?;
    let output = executor
        .execute(lease, &args.sql)
        .await
        .context("Query failed")?;

    let max_chars = args
        .max_chars
        .unwrap_or(config.orchestrator.max_table_chars);
    println!("{}", format_table(&output, max_chars));
    if global.verbose {
        eprintln!("[verbose] {} row(s)", output.rows.len());
    }
    Ok(())
}
