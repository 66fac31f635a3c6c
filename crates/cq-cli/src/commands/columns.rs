//! Columns command implementation

use anyhow::Result;
use cq_core::{DependencyGraph, StorageKind};
use serde::Serialize;

use crate::cli::{ColumnsArgs, ColumnsOutput, GlobalArgs};
use crate::commands::common::{self, load_config, load_graph};

/// Column information for output
#[derive(Debug, Serialize)]
struct ColumnInfo {
    name: String,
    kind: StorageKind,
    depends_on: Vec<String>,
    definition: String,
}

/// Execute the columns command
pub(crate) async fn execute(args: &ColumnsArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let graph = load_graph(&config, &common::project_root(global))?;
    let columns = collect(&graph)?;

    match args.output {
        ColumnsOutput::Table => print_table(&columns),
        ColumnsOutput::Json => print_json(&columns)?,
    }
    Ok(())
}

/// Derivable columns in dependency order
fn collect(graph: &DependencyGraph) -> Result<Vec<ColumnInfo>> {
    let mut columns = Vec::new();
    for name in graph.topological_order()? {
        let Some(spec) = graph.spec(&name) else {
            continue;
        };
        columns.push(ColumnInfo {
            name: name.to_string(),
            kind: spec.kind,
            depends_on: spec.depends_on.iter().map(|d| d.to_string()).collect(),
            definition: spec.definition.clone(),
        });
    }
    Ok(columns)
}

fn print_table(columns: &[ColumnInfo]) {
    let name_width = columns
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    let type_width = 9;
    let deps_width = columns
        .iter()
        .map(|c| c.depends_on.join(", ").len())
        .max()
        .unwrap_or(10)
        .max(10);

    println!(
        "{:<name_width$}  {:<type_width$}  {:<deps_width$}  DEFINITION",
        "NAME", "TYPE", "DEPENDS_ON",
    );
    println!(
        "{:-<name_width$}  {:-<type_width$}  {:-<deps_width$}  {}",
        "",
        "",
        "",
        "-".repeat(40),
    );

    for column in columns {
        let deps = if column.depends_on.is_empty() {
            "-".to_string()
        } else {
            column.depends_on.join(", ")
        };
        println!(
            "{:<name_width$}  {:<type_width$}  {:<deps_width$}  {}",
            column.name,
            column.kind.sql_type(),
            deps,
            column.definition,
        );
    }

    println!();
    println!("{} derivable columns", columns.len());
}

fn print_json(columns: &[ColumnInfo]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(columns)?);
    Ok(())
}
