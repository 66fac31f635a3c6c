//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use cq_core::{ColumnFile, ColumnName, Config, DependencyGraph};
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Project root from the global `--project-dir`
pub(crate) fn project_root(global: &GlobalArgs) -> PathBuf {
    PathBuf::from(&global.project_dir)
}

/// Load the project configuration, honouring `--config` when given.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    let root = project_root(global);
    let config = match &global.config {
        Some(path) => Config::load(Path::new(path)),
        None => Config::load_from_dir(&root),
    }
    .with_context(|| format!("Failed to load config for project: {}", root.display()))?;
    if global.verbose {
        eprintln!("[verbose] Loaded project '{}'", config.name);
    }
    Ok(config)
}

/// Load the column file and build the dependency graph.
pub(crate) fn load_graph(config: &Config, root: &Path) -> Result<DependencyGraph> {
    let path = config.columns_file_absolute(root);
    let file = ColumnFile::load(&path)
        .with_context(|| format!("Failed to load columns from {}", path.display()))?;
    let always = config.table.always_available()?;
    DependencyGraph::from_column_file(&file, &always).context("Invalid column dependencies")
}

/// Split a comma-separated column list, dropping empty items.
pub(crate) fn parse_column_list(list: &str) -> Vec<ColumnName> {
    list.split(',')
        .filter_map(|item| ColumnName::try_new(item.trim()))
        .collect()
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
