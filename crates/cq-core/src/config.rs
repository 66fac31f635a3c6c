//! Configuration types and parsing for caseql.yml

use crate::column_name::ColumnName;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main project configuration from caseql.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Column file, relative to the project directory
    #[serde(default = "default_columns_file")]
    pub columns_file: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// The event table every derived column is added to
    #[serde(default)]
    pub table: TableConfig,

    /// Connection pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Query execution settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Question flow settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Built-in schema retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// DuckDB database path, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Event table layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(default = "default_table_name")]
    pub name: String,

    /// Case identifier column
    #[serde(default = "default_case_column")]
    pub case_column: String,

    /// Event timestamp column
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// Stable row index used to back-fill derived columns
    #[serde(default = "default_row_index_column")]
    pub row_index_column: String,

    /// CSV loaded into the table when it does not exist yet
    #[serde(default)]
    pub source_csv: Option<String>,

    /// Fixed row count of the table; measured at startup when absent
    #[serde(default)]
    pub expected_rows: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: default_table_name(),
            case_column: default_case_column(),
            timestamp_column: default_timestamp_column(),
            row_index_column: default_row_index_column(),
            source_csv: None,
            expected_rows: None,
        }
    }
}

impl TableConfig {
    /// Columns that are always available regardless of the column file.
    pub fn always_available(&self) -> CoreResult<Vec<ColumnName>> {
        [&self.case_column, &self.timestamp_column]
            .into_iter()
            .map(|c| {
                ColumnName::try_new(c.as_str()).ok_or_else(|| CoreError::EmptyName {
                    context: "table.case_column / table.timestamp_column".into(),
                })
            })
            .collect()
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Wall-clock limit for one query
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rows fetched between two cancellation checks
    #[serde(default = "default_poll_interval_rows")]
    pub poll_interval_rows: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_rows: default_poll_interval_rows(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How the classifier verdict drives a question flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Follow the verdict; materialize only when it asks for it and a plan exists
    #[default]
    Verdict,
    /// Materialize whenever a plan exists; the verdict is bookkeeping only
    Plan,
}

/// What happens to the rest of a plan after one column fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationFailurePolicy {
    /// Keep going; columns depending on the failed one are skipped
    #[default]
    Continue,
    /// The first failure ends the question
    FailFast,
}

/// Question flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Query attempts per question
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Size cap of the formatted result table
    #[serde(default = "default_max_table_chars")]
    pub max_table_chars: usize,

    /// Question flows run at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub decision_policy: DecisionPolicy,

    #[serde(default)]
    pub on_materialize_failure: MaterializationFailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_table_chars: default_max_table_chars(),
            concurrency: default_concurrency(),
            decision_policy: DecisionPolicy::default(),
            on_materialize_failure: MaterializationFailurePolicy::default(),
        }
    }
}

/// Built-in schema retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Column descriptions included in one schema context
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
        }
    }
}

fn default_columns_file() -> String {
    "columns.yml".to_string()
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

fn default_table_name() -> String {
    "event_log".to_string()
}

fn default_case_column() -> String {
    "case_concept_name".to_string()
}

fn default_timestamp_column() -> String {
    "time_timestamp".to_string()
}

fn default_row_index_column() -> String {
    "row_idx".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_rows() -> usize {
    1000
}

fn default_max_attempts() -> usize {
    4
}

fn default_max_table_chars() -> usize {
    1500
}

fn default_concurrency() -> usize {
    4
}

fn default_max_documents() -> usize {
    12
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    ///
    /// Looks for caseql.yml or caseql.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("caseql.yml");
        let yaml_path = dir.join("caseql.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "name must not be empty".to_string(),
            });
        }

        let table = &self.table;
        for (field, value) in [
            ("table.name", &table.name),
            ("table.case_column", &table.case_column),
            ("table.timestamp_column", &table.timestamp_column),
            ("table.row_index_column", &table.row_index_column),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: format!("{field} must not be empty"),
                });
            }
        }
        if table.case_column == table.timestamp_column {
            return Err(CoreError::ConfigInvalid {
                message: "table.case_column and table.timestamp_column must differ".to_string(),
            });
        }
        if table.expected_rows == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "table.expected_rows must be at least 1".to_string(),
            });
        }

        let checks = [
            (self.pool.size == 0, "pool.size must be at least 1"),
            (self.executor.timeout_secs == 0, "executor.timeout_secs must be greater than 0"),
            (
                self.executor.poll_interval_rows == 0,
                "executor.poll_interval_rows must be at least 1",
            ),
            (self.orchestrator.max_attempts == 0, "orchestrator.max_attempts must be at least 1"),
            (self.orchestrator.concurrency == 0, "orchestrator.concurrency must be at least 1"),
            (
                self.orchestrator.max_table_chars == 0,
                "orchestrator.max_table_chars must be at least 1",
            ),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(CoreError::ConfigInvalid {
                message: message.to_string(),
            });
        }

        Ok(())
    }

    /// Absolute path of the column file
    pub fn columns_file_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.columns_file)
    }

    /// Absolute database path; `:memory:` is returned unchanged
    pub fn database_path_absolute(&self, root: &Path) -> String {
        if self.database.path == ":memory:" || Path::new(&self.database.path).is_absolute() {
            self.database.path.clone()
        } else {
            root.join(&self.database.path).display().to_string()
        }
    }

    /// Absolute path of the source CSV, if configured
    pub fn source_csv_absolute(&self, root: &Path) -> Option<PathBuf> {
        self.table.source_csv.as_ref().map(|p| root.join(p))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
