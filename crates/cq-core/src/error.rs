//! Error types for cq-core

use thiserror::Error;

/// Core error type for caseql
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C004: Circular dependency in the column dependency configuration
    #[error("[C004] Circular column dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// C005: Column is not known to the registry or the dependency graph
    #[error("[C005] Unknown column: {name}")]
    UnknownColumn { name: String },

    /// C006: Column declared twice
    #[error("[C006] Duplicate column: {name}")]
    DuplicateColumn { name: String },

    /// C007: Empty name where a column name was expected
    #[error("[C007] Empty name in {context}")]
    EmptyName { context: String },

    /// C008: Storage kind string is not one of integer, boolean, timestamp
    #[error("[C008] Invalid storage kind '{value}': expected integer, boolean or timestamp")]
    InvalidStorageKind { value: String },

    /// C009: IO error
    #[error("[C009] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// C010: IO error with file path context
    #[error("[C010] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// C011: YAML parse error
    #[error("[C011] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether this error means the static dependency configuration is broken.
    ///
    /// Such errors halt a whole run instead of a single question.
    pub fn is_graph_defect(&self) -> bool {
        matches!(
            self,
            CoreError::CircularDependency { .. } | CoreError::UnknownColumn { .. }
        )
    }
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
