//! Error types for cq-engine

use cq_core::CoreError;
use cq_db::DbError;
use std::fmt;
use thiserror::Error;

/// Why a derived column was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationFailure {
    /// Column missing from the result, or its type does not match the storage kind
    WrongType,
    NullsPresent,
    RowCountMismatch,
    /// The collaborator failed or produced unusable SQL
    CollaboratorFailure,
    /// A column this one depends on was not materialized
    DependencyUnavailable,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GenerationFailure::WrongType => "wrong type",
            GenerationFailure::NullsPresent => "nulls present",
            GenerationFailure::RowCountMismatch => "row count mismatch",
            GenerationFailure::CollaboratorFailure => "collaborator failure",
            GenerationFailure::DependencyUnavailable => "dependency unavailable",
        };
        f.write_str(label)
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    /// E001: Derived column rejected
    #[error("[E001] Failed to generate column '{column}' ({failure}): {message}")]
    Generation {
        column: String,
        failure: GenerationFailure,
        message: String,
    },

    /// E002: Classifier answered outside the verdict vocabulary twice
    #[error("[E002] Classifier answered '{answer}', expected needsDirectQuery or needsMaterialization")]
    ClassificationContract { answer: String },

    /// E003: Query attempts exhausted
    #[error("[E003] Query failed after {attempts} attempts: {last_error}")]
    RetryLimitExceeded { attempts: usize, last_error: String },

    /// E004: Collaborator call failed
    #[error("[E004] {collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// E005: Outcome report could not be written
    #[error("[E005] Failed to write report {path}: {message}")]
    Report { path: String, message: String },

    /// E006: Scenario file could not be used
    #[error("[E006] Invalid scenario: {0}")]
    Scenario(String),
}

impl EngineError {
    pub(crate) fn generation(
        column: impl Into<String>,
        failure: GenerationFailure,
        message: impl Into<String>,
    ) -> Self {
        EngineError::Generation {
            column: column.into(),
            failure,
            message: message.into(),
        }
    }

    /// Errors that halt a whole run rather than one question
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Core(e) if e.is_graph_defect())
    }
}

/// Result type alias for EngineError
pub type EngineResult<T> = Result<T, EngineError>;
