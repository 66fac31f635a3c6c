//! Traits for the external text-generation collaborators.
//!
//! Every call is async and may fail with a [`CollaboratorError`]; the
//! orchestrator decides whether a failure is retried, degraded or recorded.

use crate::history::Attempt;
use async_trait::async_trait;
use cq_core::{ColumnName, StorageKind};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// What the column generator is asked to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRequest {
    pub column: ColumnName,
    pub kind: StorageKind,
    pub instruction: String,
    /// Table the transform reads from
    pub table: String,
    /// Column the transform must return alongside the new column
    pub row_index_column: String,
}

/// A generated column transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTransform {
    /// SELECT returning the row-index column and the new column
    pub sql: String,
    /// Catalog text; built from the registry entry when absent
    pub description: Option<String>,
}

/// Decides whether a question needs new columns
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns the raw verdict text, e.g. `needsDirectQuery`
    async fn classify(&self, question: &str, schema_context: &str) -> CollaboratorResult<String>;
}

/// Writes the final SQL for a question
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        schema_context: &str,
        prior: &[Attempt],
    ) -> CollaboratorResult<String>;
}

/// Writes the SQL for one derived column
#[async_trait]
pub trait ColumnGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &ColumnRequest,
        schema_context: &str,
    ) -> CollaboratorResult<ColumnTransform>;
}

/// Returns schema context relevant to a piece of text
#[async_trait]
pub trait SchemaRetriever: Send + Sync {
    async fn retrieve(&self, text: &str, hint: Option<&str>) -> CollaboratorResult<String>;
}

/// Turns a result table into a natural-language answer
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        table: &str,
        sql: Option<&str>,
    ) -> CollaboratorResult<String>;
}

/// Grades a produced answer against a reference: 0, 1 or 2
#[async_trait]
pub trait AnswerJudge: Send + Sync {
    async fn score(&self, question: &str, reference: &str, produced: &str)
        -> CollaboratorResult<u8>;
}

/// The collaborator set a run is wired with.
///
/// Without a retriever, the environment falls back to a [`crate::CatalogRetriever`]
/// over its own schema catalog.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub query_generator: Arc<dyn QueryGenerator>,
    pub column_generator: Arc<dyn ColumnGenerator>,
    pub synthesizer: Arc<dyn AnswerSynthesizer>,
    pub retriever: Option<Arc<dyn SchemaRetriever>>,
    pub judge: Option<Arc<dyn AnswerJudge>>,
}
