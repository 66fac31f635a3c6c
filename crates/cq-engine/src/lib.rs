//! cq-engine - Question orchestration for caseql
//!
//! This crate wires the dependency graph and the database layer to the
//! text-generation collaborators: it materializes derived columns, runs the
//! final query with bounded retries, and records decision outcomes in a
//! report.

pub mod catalog;
pub mod collaborators;
pub mod environment;
pub mod error;
pub mod format;
pub mod history;
pub mod materializer;
pub mod orchestrator;
pub mod report;
pub mod scripted;

pub use catalog::{CatalogEntry, CatalogRetriever, SchemaCatalog};
pub use collaborators::{
    AnswerJudge, AnswerSynthesizer, Classifier, CollaboratorError, CollaboratorResult, Collaborators,
    ColumnGenerator, ColumnRequest, ColumnTransform, QueryGenerator, SchemaRetriever,
};
pub use environment::Environment;
pub use error::{EngineError, EngineResult, GenerationFailure};
pub use format::format_table;
pub use history::{Attempt, AttemptStatus, QueryHistory};
pub use materializer::ColumnMaterializer;
pub use orchestrator::{FlowState, Orchestrator, Question, QuestionOutcome, DEGRADED_ANSWER_PREFIX};
pub use report::{OutcomeReport, ReportSummary};
pub use scripted::Scenario;
