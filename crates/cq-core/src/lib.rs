//! cq-core - Core library for caseql
//!
//! This crate provides column names and the column registry, the column
//! dependency graph and generation planner, decision-outcome bookkeeping and
//! configuration parsing shared by all caseql components.

pub mod column;
pub mod column_name;
pub mod config;
pub mod error;
pub mod graph;
mod newtype_string;
pub mod outcome;
pub mod plan;

pub use column::{ColumnEntry, ColumnFile, ColumnRegistry, ColumnSpec, StorageKind};
pub use column_name::ColumnName;
pub use config::{Config, DecisionPolicy, MaterializationFailurePolicy};
pub use error::{CoreError, CoreResult};
pub use graph::DependencyGraph;
pub use outcome::{ConfusionMatrix, OutcomeLabel, Verdict, VerdictParseError};
pub use plan::{AvailableColumns, GenerationPlan, PlanOutcome};
