//! Generation plans and the available-columns set.

use crate::column_name::ColumnName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Columns currently materialized in the persisted table.
///
/// Only grows: there is no way to remove a column once inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailableColumns(BTreeSet<ColumnName>);

impl AvailableColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a column, returning `true` if it was not present.
    pub fn insert(&mut self, name: ColumnName) -> bool {
        self.0.insert(name)
    }

    pub fn extend<I: IntoIterator<Item = ColumnName>>(&mut self, names: I) {
        self.0.extend(names);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnName> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ColumnName> for AvailableColumns {
    fn from_iter<I: IntoIterator<Item = ColumnName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered list of columns to generate before a query can run.
///
/// Every column's dependencies are either available or earlier in `columns`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    /// Columns to generate, dependencies first
    pub columns: Vec<ColumnName>,

    /// Missing columns left out because a dependency could not be satisfied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<ColumnName>,
}

impl GenerationPlan {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[cfg(test)]
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Result of planning a requested column set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    /// Every requested column is already available
    NotNeeded,
    /// Columns must be generated first
    Plan(GenerationPlan),
}

impl PlanOutcome {
    /// Planned columns; empty when no plan is needed.
    pub fn columns(&self) -> &[ColumnName] {
        match self {
            PlanOutcome::NotNeeded => &[],
            PlanOutcome::Plan(plan) => &plan.columns,
        }
    }

    /// Whether a plan with at least one column exists.
    pub fn exists(&self) -> bool {
        !self.columns().is_empty()
    }

    pub fn as_plan(&self) -> Option<&GenerationPlan> {
        match self {
            PlanOutcome::NotNeeded => None,
            PlanOutcome::Plan(plan) => Some(plan),
        }
    }
}
