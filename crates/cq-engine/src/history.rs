//! Per-question record of attempted queries.

use serde::Serialize;

/// Outcome of one query attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    Failed { error: String },
    /// Same text as an earlier attempt; not executed
    NonProgress { repeat_of: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: usize,
    pub sql: String,
    #[serde(flatten)]
    pub status: AttemptStatus,
}

impl Attempt {
    /// Error text for failed or non-progress attempts
    pub fn error(&self) -> Option<String> {
        match &self.status {
            AttemptStatus::Succeeded => None,
            AttemptStatus::Failed { error } => Some(error.clone()),
            AttemptStatus::NonProgress { repeat_of } => Some(format!(
                "query repeats attempt {repeat_of} without changes"
            )),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, AttemptStatus::Succeeded)
    }
}

/// Collapse whitespace runs and drop a trailing semicolon.
pub fn normalize_query(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(';').trim_end().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryHistory {
    attempts: Vec<Attempt>,
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Number of an earlier unsuccessful attempt with the same normalized text.
    pub fn repeat_of(&self, sql: &str) -> Option<usize> {
        let wanted = normalize_query(sql);
        self.attempts
            .iter()
            .find(|a| !a.succeeded() && normalize_query(&a.sql) == wanted)
            .map(|a| a.number)
    }

    pub fn record_success(&mut self, sql: impl Into<String>) {
        self.push(sql.into(), AttemptStatus::Succeeded);
    }

    pub fn record_failure(&mut self, sql: impl Into<String>, error: impl Into<String>) {
        self.push(
            sql.into(),
            AttemptStatus::Failed {
                error: error.into(),
            },
        );
    }

    pub fn record_non_progress(&mut self, sql: impl Into<String>, repeat_of: usize) {
        self.push(sql.into(), AttemptStatus::NonProgress { repeat_of });
    }

    fn push(&mut self, sql: String, status: AttemptStatus) {
        let number = self.attempts.len() + 1;
        self.attempts.push(Attempt {
            number,
            sql,
            status,
        });
    }

    pub fn last_error(&self) -> Option<String> {
        self.attempts.iter().rev().find_map(Attempt::error)
    }

    /// Error text of every unsuccessful attempt, oldest first
    #[cfg(test)]
    pub(crate) fn errors(&self) -> Vec<String> {
        self.attempts.iter().filter_map(Attempt::error).collect()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
