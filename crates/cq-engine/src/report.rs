//! Outcome report of a question run.

use crate::error::{EngineError, EngineResult};
use crate::orchestrator::{FlowState, QuestionOutcome};
use chrono::{DateTime, Utc};
use cq_core::ConfusionMatrix;
use serde::Serialize;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Aggregate figures over every question of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub questions: usize,
    pub answered: usize,
    pub failed: usize,
    /// Counts from each question's last decision label
    pub matrix: ConfusionMatrix,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    /// Mean judge score over scored questions
    pub mean_score: Option<f64>,
}

impl ReportSummary {
    pub fn from_outcomes(outcomes: &[QuestionOutcome]) -> Self {
        let matrix = ConfusionMatrix::from_last_labels(outcomes.iter().map(|o| o.labels.as_slice()));
        let answered = outcomes
            .iter()
            .filter(|o| o.state == FlowState::Answered)
            .count();
        let scores: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| o.score)
            .map(f64::from)
            .collect();
        let mean_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };

        Self {
            questions: outcomes.len(),
            answered,
            failed: outcomes.len() - answered,
            matrix,
            precision: matrix.precision(),
            recall: matrix.recall(),
            f1: matrix.f1(),
            accuracy: matrix.accuracy(),
            mean_score,
        }
    }
}

/// Report written after a run
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub project: String,
    pub summary: ReportSummary,
    pub questions: Vec<QuestionOutcome>,
}

impl OutcomeReport {
    pub fn new(project: impl Into<String>, questions: Vec<QuestionOutcome>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            project: project.into(),
            summary: ReportSummary::from_outcomes(&questions),
            questions,
        }
    }

    /// Save the report as JSON, writing a temporary file and renaming it
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let report_error = |message: String| EngineError::Report {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| report_error(e.to_string()))?;
        }

        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).map_err(|e| report_error(e.to_string()))?;
        fs::write(&temp_path, json).map_err(|e| report_error(e.to_string()))?;
        fs::rename(&temp_path, path).map_err(|e| report_error(e.to_string()))?;

        log::info!("Report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;
