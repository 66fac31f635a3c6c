//! Classifier verdicts, decision-outcome labels and confusion-matrix metrics.
//!
//! "Positive" means the classifier chose to query directly. The ground truth
//! is whether the planner found columns to generate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Verdict of the classification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The question can be answered with a query over existing columns
    DirectQuery,
    /// Derived columns must be materialized first
    Materialize,
}

/// Error returned when a verdict string matches neither verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictParseError(pub String);

impl fmt::Display for VerdictParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected needsDirectQuery or needsMaterialization, got '{}'",
            self.0
        )
    }
}

impl std::error::Error for VerdictParseError {}

impl FromStr for Verdict {
    type Err = VerdictParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "needsdirectquery" | "directquery" | "direct" => Ok(Verdict::DirectQuery),
            "needsmaterialization" | "materialization" | "materialize" => {
                Ok(Verdict::Materialize)
            }
            _ => Err(VerdictParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::DirectQuery => write!(f, "needsDirectQuery"),
            Verdict::Materialize => write!(f, "needsMaterialization"),
        }
    }
}

/// Decision-outcome label recorded per classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeLabel {
    #[serde(rename = "TP")]
    TruePositive,
    #[serde(rename = "FP")]
    FalsePositive,
    #[serde(rename = "TN")]
    TrueNegative,
    #[serde(rename = "FN")]
    FalseNegative,
}

impl OutcomeLabel {
    /// Compare a verdict against whether a non-empty plan exists.
    pub fn classify(verdict: Verdict, plan_exists: bool) -> Self {
        match (verdict, plan_exists) {
            (Verdict::DirectQuery, false) => OutcomeLabel::TruePositive,
            (Verdict::DirectQuery, true) => OutcomeLabel::FalsePositive,
            (Verdict::Materialize, true) => OutcomeLabel::TrueNegative,
            (Verdict::Materialize, false) => OutcomeLabel::FalseNegative,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeLabel::TruePositive => "TP",
            OutcomeLabel::FalsePositive => "FP",
            OutcomeLabel::TrueNegative => "TN",
            OutcomeLabel::FalseNegative => "FN",
        }
    }
}

impl fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confusion-matrix counts and derived metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    /// Count the last label of each question; questions without labels are ignored.
    pub fn from_last_labels<'a, I>(per_question: I) -> Self
    where
        I: IntoIterator<Item = &'a [OutcomeLabel]>,
    {
        let mut matrix = Self::default();
        for labels in per_question {
            if let Some(&last) = labels.last() {
                matrix.record(last);
            }
        }
        matrix
    }

    pub fn record(&mut self, label: OutcomeLabel) {
        match label {
            OutcomeLabel::TruePositive => self.true_positive += 1,
            OutcomeLabel::FalsePositive => self.false_positive += 1,
            OutcomeLabel::TrueNegative => self.true_negative += 1,
            OutcomeLabel::FalseNegative => self.false_negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
#[path = "outcome_test.rs"]
mod tests;
