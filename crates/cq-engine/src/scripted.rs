//! Replay collaborators driven by a YAML scenario file.
//!
//! A scenario lists questions with their scripted verdicts and candidate
//! queries, plus one transform per derived column. It lets a question set
//! run end to end without a language model.

use crate::collaborators::{
    AnswerJudge, AnswerSynthesizer, Classifier, CollaboratorError, CollaboratorResult, Collaborators,
    ColumnGenerator, ColumnRequest, ColumnTransform, QueryGenerator,
};
use crate::error::{EngineError, EngineResult};
use crate::history::Attempt;
use crate::orchestrator::Question;
use async_trait::async_trait;
use cq_core::ColumnName;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A scripted question
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedQuestion {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub requested_columns: Vec<ColumnName>,
    #[serde(default)]
    pub reference_answer: Option<String>,
    /// Classifier answers, replayed in order; the last one repeats
    #[serde(default)]
    pub verdicts: Vec<String>,
    /// Candidate queries, one per attempt; the last one repeats
    #[serde(default)]
    pub queries: Vec<String>,
}

/// A scripted column transform
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedColumn {
    pub sql: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub questions: Vec<ScriptedQuestion>,
    #[serde(default)]
    pub columns: BTreeMap<String, ScriptedColumn>,
}

impl Scenario {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Scenario(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| EngineError::Scenario(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> EngineResult<Self> {
        let scenario: Scenario =
            serde_yaml::from_str(content).map_err(|e| EngineError::Scenario(e.to_string()))?;

        let mut seen = HashMap::new();
        for question in &scenario.questions {
            if let Some(previous) = seen.insert(question.text.as_str(), question.id.as_str()) {
                return Err(EngineError::Scenario(format!(
                    "questions {} and {} have the same text",
                    previous, question.id
                )));
            }
        }
        Ok(scenario)
    }

    pub fn questions(&self) -> Vec<Question> {
        self.questions
            .iter()
            .map(|q| Question {
                id: q.id.clone(),
                text: q.text.clone(),
                requested_columns: q.requested_columns.clone(),
                reference_answer: q.reference_answer.clone(),
            })
            .collect()
    }

    /// Replay collaborators for this scenario, with the echo synthesizer and
    /// the containment judge.
    pub fn collaborators(&self) -> Collaborators {
        let script = Arc::new(self.clone());
        Collaborators {
            classifier: Arc::new(ScriptedClassifier::new(Arc::clone(&script))),
            query_generator: Arc::new(ScriptedQueryGenerator {
                script: Arc::clone(&script),
            }),
            column_generator: Arc::new(ScriptedColumnGenerator { script }),
            synthesizer: Arc::new(EchoSynthesizer),
            retriever: None,
            judge: Some(Arc::new(ContainmentJudge)),
        }
    }

    fn question(&self, text: &str) -> CollaboratorResult<&ScriptedQuestion> {
        self.questions
            .iter()
            .find(|q| q.text == text)
            .ok_or_else(|| CollaboratorError::new(format!("no scripted question '{text}'")))
    }
}

pub struct ScriptedClassifier {
    script: Arc<Scenario>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedClassifier {
    pub fn new(script: Arc<Scenario>) -> Self {
        Self {
            script,
            calls: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, question: &str, _schema_context: &str) -> CollaboratorResult<String> {
        let scripted = self.script.question(question)?;
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            let count = calls.entry(question.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };
        replay(&scripted.verdicts, call)
            .ok_or_else(|| CollaboratorError::new(format!("no verdict scripted for {}", scripted.id)))
    }
}

pub struct ScriptedQueryGenerator {
    script: Arc<Scenario>,
}

#[async_trait]
impl QueryGenerator for ScriptedQueryGenerator {
    async fn generate(
        &self,
        question: &str,
        _schema_context: &str,
        prior: &[Attempt],
    ) -> CollaboratorResult<String> {
        let scripted = self.script.question(question)?;
        replay(&scripted.queries, prior.len())
            .ok_or_else(|| CollaboratorError::new(format!("no query scripted for {}", scripted.id)))
    }
}

pub struct ScriptedColumnGenerator {
    script: Arc<Scenario>,
}

#[async_trait]
impl ColumnGenerator for ScriptedColumnGenerator {
    async fn generate(
        &self,
        request: &ColumnRequest,
        _schema_context: &str,
    ) -> CollaboratorResult<ColumnTransform> {
        let column = self
            .script
            .columns
            .get(request.column.as_str())
            .ok_or_else(|| {
                CollaboratorError::new(format!("no transform scripted for {}", request.column))
            })?;
        Ok(ColumnTransform {
            sql: column.sql.clone(),
            description: column.description.clone(),
        })
    }
}

/// Answers with the table it was given.
pub struct EchoSynthesizer;

#[async_trait]
impl AnswerSynthesizer for EchoSynthesizer {
    async fn answer(&self, _question: &str, table: &str, _sql: Option<&str>) -> CollaboratorResult<String> {
        Ok(table.to_string())
    }
}

/// Scores 2 when the reference appears in the answer, 0 otherwise.
pub struct ContainmentJudge;

#[async_trait]
impl AnswerJudge for ContainmentJudge {
    async fn score(&self, _question: &str, reference: &str, produced: &str) -> CollaboratorResult<u8> {
        let reference = reference.trim().to_lowercase();
        if !reference.is_empty() && produced.to_lowercase().contains(&reference) {
            Ok(2)
        } else {
            Ok(0)
        }
    }
}

fn replay(items: &[String], index: usize) -> Option<String> {
    items.get(index).or_else(|| items.last()).cloned()
}

#[cfg(test)]
#[path = "scripted_test.rs"]
mod tests;
