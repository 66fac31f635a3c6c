//! Question flows.
//!
//! A flow moves through `Deciding`, then `NeedsMaterialization` or
//! `DirectQuery`, then `Executing`, and ends `Answered` or `Failed`. Each
//! flow owns its [`Session`]; flows share only the environment's pool and
//! catalog.

use crate::collaborators::CollaboratorError;
use crate::environment::Environment;
use crate::error::{EngineError, EngineResult, GenerationFailure};
use crate::format::format_table;
use crate::history::QueryHistory;
use crate::materializer::ColumnMaterializer;
use cq_core::config::{DecisionPolicy, MaterializationFailurePolicy};
use cq_core::{AvailableColumns, ColumnName, CoreError, GenerationPlan, OutcomeLabel, Verdict};
use cq_db::{Connector, QueryOutput};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Text handed to the synthesizer in place of a result table when a flow fails
pub const DEGRADED_ANSWER_PREFIX: &str =
    "There was an error during the answering of the question due to the following error: ";

/// A question to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Columns the question is known to need
    #[serde(default)]
    pub requested_columns: Vec<ColumnName>,
    #[serde(default)]
    pub reference_answer: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            requested_columns: Vec::new(),
            reference_answer: None,
        }
    }

    /// Set the requested columns. Blank names are dropped.
    pub fn requesting<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_columns = columns.into_iter().filter_map(ColumnName::try_new).collect();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_answer = Some(reference.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Deciding,
    NeedsMaterialization,
    DirectQuery,
    Executing,
    Answered,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Deciding => "deciding",
            FlowState::NeedsMaterialization => "needs_materialization",
            FlowState::DirectQuery => "direct_query",
            FlowState::Executing => "executing",
            FlowState::Answered => "answered",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything recorded about one question.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionOutcome {
    pub id: String,
    pub question: String,
    pub reference_answer: Option<String>,
    /// Never empty
    pub answer: String,
    pub score: Option<u8>,
    pub state: FlowState,
    pub verdict: Option<Verdict>,
    pub labels: Vec<OutcomeLabel>,
    pub plan: Vec<ColumnName>,
    pub materialized: Vec<ColumnName>,
    pub queries: QueryHistory,
    /// Every error met along the way, oldest first
    pub errors: Vec<String>,
    /// Formatted result table handed to the synthesizer
    pub table: Option<String>,
    /// Last query sent to the database
    pub sql: Option<String>,
}

impl QuestionOutcome {
    pub fn last_label(&self) -> Option<OutcomeLabel> {
        self.labels.last().copied()
    }

    pub fn is_answered(&self) -> bool {
        self.state == FlowState::Answered
    }
}

/// Per-flow mutable state. Created fresh for each question.
struct Session {
    available: AvailableColumns,
    state: FlowState,
    verdict: Option<Verdict>,
    labels: Vec<OutcomeLabel>,
    plan: Vec<ColumnName>,
    materialized: Vec<ColumnName>,
    history: QueryHistory,
    errors: Vec<String>,
    table: Option<String>,
    sql: Option<String>,
}

impl Session {
    fn new(available: AvailableColumns) -> Self {
        Self {
            available,
            state: FlowState::Deciding,
            verdict: None,
            labels: Vec::new(),
            plan: Vec::new(),
            materialized: Vec::new(),
            history: QueryHistory::new(),
            errors: Vec::new(),
            table: None,
            sql: None,
        }
    }

    fn enter(&mut self, question_id: &str, next: FlowState) {
        log::debug!("Question {}: {} -> {}", question_id, self.state, next);
        self.state = next;
    }

    fn into_outcome(self, question: &Question, answer: String, score: Option<u8>) -> QuestionOutcome {
        QuestionOutcome {
            id: question.id.clone(),
            question: question.text.clone(),
            reference_answer: question.reference_answer.clone(),
            answer,
            score,
            state: self.state,
            verdict: self.verdict,
            labels: self.labels,
            plan: self.plan,
            materialized: self.materialized,
            queries: self.history,
            errors: self.errors,
            table: self.table,
            sql: self.sql,
        }
    }
}

/// Drives question flows over a shared [`Environment`].
pub struct Orchestrator<C: Connector> {
    env: Arc<Environment<C>>,
    materializer: ColumnMaterializer<C>,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(env: Arc<Environment<C>>) -> Self {
        let materializer = ColumnMaterializer::new(
            env.pool.clone(),
            env.table.clone(),
            env.expected_rows,
            Arc::clone(&env.catalog),
            Arc::clone(&env.retriever),
            Arc::clone(&env.collaborators.column_generator),
        );
        Self { env, materializer }
    }

    pub fn environment(&self) -> &Environment<C> {
        &self.env
    }

    /// Answer one question.
    ///
    /// Only graph defects come back as `Err`; every other failure ends the
    /// flow in `Failed` with a degraded answer.
    pub async fn answer(&self, question: &Question) -> EngineResult<QuestionOutcome> {
        log::info!("Question {}: {}", question.id, question.text);
        let mut session = Session::new(self.env.catalog.available_columns());

        let answer = match self.drive(question, &mut session).await {
            Ok(answer) => {
                session.enter(&question.id, FlowState::Answered);
                answer
            }
            Err(e) if e.is_fatal() => {
                log::error!("Question {}: {}", question.id, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("Question {} failed: {}", question.id, e);
                session.errors.push(e.to_string());
                session.enter(&question.id, FlowState::Failed);
                self.degraded_answer(question, &e, session.sql.as_deref())
                    .await
            }
        };

        let score = self.score(question, &answer).await;
        Ok(session.into_outcome(question, answer, score))
    }

    /// Answer every question, at most `concurrency` at a time.
    ///
    /// Outcomes come back in input order. A graph defect stops the run.
    pub async fn answer_all(&self, questions: &[Question]) -> EngineResult<Vec<QuestionOutcome>> {
        self.answer_all_with(questions, |_| {}).await
    }

    /// Like [`Self::answer_all`], calling `on_done` as each outcome is collected.
    pub async fn answer_all_with<F>(
        &self,
        questions: &[Question],
        mut on_done: F,
    ) -> EngineResult<Vec<QuestionOutcome>>
    where
        F: FnMut(&QuestionOutcome),
    {
        let limit = self.env.settings.concurrency.max(1);
        let mut flows = stream::iter(questions.iter().map(|q| self.answer(q))).buffered(limit);

        let mut outcomes = Vec::with_capacity(questions.len());
        while let Some(result) = flows.next().await {
            let outcome = result?;
            on_done(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn drive(&self, question: &Question, session: &mut Session) -> EngineResult<String> {
        let graph = &self.env.graph;
        let outcome = graph.plan(&question.requested_columns, &session.available)?;
        session.plan = outcome.columns().to_vec();

        let hint = match outcome.as_plan() {
            Some(plan) if !plan.is_empty() => Some(graph.definitions_for(plan)?.join("\n")),
            _ => None,
        };
        let context = self.retrieve(&question.text, hint.as_deref()).await?;

        let policy = self.env.settings.decision_policy;
        let verdict = match self.classify(question, &context).await {
            Ok(verdict) => {
                let label = OutcomeLabel::classify(verdict, outcome.exists());
                log::info!("Question {}: {} ({})", question.id, verdict, label);
                session.verdict = Some(verdict);
                session.labels.push(label);
                Some(verdict)
            }
            Err(e) if policy == DecisionPolicy::Plan && !e.is_fatal() => {
                log::warn!("Question {}: {}", question.id, e);
                session.errors.push(e.to_string());
                None
            }
            Err(e) => return Err(e),
        };

        let materialize = match policy {
            DecisionPolicy::Verdict => verdict == Some(Verdict::Materialize),
            DecisionPolicy::Plan => true,
        };
        let context = match outcome.as_plan() {
            Some(plan) if materialize && !plan.is_empty() => {
                session.enter(&question.id, FlowState::NeedsMaterialization);
                self.materialize_plan(question, plan, session).await?;
                // New descriptions are in the catalog now.
                self.retrieve(&question.text, hint.as_deref()).await?
            }
            _ => {
                session.enter(&question.id, FlowState::DirectQuery);
                context
            }
        };

        session.enter(&question.id, FlowState::Executing);
        let output = self.execute_with_retries(question, &context, session).await?;
        let table = format_table(&output, self.env.settings.max_table_chars);
        session.table = Some(table.clone());
        self.synthesize(question, &table, session.sql.as_deref())
            .await
    }

    async fn retrieve(&self, text: &str, hint: Option<&str>) -> EngineResult<String> {
        self.env
            .retriever
            .retrieve(text, hint)
            .await
            .map_err(|e| collaborator("schema retriever", e))
    }

    /// Ask for a verdict, allowing one answer outside the vocabulary.
    async fn classify(&self, question: &Question, context: &str) -> EngineResult<Verdict> {
        let classifier = &self.env.collaborators.classifier;
        let mut rejected = String::new();
        for attempt in 1..=2 {
            let raw = classifier
                .classify(&question.text, context)
                .await
                .map_err(|e| collaborator("classifier", e))?;
            match raw.parse::<Verdict>() {
                Ok(verdict) => return Ok(verdict),
                Err(e) => {
                    log::warn!("Question {}: verdict rejected (attempt {}): {}", question.id, attempt, e);
                    rejected = raw;
                }
            }
        }
        Err(EngineError::ClassificationContract { answer: rejected })
    }

    async fn materialize_plan(
        &self,
        question: &Question,
        plan: &GenerationPlan,
        session: &mut Session,
    ) -> EngineResult<()> {
        let graph = &self.env.graph;
        let instructions = graph.instructions_for(plan)?;
        let fail_fast = self.env.settings.on_materialize_failure == MaterializationFailurePolicy::FailFast;
        let mut failed: HashSet<String> = HashSet::new();

        for (column, instruction) in plan.columns.iter().zip(instructions) {
            let blocked = graph
                .dependencies(column.as_str())
                .into_iter()
                .find(|dep| failed.contains(dep.as_str()));
            if let Some(dep) = blocked {
                let err = EngineError::generation(
                    column.as_str(),
                    GenerationFailure::DependencyUnavailable,
                    format!("'{dep}' was not materialized"),
                );
                log::warn!("Question {}: {}", question.id, err);
                session.errors.push(err.to_string());
                failed.insert(column.to_string());
                continue;
            }

            let spec = graph.spec(column.as_str()).ok_or_else(|| CoreError::UnknownColumn {
                name: column.to_string(),
            })?;
            match self.materializer.materialize(spec, instruction).await {
                Ok(_) => {
                    session.available.insert(column.clone());
                    session.materialized.push(column.clone());
                }
                Err(e) if e.is_fatal() || fail_fast => return Err(e),
                Err(e) => {
                    log::warn!("Question {}: {}", question.id, e);
                    session.errors.push(e.to_string());
                    failed.insert(column.to_string());
                }
            }
        }
        Ok(())
    }

    async fn execute_with_retries(
        &self,
        question: &Question,
        context: &str,
        session: &mut Session,
    ) -> EngineResult<QueryOutput> {
        let generator = &self.env.collaborators.query_generator;
        let max_attempts = self.env.settings.max_attempts;

        while session.history.len() < max_attempts {
            let attempt = session.history.len() + 1;
            let sql = match generator
                .generate(&question.text, context, session.history.attempts())
                .await
            {
                Ok(sql) => sql,
                Err(e) => {
                    let message = format!("query generation failed: {e}");
                    log::warn!("Question {} attempt {}: {}", question.id, attempt, message);
                    session.errors.push(message.clone());
                    session.history.record_failure(String::new(), message);
                    continue;
                }
            };

            if let Some(previous) = session.history.repeat_of(&sql) {
                log::warn!(
                    "Question {} attempt {} repeats attempt {}; not executed",
                    question.id,
                    attempt,
                    previous
                );
                session.history.record_non_progress(sql, previous);
                session.errors.extend(session.history.last_error());
                continue;
            }

            session.sql = Some(sql.clone());
            let lease = self.env.pool.acquire().await?;
            match self.env.executor.execute(lease, &sql).await {
                Ok(output) => {
                    log::info!("Question {} attempt {}: {} row(s)", question.id, attempt, output.rows.len());
                    session.history.record_success(sql);
                    return Ok(output);
                }
                Err(e) => {
                    log::info!("Question {} attempt {} failed: {}", question.id, attempt, e);
                    session.errors.push(e.to_string());
                    session.history.record_failure(sql, e.to_string());
                }
            }
        }

        Err(EngineError::RetryLimitExceeded {
            attempts: session.history.len(),
            last_error: session
                .history
                .last_error()
                .unwrap_or_else(|| "no query was attempted".to_string()),
        })
    }

    /// Synthesize an answer, retrying once.
    async fn synthesize(&self, question: &Question, table: &str, sql: Option<&str>) -> EngineResult<String> {
        let synthesizer = &self.env.collaborators.synthesizer;
        let mut last_error = String::new();
        for attempt in 1..=2 {
            match synthesizer.answer(&question.text, table, sql).await {
                Ok(answer) if !answer.trim().is_empty() => return Ok(answer),
                Ok(_) => last_error = "empty answer".to_string(),
                Err(e) => last_error = e.to_string(),
            }
            log::warn!("Question {}: answer synthesis attempt {} failed: {}", question.id, attempt, last_error);
        }
        Err(EngineError::Collaborator {
            collaborator: "answer synthesizer",
            message: last_error,
        })
    }

    async fn degraded_answer(&self, question: &Question, error: &EngineError, sql: Option<&str>) -> String {
        let table = format!("{DEGRADED_ANSWER_PREFIX}{error}");
        match self
            .env
            .collaborators
            .synthesizer
            .answer(&question.text, &table, sql)
            .await
        {
            Ok(answer) if !answer.trim().is_empty() => answer,
            Ok(_) => table,
            Err(e) => {
                log::warn!("Question {}: degraded answer synthesis failed: {}", question.id, e);
                table
            }
        }
    }

    async fn score(&self, question: &Question, answer: &str) -> Option<u8> {
        let judge = self.env.collaborators.judge.as_ref()?;
        let reference = question.reference_answer.as_deref()?;
        match judge.score(&question.text, reference, answer).await {
            Ok(score) => Some(score.min(2)),
            Err(e) => {
                log::warn!("Question {}: scoring failed: {}", question.id, e);
                None
            }
        }
    }
}

fn collaborator(name: &'static str, error: CollaboratorError) -> EngineError {
    EngineError::Collaborator {
        collaborator: name,
        message: error.to_string(),
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
