use super::*;
use crate::collaborators::{AnswerSynthesizer, CollaboratorResult, Collaborators};
use crate::scripted::Scenario;
use async_trait::async_trait;
use cq_core::{ColumnFile, Config, DependencyGraph};
use cq_db::{DuckDbConnector, QueryConnection};

const COLUMNS: &str = r#"
base_columns: [amount, expense, totalPaymentAmount]
columns:
  - name: duration
    type: integer
    depends_on: [case_concept_name, time_timestamp]
    instruction: Create a column called duration with the days between the first and last event of the case
  - name: expense_sum
    type: integer
    depends_on: [case_concept_name, expense]
    instruction: Create a column called expense_sum with the total expense of the case
  - name: amount_last
    type: integer
    depends_on: [case_concept_name, amount]
    instruction: Create a column called amount_last with the last amount of the case
  - name: maxtotalPaymentAmount
    type: integer
    depends_on: [case_concept_name, totalPaymentAmount]
    instruction: Create a column called maxtotalPaymentAmount with the largest total payment of the case
  - name: outstanding_balance
    type: integer
    depends_on: [amount_last, expense_sum, maxtotalPaymentAmount]
    instruction: Create a column called outstanding_balance as amount_last plus expense_sum minus maxtotalPaymentAmount
"#;

const SEED: &str = "
CREATE TABLE event_log (case_concept_name VARCHAR, time_timestamp TIMESTAMP, amount BIGINT, expense BIGINT, totalPaymentAmount BIGINT);
INSERT INTO event_log VALUES
    ('A', TIMESTAMP '2024-01-01 00:00:00', 100, 10, 0),
    ('A', TIMESTAMP '2024-01-11 00:00:00', 100, 5, 115),
    ('B', TIMESTAMP '2024-01-05 00:00:00', 50, 0, 0);
";

const TRANSFORMS: &str = r#"
columns:
  duration:
    sql: SELECT row_idx, CAST(date_diff('day', MIN(time_timestamp) OVER w, MAX(time_timestamp) OVER w) AS BIGINT) AS duration FROM event_log WINDOW w AS (PARTITION BY case_concept_name)
  expense_sum:
    sql: SELECT row_idx, CAST(SUM(expense) OVER (PARTITION BY case_concept_name) AS BIGINT) AS expense_sum FROM event_log
  amount_last:
    sql: SELECT row_idx, LAST_VALUE(amount) OVER (PARTITION BY case_concept_name ORDER BY time_timestamp ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING) AS amount_last FROM event_log
  maxtotalPaymentAmount:
    sql: SELECT row_idx, MAX(totalPaymentAmount) OVER (PARTITION BY case_concept_name) AS maxtotalPaymentAmount FROM event_log
  outstanding_balance:
    sql: SELECT row_idx, amount_last + expense_sum - maxtotalPaymentAmount AS outstanding_balance FROM event_log
"#;

fn config(extra: &str) -> Config {
    serde_yaml::from_str(&format!("name: test\npool:\n  size: 2\n{extra}")).unwrap()
}

/// Scenario with the shared transforms plus `questions` (a YAML list).
fn scenario(questions: &str) -> Scenario {
    Scenario::parse(&format!("questions:\n{questions}\n{TRANSFORMS}")).unwrap()
}

async fn orchestrator_with(
    config: Config,
    collaborators: Collaborators,
) -> Orchestrator<DuckDbConnector> {
    Orchestrator::new(Arc::new(environment_with(config, collaborators).await))
}

async fn environment_with(
    config: Config,
    collaborators: Collaborators,
) -> Environment<DuckDbConnector> {
    let file = ColumnFile::parse(COLUMNS).unwrap();
    let graph =
        DependencyGraph::from_column_file(&file, &config.table.always_available().unwrap()).unwrap();

    let connector = DuckDbConnector::in_memory().unwrap();
    {
        let mut conn = connector.connect().unwrap();
        conn.execute_batch(SEED).unwrap();
    }

    Environment::from_connector(&config, graph, connector, None, collaborators)
        .await
        .unwrap()
}

async fn orchestrator(scenario: &Scenario) -> Orchestrator<DuckDbConnector> {
    orchestrator_with(config(""), scenario.collaborators()).await
}

struct FailingSynthesizer;

#[async_trait]
impl AnswerSynthesizer for FailingSynthesizer {
    async fn answer(&self, _q: &str, _table: &str, _sql: Option<&str>) -> CollaboratorResult<String> {
        Err(CollaboratorError::new("synthesizer offline"))
    }
}

#[test]
fn test_requesting_drops_blank_columns() {
    let question = Question::new("q1", "How long?").requesting(["duration", "", "  ", "expense_sum"]);
    assert_eq!(
        question.requested_columns,
        vec![ColumnName::new("duration"), ColumnName::new("expense_sum")]
    );
}

#[tokio::test]
async fn test_environment_seeds_catalog_and_row_count() {
    let scenario = scenario("  []");
    let orchestrator = orchestrator(&scenario).await;
    let env = orchestrator.environment();

    assert_eq!(env.expected_rows, 3);
    assert!(env.catalog.contains("amount"));
    assert!(!env.catalog.contains("row_idx"));
    assert!(!env.catalog.contains("duration"));
}

#[tokio::test]
async fn test_materialize_then_answer() {
    let scenario = scenario(
        r#"  - id: q1
    text: What is the longest case?
    requested_columns: [duration]
    reference_answer: "10"
    verdicts: [needsMaterialization]
    queries: [SELECT MAX(duration) AS longest FROM event_log]"#,
    );
    let orchestrator = orchestrator(&scenario).await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert_eq!(outcome.state, FlowState::Answered);
    assert_eq!(outcome.verdict, Some(Verdict::Materialize));
    assert_eq!(outcome.labels, vec![OutcomeLabel::TrueNegative]);
    assert_eq!(outcome.plan, vec![ColumnName::new("duration")]);
    assert_eq!(outcome.materialized, vec![ColumnName::new("duration")]);
    assert_eq!(outcome.answer, "longest\n10");
    assert_eq!(outcome.score, Some(2));
    assert!(orchestrator.environment().catalog.contains("duration"));
}

#[tokio::test]
async fn test_direct_verdict_with_plan_is_false_positive() {
    let scenario = scenario(
        r#"  - id: q1
    text: What is the longest case?
    requested_columns: [duration]
    verdicts: [needsDirectQuery]
    queries: [SELECT MAX(duration) AS longest FROM event_log]"#,
    );
    let orchestrator = orchestrator(&scenario).await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert_eq!(outcome.labels, vec![OutcomeLabel::FalsePositive]);
    assert!(outcome.materialized.is_empty());
    assert_eq!(outcome.state, FlowState::Failed);
    assert!(outcome.answer.starts_with(DEGRADED_ANSWER_PREFIX));
    assert!(outcome.answer.contains("[E003]"));
}

#[tokio::test]
async fn test_plan_policy_materializes_despite_direct_verdict() {
    let scenario = scenario(
        r#"  - id: q1
    text: What is the longest case?
    requested_columns: [duration]
    verdicts: [needsDirectQuery]
    queries: [SELECT MAX(duration) AS longest FROM event_log]"#,
    );
    let orchestrator = orchestrator_with(
        config("orchestrator:\n  decision_policy: plan\n"),
        scenario.collaborators(),
    )
    .await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert_eq!(outcome.labels, vec![OutcomeLabel::FalsePositive]);
    assert_eq!(outcome.materialized, vec![ColumnName::new("duration")]);
    assert_eq!(outcome.state, FlowState::Answered);
}

#[tokio::test]
async fn test_unparsable_verdict_is_retried_once() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [maybe, direct]
    queries: [SELECT COUNT(*) AS events FROM event_log]"#,
    );
    let orchestrator = orchestrator(&scenario).await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert_eq!(outcome.state, FlowState::Answered);
    assert_eq!(outcome.labels, vec![OutcomeLabel::TruePositive]);
    assert_eq!(outcome.answer, "events\n3");
}

#[tokio::test]
async fn test_classification_contract_violation() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [maybe, perhaps]
    queries: [SELECT COUNT(*) AS events FROM event_log]"#,
    );

    let strict = orchestrator(&scenario).await;
    let outcome = strict.answer(&scenario.questions()[0]).await.unwrap();
    assert_eq!(outcome.state, FlowState::Failed);
    assert!(outcome.labels.is_empty());
    assert!(outcome.errors.iter().any(|e| e.contains("[E002]")));
    assert!(outcome.answer.contains("'perhaps'"));

    // Under the plan policy the defect is only logged.
    let lenient = orchestrator_with(
        config("orchestrator:\n  decision_policy: plan\n"),
        scenario.collaborators(),
    )
    .await;
    let outcome = lenient.answer(&scenario.questions()[0]).await.unwrap();
    assert_eq!(outcome.state, FlowState::Answered);
    assert_eq!(outcome.verdict, None);
}

#[tokio::test]
async fn test_continue_skips_dependents_of_failed_column() {
    let mut scenario = scenario(
        r#"  - id: q1
    text: What is the outstanding balance of case B?
    requested_columns: [outstanding_balance]
    verdicts: [needsMaterialization]
    queries: [SELECT DISTINCT outstanding_balance FROM event_log WHERE case_concept_name = 'B']"#,
    );
    scenario.columns.remove("expense_sum");
    let orchestrator = orchestrator(&scenario).await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert_eq!(
        outcome.materialized,
        vec![ColumnName::new("amount_last"), ColumnName::new("maxtotalPaymentAmount")]
    );
    assert!(outcome.errors[0].contains("expense_sum"));
    assert!(outcome.errors[1].contains("outstanding_balance"));
    assert!(outcome.errors[1].contains("dependency unavailable"));
    assert_eq!(outcome.state, FlowState::Failed);
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let mut scenario = scenario(
        r#"  - id: q1
    text: What is the outstanding balance of case B?
    requested_columns: [outstanding_balance]
    verdicts: [needsMaterialization]
    queries: [SELECT 1]"#,
    );
    scenario.columns.remove("expense_sum");
    let orchestrator = orchestrator_with(
        config("orchestrator:\n  on_materialize_failure: fail_fast\n"),
        scenario.collaborators(),
    )
    .await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert!(outcome.materialized.is_empty());
    assert_eq!(outcome.state, FlowState::Failed);
    assert!(outcome.queries.is_empty());
    assert!(outcome.answer.contains("[E001]"));
}

#[tokio::test]
async fn test_repeated_query_is_not_executed() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [direct]
    queries: ["SELECT COUNT(*) FROM missing_table"]"#,
    );
    let orchestrator = orchestrator(&scenario).await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    let attempts = outcome.queries.attempts();
    assert_eq!(attempts.len(), 4);
    assert!(matches!(attempts[0].status, crate::history::AttemptStatus::Failed { .. }));
    for attempt in &attempts[1..] {
        assert_eq!(
            attempt.status,
            crate::history::AttemptStatus::NonProgress { repeat_of: 1 }
        );
    }
    assert_eq!(outcome.state, FlowState::Failed);
}

#[tokio::test]
async fn test_timed_out_attempt_is_recorded_and_retried() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [direct]
    queries:
      - SELECT SUM(hash(n)) FROM range(100000000000) t(n)
      - SELECT COUNT(*) AS events FROM event_log"#,
    );
    let mut env = environment_with(config(""), scenario.collaborators()).await;
    env.executor = cq_db::QueryExecutor::new(std::time::Duration::from_millis(200));
    let orchestrator = Orchestrator::new(Arc::new(env));

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    let attempts = outcome.queries.attempts();
    assert_eq!(attempts.len(), 2);
    match &attempts[0].status {
        crate::history::AttemptStatus::Failed { error } => {
            assert!(error.contains("[D004]"), "unexpected error: {error}");
        }
        other => panic!("expected a failed attempt, got {other:?}"),
    }
    assert!(attempts[1].succeeded());
    assert_eq!(outcome.state, FlowState::Answered);
    assert_eq!(outcome.answer, "events\n3");
    assert_eq!(orchestrator.environment().pool.available(), 2);
}

#[tokio::test]
async fn test_failed_synthesizer_still_answers() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [direct]
    queries: [SELECT COUNT(*) AS events FROM event_log]"#,
    );
    let mut collaborators = scenario.collaborators();
    collaborators.synthesizer = Arc::new(FailingSynthesizer);
    let orchestrator = orchestrator_with(config(""), collaborators).await;

    let outcome = orchestrator.answer(&scenario.questions()[0]).await.unwrap();

    assert_eq!(outcome.state, FlowState::Failed);
    assert_eq!(outcome.table.as_deref(), Some("events\n3"));
    assert!(outcome.answer.starts_with(DEGRADED_ANSWER_PREFIX));
    assert!(outcome.answer.contains("synthesizer offline"));
}

#[tokio::test]
async fn test_unknown_column_halts_run() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [direct]
    queries: [SELECT COUNT(*) AS events FROM event_log]
  - id: q2
    text: What is the mystery value?
    requested_columns: [mystery]
    verdicts: [direct]
    queries: [SELECT 1]"#,
    );
    let orchestrator = orchestrator(&scenario).await;
    let questions = scenario.questions();

    let err = orchestrator.answer(&questions[1]).await.unwrap_err();
    assert!(err.is_fatal());

    let err = orchestrator.answer_all(&questions).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::UnknownColumn { ref name }) if name == "mystery"
    ));
}

#[tokio::test]
async fn test_answer_all_keeps_input_order() {
    let scenario = scenario(
        r#"  - id: q1
    text: How many events are there?
    verdicts: [direct]
    queries: [SELECT COUNT(*) AS events FROM event_log]
  - id: q2
    text: How many cases are there?
    verdicts: [direct]
    queries: [SELECT COUNT(DISTINCT case_concept_name) AS cases FROM event_log]
  - id: q3
    text: What is the longest case?
    requested_columns: [duration]
    verdicts: [materialize]
    queries: [SELECT MAX(duration) AS longest FROM event_log]"#,
    );
    let orchestrator = orchestrator(&scenario).await;

    let mut seen = Vec::new();
    let outcomes = orchestrator
        .answer_all_with(&scenario.questions(), |o| seen.push(o.id.clone()))
        .await
        .unwrap();

    let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q3"]);
    assert_eq!(seen, vec!["q1", "q2", "q3"]);
    assert_eq!(outcomes[1].answer, "cases\n2");
    assert!(outcomes.iter().all(QuestionOutcome::is_answered));
}
