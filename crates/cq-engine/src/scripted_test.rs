use super::*;

const SCENARIO: &str = r#"
questions:
  - id: q1
    text: How long do cases take on average?
    requested_columns: [duration]
    reference_answer: "1.5"
    verdicts: [maybe, needsMaterialization]
    queries:
      - SELECT AVG(durationn) FROM event_log
      - SELECT AVG(duration) FROM event_log
columns:
  duration:
    sql: SELECT row_idx, 1 AS duration FROM event_log
"#;

fn scenario() -> Scenario {
    Scenario::parse(SCENARIO).unwrap()
}

#[test]
fn test_parse_and_questions() {
    let scenario = scenario();
    let questions = scenario.questions();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].id, "q1");
    assert_eq!(questions[0].requested_columns, vec![ColumnName::new("duration")]);
    assert_eq!(questions[0].reference_answer.as_deref(), Some("1.5"));
}

#[test]
fn test_duplicate_question_text_rejected() {
    let err = Scenario::parse(
        "questions:\n  - {id: a, text: same}\n  - {id: b, text: same}\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("a and b"));
}

#[test]
fn test_unknown_field_rejected() {
    assert!(Scenario::parse("questions: []\nextra: 1\n").is_err());
}

#[tokio::test]
async fn test_classifier_replays_then_repeats_last() {
    let collaborators = scenario().collaborators();
    let text = "How long do cases take on average?";

    let first = collaborators.classifier.classify(text, "").await.unwrap();
    let second = collaborators.classifier.classify(text, "").await.unwrap();
    let third = collaborators.classifier.classify(text, "").await.unwrap();

    assert_eq!(first, "maybe");
    assert_eq!(second, "needsMaterialization");
    assert_eq!(third, "needsMaterialization");
    assert!(collaborators.classifier.classify("unknown?", "").await.is_err());
}

#[tokio::test]
async fn test_query_generator_follows_attempt_count() {
    let collaborators = scenario().collaborators();
    let text = "How long do cases take on average?";
    let mut history = crate::history::QueryHistory::new();

    let first = collaborators.query_generator.generate(text, "", history.attempts()).await.unwrap();
    assert_eq!(first, "SELECT AVG(durationn) FROM event_log");

    history.record_failure(first, "no column durationn");
    let second = collaborators.query_generator.generate(text, "", history.attempts()).await.unwrap();
    assert_eq!(second, "SELECT AVG(duration) FROM event_log");
}

#[tokio::test]
async fn test_column_generator_and_judge() {
    let collaborators = scenario().collaborators();
    let request = ColumnRequest {
        column: ColumnName::new("duration"),
        kind: cq_core::StorageKind::Integer,
        instruction: "Create a column called duration".to_string(),
        table: "event_log".to_string(),
        row_index_column: "row_idx".to_string(),
    };
    let transform = collaborators.column_generator.generate(&request, "").await.unwrap();
    assert!(transform.sql.contains("AS duration"));

    let missing = ColumnRequest {
        column: ColumnName::new("fully_paid"),
        ..request
    };
    assert!(collaborators.column_generator.generate(&missing, "").await.is_err());

    let judge = collaborators.judge.unwrap();
    assert_eq!(judge.score("q", "1.5", "avg\n1.5").await.unwrap(), 2);
    assert_eq!(judge.score("q", "1.5", "avg\n2").await.unwrap(), 0);
}
