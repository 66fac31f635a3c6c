use super::*;

#[test]
fn test_parse_minimal_config() {
    let config: Config = serde_yaml::from_str("name: fines").unwrap();
    assert_eq!(config.name, "fines");
    assert_eq!(config.columns_file, "columns.yml");
    assert_eq!(config.database.path, ":memory:");
    assert_eq!(config.table.name, "event_log");
    assert_eq!(config.table.case_column, "case_concept_name");
    assert_eq!(config.table.timestamp_column, "time_timestamp");
    assert_eq!(config.table.row_index_column, "row_idx");
    assert_eq!(config.pool.size, 4);
    assert_eq!(config.executor.timeout(), Duration::from_secs(300));
    assert_eq!(config.executor.poll_interval_rows, 1000);
    assert_eq!(config.orchestrator.max_attempts, 4);
    assert_eq!(config.orchestrator.max_table_chars, 1500);
    assert_eq!(config.orchestrator.decision_policy, DecisionPolicy::Verdict);
    assert_eq!(
        config.orchestrator.on_materialize_failure,
        MaterializationFailurePolicy::Continue
    );
    assert_eq!(config.retrieval.max_documents, 12);
    config.validate().unwrap();
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
name: road_fines
columns_file: schema/columns.yml
database:
  path: data/fines.duckdb
table:
  name: fines
  source_csv: data/fines.csv
  expected_rows: 561470
pool:
  size: 2
executor:
  timeout_secs: 5
  poll_interval_rows: 100
orchestrator:
  max_attempts: 3
  concurrency: 8
  decision_policy: plan
  on_materialize_failure: fail_fast
retrieval:
  max_documents: 5
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();

    assert_eq!(config.table.expected_rows, Some(561470));
    assert_eq!(config.pool.size, 2);
    assert_eq!(config.orchestrator.decision_policy, DecisionPolicy::Plan);
    assert_eq!(
        config.orchestrator.on_materialize_failure,
        MaterializationFailurePolicy::FailFast
    );

    let root = Path::new("/srv/project");
    assert_eq!(
        config.columns_file_absolute(root),
        PathBuf::from("/srv/project/schema/columns.yml")
    );
    assert_eq!(
        config.database_path_absolute(root),
        "/srv/project/data/fines.duckdb"
    );
    assert_eq!(
        config.source_csv_absolute(root),
        Some(PathBuf::from("/srv/project/data/fines.csv"))
    );
}

#[test]
fn test_memory_database_path_untouched() {
    let config: Config = serde_yaml::from_str("name: x").unwrap();
    assert_eq!(config.database_path_absolute(Path::new("/tmp")), ":memory:");
}

#[test]
fn test_unknown_field_rejected() {
    let result: Result<Config, _> = serde_yaml::from_str("name: x\npool:\n  sizee: 3");
    assert!(result.is_err());
}

#[test]
fn test_validate_rejects_zero_pool() {
    let config: Config = serde_yaml::from_str("name: x\npool:\n  size: 0").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { ref message } if message.contains("pool.size")));
}

#[test]
fn test_validate_rejects_zero_attempts_and_timeout() {
    let config: Config =
        serde_yaml::from_str("name: x\norchestrator:\n  max_attempts: 0").unwrap();
    assert!(config.validate().is_err());

    let config: Config = serde_yaml::from_str("name: x\nexecutor:\n  timeout_secs: 0").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_same_case_and_timestamp_column() {
    let yaml = "name: x\ntable:\n  case_column: id\n  timestamp_column: id";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_always_available_columns() {
    let config: Config = serde_yaml::from_str("name: x").unwrap();
    let cols = config.table.always_available().unwrap();
    assert_eq!(cols, vec![
        ColumnName::new("case_concept_name"),
        ColumnName::new("time_timestamp")
    ]);
}

#[test]
fn test_load_from_dir_yml_and_yaml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("caseql.yaml"), "name: from_yaml").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.name, "from_yaml");

    std::fs::write(dir.path().join("caseql.yml"), "name: from_yml").unwrap();
    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.name, "from_yml");
}

#[test]
fn test_load_from_dir_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn test_load_reports_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caseql.yml");
    std::fs::write(&path, "name: [unterminated").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigParseError { .. }));
}
