use super::*;
use cq_core::config::TableConfig;

fn catalog() -> Arc<SchemaCatalog> {
    let catalog = SchemaCatalog::new("Columns:");
    catalog.register(ColumnName::new("amount"), "- 'amount' (BIGINT)");
    catalog.register(ColumnName::new("expense"), "- 'expense' (BIGINT)");
    catalog.register(ColumnName::new("duration"), "- 'duration' (int): case length");
    Arc::new(catalog)
}

#[test]
fn test_header_names_table_columns() {
    let table = EventTable::from_config(&TableConfig::default());
    let catalog = SchemaCatalog::for_table(&table);
    assert!(catalog.header().contains("'event_log'"));
    assert!(catalog.header().contains("'case_concept_name'"));
    assert!(catalog.header().contains("'time_timestamp'"));
    assert!(catalog.is_empty());
}

#[test]
fn test_reregistration_keeps_position_and_latest_text() {
    let catalog = catalog();
    catalog.register(ColumnName::new("amount"), "- 'amount' (BIGINT): fine amount");

    let docs = catalog.documents();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0].column, "amount");
    assert_eq!(docs[0].text, "- 'amount' (BIGINT): fine amount");
    assert!(catalog.contains("duration"));
    assert!(catalog.available_columns().contains("expense"));
}

#[test]
fn test_mentioned_columns_come_first() {
    let retriever = CatalogRetriever::new(catalog(), 10);
    let text = retriever.render("What is the average Duration per case?", None);

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Columns:");
    assert_eq!(lines[1], "- 'duration' (int): case length");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_hint_counts_as_mention_and_limit_applies() {
    let retriever = CatalogRetriever::new(catalog(), 1);
    let text = retriever.render("total cost", Some("sum of expense per case"));
    assert_eq!(text, "Columns:\n- 'expense' (BIGINT)");
}

#[tokio::test]
async fn test_retrieve_uses_render() {
    let retriever = CatalogRetriever::new(catalog(), 2);
    let text = retriever.retrieve("amount", None).await.unwrap();
    assert_eq!(text, "Columns:\n- 'amount' (BIGINT)\n- 'expense' (BIGINT)");
}
