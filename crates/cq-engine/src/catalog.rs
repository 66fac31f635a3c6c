//! Append-only catalog of column descriptions and the retriever built on it.

use crate::collaborators::{CollaboratorResult, SchemaRetriever};
use async_trait::async_trait;
use cq_core::{AvailableColumns, ColumnName};
use cq_db::EventTable;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// One catalog document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub column: ColumnName,
    pub text: String,
}

/// Column descriptions shared by every question flow.
///
/// Entries are only ever appended. A column registered twice keeps its first
/// position and shows its latest text.
#[derive(Debug)]
pub struct SchemaCatalog {
    header: String,
    entries: RwLock<Vec<CatalogEntry>>,
}

impl SchemaCatalog {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Catalog whose header names the table and its case and timestamp columns
    pub fn for_table(table: &EventTable) -> Self {
        Self::new(format!(
            "The table '{}' is an event log with one row per event. \
             '{}' identifies the case and '{}' is the event timestamp. \
             '{}' is the row index. Columns:",
            table.name, table.case_column, table.timestamp_column, table.row_index_column
        ))
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn register(&self, column: ColumnName, text: impl Into<String>) {
        let text = text.into();
        log::debug!("Catalog: registering {}", column);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(CatalogEntry { column, text });
    }

    /// Latest document per column, in first-registration order
    pub fn documents(&self) -> Vec<CatalogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut order: Vec<CatalogEntry> = Vec::new();
        for entry in entries.iter() {
            match order.iter_mut().find(|e| e.column == entry.column) {
                Some(existing) => existing.text = entry.text.clone(),
                None => order.push(entry.clone()),
            }
        }
        order
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|e| e.column == column)
    }

    /// Every column with a catalog document
    pub fn available_columns(&self) -> AvailableColumns {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.column.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Keyword retriever over a [`SchemaCatalog`].
///
/// Columns whose names appear in the text or hint come first, then the rest
/// in catalog order, up to `max_documents`.
pub struct CatalogRetriever {
    catalog: Arc<SchemaCatalog>,
    max_documents: usize,
}

impl CatalogRetriever {
    pub fn new(catalog: Arc<SchemaCatalog>, max_documents: usize) -> Self {
        Self {
            catalog,
            max_documents,
        }
    }

    pub fn render(&self, text: &str, hint: Option<&str>) -> String {
        let tokens: HashSet<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .chain(
                hint.unwrap_or_default()
                    .split(|c: char| !(c.is_alphanumeric() || c == '_')),
            )
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let (mentioned, rest): (Vec<_>, Vec<_>) = self
            .catalog
            .documents()
            .into_iter()
            .partition(|e| tokens.contains(&e.column.as_str().to_lowercase()));

        let mut out = self.catalog.header().to_string();
        for entry in mentioned.into_iter().chain(rest).take(self.max_documents) {
            out.push('\n');
            out.push_str(&entry.text);
        }
        out
    }
}

#[async_trait]
impl SchemaRetriever for CatalogRetriever {
    async fn retrieve(&self, text: &str, hint: Option<&str>) -> CollaboratorResult<String> {
        Ok(self.render(text, hint))
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
