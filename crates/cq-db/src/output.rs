//! Materialized query results.

/// Describes one column of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Result of one query: column descriptors and string-coerced rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<String>>,
}

impl QueryOutput {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First value of the first row, for single-value queries.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first().and_then(|r| r.first()).map(String::as_str)
    }
}
