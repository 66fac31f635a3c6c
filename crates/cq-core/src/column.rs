//! Derived column declarations and the append-only column registry.
//!
//! Columns are declared in a YAML column file (`columns.yml`) together with
//! their dependencies, a generation instruction for the column generator and
//! a human-readable definition.

use crate::column_name::ColumnName;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Instruction prefixes stripped when deriving a definition from an instruction.
const INSTRUCTION_PREFIXES: &[&str] = &["Create a column called ", "Create column called "];

/// Declared storage kind of a derived column.
///
/// Derived columns are fixed-width: floating point, decimal and text results
/// are never accepted for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Integer,
    Boolean,
    Timestamp,
}

impl StorageKind {
    /// SQL type used when the column is added to the event table.
    pub fn sql_type(self) -> &'static str {
        match self {
            StorageKind::Integer => "BIGINT",
            StorageKind::Boolean => "BOOLEAN",
            StorageKind::Timestamp => "TIMESTAMP",
        }
    }

    /// Short label used in catalog descriptions, e.g. `- 'duration' (int): ...`.
    pub fn short_label(self) -> &'static str {
        match self {
            StorageKind::Integer => "int",
            StorageKind::Boolean => "bool",
            StorageKind::Timestamp => "datetime",
        }
    }

    /// Whether a column reported by the engine with `data_type` may be stored
    /// as this kind.
    pub fn accepts(self, data_type: &str) -> bool {
        let ty = data_type.trim().to_ascii_uppercase();
        match self {
            StorageKind::Integer => matches!(
                ty.as_str(),
                "TINYINT"
                    | "SMALLINT"
                    | "INTEGER"
                    | "INT"
                    | "BIGINT"
                    | "HUGEINT"
                    | "UTINYINT"
                    | "USMALLINT"
                    | "UINTEGER"
                    | "UBIGINT"
                    | "UHUGEINT"
            ),
            StorageKind::Boolean => ty == "BOOLEAN" || ty == "BOOL",
            StorageKind::Timestamp => ty.starts_with("TIMESTAMP") || ty == "DATE",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Integer => write!(f, "integer"),
            StorageKind::Boolean => write!(f, "boolean"),
            StorageKind::Timestamp => write!(f, "timestamp"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" => Ok(StorageKind::Integer),
            "boolean" | "bool" => Ok(StorageKind::Boolean),
            "timestamp" | "datetime" => Ok(StorageKind::Timestamp),
            _ => Err(CoreError::InvalidStorageKind {
                value: s.to_string(),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for StorageKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A derivable column with everything needed to generate and describe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: ColumnName,
    pub kind: StorageKind,
    /// Direct dependencies (columns that must exist before this one)
    pub depends_on: Vec<ColumnName>,
    /// Free-text instruction consumed by the column generator
    pub instruction: String,
    /// Human-readable definition used as planning context
    pub definition: String,
    /// Catalog text registered once the column is materialized
    pub description: Option<String>,
}

impl ColumnSpec {
    /// Build a spec, deriving the definition from the instruction.
    pub fn new(
        name: ColumnName,
        kind: StorageKind,
        depends_on: Vec<ColumnName>,
        instruction: impl Into<String>,
    ) -> Self {
        let instruction = instruction.into();
        let definition = derive_definition(&instruction);
        Self {
            name,
            kind,
            depends_on,
            instruction,
            definition,
            description: None,
        }
    }

    /// Catalog description for this column.
    ///
    /// Uses the declared description if present, otherwise renders
    /// `- 'name' (kind): definition`.
    pub fn description_text(&self) -> String {
        match &self.description {
            Some(d) => d.clone(),
            None => format!(
                "- '{}' ({}): {}",
                self.name,
                self.kind.short_label(),
                self.definition
            ),
        }
    }
}

/// Strip the "Create a column called " boilerplate off an instruction.
pub fn derive_definition(instruction: &str) -> String {
    let trimmed = instruction.trim();
    for prefix in INSTRUCTION_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    trimmed.to_string()
}

/// Registry of derivable columns, keyed by name, in declaration order.
///
/// Append-only: columns can be registered but never removed or replaced.
#[derive(Debug, Default, Clone)]
pub struct ColumnRegistry {
    columns: Vec<ColumnSpec>,
    index: HashMap<ColumnName, usize>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a column; fails if the name is already taken.
    pub fn register(&mut self, spec: ColumnSpec) -> CoreResult<()> {
        if self.index.contains_key(spec.name.as_str()) {
            return Err(CoreError::DuplicateColumn {
                name: spec.name.to_string(),
            });
        }
        self.index.insert(spec.name.clone(), self.columns.len());
        self.columns.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Generation instruction for a column.
    pub fn instruction(&self, name: &str) -> CoreResult<&str> {
        self.get(name)
            .map(|c| c.instruction.as_str())
            .ok_or_else(|| CoreError::UnknownColumn {
                name: name.to_string(),
            })
    }

    /// Human-readable definition for a column.
    pub fn definition(&self, name: &str) -> CoreResult<&str> {
        self.get(name)
            .map(|c| c.definition.as_str())
            .ok_or_else(|| CoreError::UnknownColumn {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// On-disk column file (`columns.yml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnFile {
    /// Columns of the raw event table (always available)
    #[serde(default)]
    pub base_columns: Vec<ColumnName>,

    /// Derivable columns
    #[serde(default)]
    pub columns: Vec<ColumnEntry>,
}

/// One derivable column entry in the column file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnEntry {
    pub name: ColumnName,

    #[serde(rename = "type")]
    pub kind: StorageKind,

    #[serde(default)]
    pub depends_on: Vec<ColumnName>,

    pub instruction: String,

    #[serde(default)]
    pub definition: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl ColumnEntry {
    /// Convert into a registry spec.
    pub fn to_spec(&self) -> ColumnSpec {
        let mut spec = ColumnSpec::new(
            self.name.clone(),
            self.kind,
            self.depends_on.clone(),
            self.instruction.clone(),
        );
        if let Some(def) = &self.definition {
            spec.definition = def.clone();
        }
        spec.description = self.description.clone();
        spec
    }
}

impl ColumnFile {
    /// Load a column file from disk.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parse a column file from YAML text.
    pub fn parse(content: &str) -> CoreResult<Self> {
        let file: ColumnFile = serde_yaml::from_str(content)?;
        Ok(file)
    }
}

#[cfg(test)]
#[path = "column_test.rs"]
mod tests;
