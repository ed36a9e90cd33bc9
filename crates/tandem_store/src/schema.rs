//! Table schemas and reserved names.

use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};

/// Prefix marking metadata tables that do not belong to the application.
pub const RESERVED_TABLE_PREFIX: char = '_';

/// Reserved metadata table holding per-table synchronization watermarks.
pub const SYNC_META_TABLE: &str = "_sync_state";

/// Reserved per-row change marker column (nullable integer).
///
/// Legacy tables may lack this column; it is added by schema migration
/// the first time a table is scanned for changes.
pub const SYNC_MARKER_COLUMN: &str = "sync_stamp";

/// The declared kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Signed 64-bit integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Bool,
    /// Byte string.
    Bytes,
}

impl ColumnKind {
    /// Returns true if a value of the given kind is acceptable.
    pub fn accepts(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (ColumnKind::Integer, ValueKind::Integer)
                | (ColumnKind::Text, ValueKind::Text)
                | (ColumnKind::Bool, ValueKind::Bool)
                | (ColumnKind::Bytes, ValueKind::Bytes)
        )
    }
}

/// Declaration of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Declared value kind.
    pub kind: ColumnKind,
    /// Whether null values are accepted.
    pub nullable: bool,
    /// Table whose primary key an integer value must point at.
    ///
    /// Self-references are allowed. Null passes when the column is
    /// nullable.
    pub references: Option<String>,
}

impl ColumnSpec {
    /// Creates a non-nullable column of the given kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            references: None,
        }
    }

    /// Creates a nullable column of the given kind.
    pub fn nullable(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            references: None,
        }
    }

    /// Marks this column as referencing another table's primary key.
    pub fn with_reference(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }

    /// The spec of the reserved change marker column.
    pub fn sync_marker() -> Self {
        Self::nullable(SYNC_MARKER_COLUMN, ColumnKind::Integer)
    }

    /// Validates a single value against this column.
    ///
    /// Reference checks need the owning database and are performed at
    /// that level; this only checks nullability and kind.
    pub fn check_value(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err("null value in non-nullable column".to_string());
        }
        if !self.kind.accepts(value.kind()) {
            return Err(format!(
                "expected {:?}, got {:?}",
                self.kind,
                value.kind()
            ));
        }
        Ok(())
    }
}

/// Schema of a table: its name and declared columns.
///
/// Row identity is an implicit integer primary key and is not part of
/// the column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Declared columns.
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Creates an empty schema with the given table name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column.
    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Finds a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the schema declares a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Returns true if this is a reserved metadata table.
    pub fn is_reserved(&self) -> bool {
        is_reserved_table(&self.name)
    }

    /// The schema of the reserved watermark metadata table.
    pub fn sync_meta() -> Self {
        Self::new(SYNC_META_TABLE)
            .with_column(ColumnSpec::new("table", ColumnKind::Text))
            .with_column(ColumnSpec::new("watermark", ColumnKind::Integer))
    }
}

/// Returns true if the table name is reserved for metadata.
pub fn is_reserved_table(name: &str) -> bool {
    name.starts_with(RESERVED_TABLE_PREFIX)
}
