//! In-memory table representation.

use crate::schema::TableSchema;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary key of a row.
pub type RowId = i64;

/// A single row: an implicit integer primary key plus named fields.
///
/// Fields are sparse; a column missing from the map reads as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Primary key.
    pub id: RowId,
    /// Column values by column name.
    pub fields: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row with the given primary key.
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field, builder style.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Reads a field; missing columns read as null.
    pub fn get(&self, column: &str) -> &Value {
        self.fields.get(column).unwrap_or(&Value::Null)
    }
}

/// A table: a schema and its rows, ordered by primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// The table schema.
    pub schema: TableSchema,
    rows: BTreeMap<RowId, Row>,
}

impl Table {
    /// Creates an empty table with the given schema.
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a row by primary key.
    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Returns true if a row with this primary key exists.
    pub fn contains(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Iterates rows in primary-key ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Allocates a primary key one past the current maximum.
    pub fn allocate_id(&self) -> RowId {
        self.rows.keys().next_back().map_or(1, |max| max + 1)
    }

    /// Finds the first row (by primary key) whose named fields all equal
    /// the given values.
    pub fn find_by_fields(&self, fields: &[(&str, &Value)]) -> Option<&Row> {
        self.rows
            .values()
            .find(|row| fields.iter().all(|(col, val)| row.get(col) == *val))
    }

    /// Inserts or replaces a row by primary key, without validation.
    ///
    /// Validation against the schema and sibling tables lives on
    /// [`DatabaseFile::upsert`](crate::DatabaseFile::upsert); this is the
    /// raw storage step.
    pub(crate) fn put(&mut self, row: Row) {
        self.rows.insert(row.id, row);
    }
}
