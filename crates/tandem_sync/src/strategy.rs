//! Per-table merge strategies.
//!
//! Reconciliation rules are dispatched by table name through a
//! [`StrategyRegistry`], so tables with identity semantics beyond the
//! primary key can register custom rules without touching the driver.

use crate::clock::Stamp;
use crate::scanner::marker_of;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tandem_store::{DatabaseFile, Row, RowId, StoreError, StoreResult, Value, SYNC_MARKER_COLUMN};

/// Name of the org-hierarchy table carrying natural-identity semantics.
pub const HIERARCHY_TABLE: &str = "employees";

/// What a strategy did with one incoming row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDisposition {
    /// A new row was written under this primary key.
    Inserted(RowId),
    /// An existing row was overwritten under this primary key.
    Updated(RowId),
    /// The incoming row lost to newer local data; nothing was written.
    Unchanged,
}

impl MergeDisposition {
    /// The primary key written, if anything was written.
    pub fn row_id(&self) -> Option<RowId> {
        match self {
            MergeDisposition::Inserted(id) | MergeDisposition::Updated(id) => Some(*id),
            MergeDisposition::Unchanged => None,
        }
    }
}

/// A table-specific reconciliation rule.
///
/// The incoming row still carries its source-side marker; strategies
/// stamp whatever they write with the fresh `stamp`.
pub trait MergeStrategy: Send + Sync {
    /// Applies one incoming row to the target copy.
    fn apply(
        &self,
        db: &mut DatabaseFile,
        table: &str,
        incoming: &Row,
        stamp: Stamp,
    ) -> StoreResult<MergeDisposition>;
}

/// The default policy: insert-or-replace keyed on the primary key.
#[derive(Debug, Default)]
pub struct InsertOrReplace;

impl MergeStrategy for InsertOrReplace {
    fn apply(
        &self,
        db: &mut DatabaseFile,
        table: &str,
        incoming: &Row,
        stamp: Stamp,
    ) -> StoreResult<MergeDisposition> {
        let existed = db.table(table).is_some_and(|t| t.contains(incoming.id));
        let mut row = incoming.clone();
        row.set(SYNC_MARKER_COLUMN, stamp as i64);
        db.upsert(table, row)?;
        Ok(if existed {
            MergeDisposition::Updated(incoming.id)
        } else {
            MergeDisposition::Inserted(incoming.id)
        })
    }
}

/// Write plan decided from immutable reads before touching the table.
enum Plan {
    WriteMerged(Row),
    WriteIncomingAt(RowId),
    Ignore,
}

/// Reconciliation by natural identity for tables whose rows can exist
/// under different surrogate keys on each side.
///
/// If a row with the same identity-column values already exists under a
/// different primary key, the existing row's mutable fields are updated
/// in place (most recent marker wins) instead of inserting a duplicate.
/// If the incoming primary key is occupied by a row of different
/// identity, the incoming row is inserted under a freshly allocated
/// key.
#[derive(Debug)]
pub struct NaturalKeyMerge {
    identity: Vec<String>,
}

impl NaturalKeyMerge {
    /// Creates a rule keyed on the given identity columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity: columns.into_iter().map(Into::into).collect(),
        }
    }

    fn differs_in_identity(&self, a: &Row, b: &Row) -> bool {
        self.identity.iter().any(|column| a.get(column) != b.get(column))
    }
}

impl MergeStrategy for NaturalKeyMerge {
    fn apply(
        &self,
        db: &mut DatabaseFile,
        table: &str,
        incoming: &Row,
        stamp: Stamp,
    ) -> StoreResult<MergeDisposition> {
        let plan = {
            let target = db
                .table(table)
                .ok_or_else(|| StoreError::table_not_found(table))?;
            let identity: Vec<(&str, &Value)> = self
                .identity
                .iter()
                .map(|column| (column.as_str(), incoming.get(column)))
                .collect();

            match target.find_by_fields(&identity) {
                Some(existing) if existing.id != incoming.id => {
                    // Same person, different surrogate keys. Most recent
                    // marker wins; unknown age loses to any marker.
                    let incoming_mark = marker_of(incoming).unwrap_or(0);
                    let existing_mark = marker_of(existing).unwrap_or(0);
                    if incoming_mark >= existing_mark {
                        let mut merged = existing.clone();
                        for (column, value) in &incoming.fields {
                            if column != SYNC_MARKER_COLUMN {
                                merged.set(column.clone(), value.clone());
                            }
                        }
                        Plan::WriteMerged(merged)
                    } else {
                        Plan::Ignore
                    }
                }
                _ => {
                    let taken_by_other = target
                        .get(incoming.id)
                        .is_some_and(|resident| self.differs_in_identity(resident, incoming));
                    if taken_by_other {
                        Plan::WriteIncomingAt(target.allocate_id())
                    } else {
                        Plan::WriteIncomingAt(incoming.id)
                    }
                }
            }
        };

        match plan {
            Plan::Ignore => Ok(MergeDisposition::Unchanged),
            Plan::WriteMerged(mut merged) => {
                merged.set(SYNC_MARKER_COLUMN, stamp as i64);
                let id = merged.id;
                db.upsert(table, merged)?;
                Ok(MergeDisposition::Updated(id))
            }
            Plan::WriteIncomingAt(id) => {
                let existed = id == incoming.id && db.table(table).is_some_and(|t| t.contains(id));
                let mut row = incoming.clone();
                row.id = id;
                row.set(SYNC_MARKER_COLUMN, stamp as i64);
                db.upsert(table, row)?;
                Ok(if existed {
                    MergeDisposition::Updated(id)
                } else {
                    MergeDisposition::Inserted(id)
                })
            }
        }
    }
}

/// Table name → reconciliation rule dispatch.
pub struct StrategyRegistry {
    default: Arc<dyn MergeStrategy>,
    by_table: HashMap<String, Arc<dyn MergeStrategy>>,
}

impl StrategyRegistry {
    /// Creates a registry where every table uses [`InsertOrReplace`].
    pub fn new() -> Self {
        Self {
            default: Arc::new(InsertOrReplace),
            by_table: HashMap::new(),
        }
    }

    /// Creates the stock registry: [`NaturalKeyMerge`] on name+role for
    /// the hierarchy table, [`InsertOrReplace`] everywhere else.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HIERARCHY_TABLE, Arc::new(NaturalKeyMerge::new(["name", "role"])));
        registry
    }

    /// Registers a rule for a table, replacing any previous rule.
    pub fn register(&mut self, table: impl Into<String>, strategy: Arc<dyn MergeStrategy>) {
        self.by_table.insert(table.into(), strategy);
    }

    /// The rule to use for a table.
    pub fn strategy_for(&self, table: &str) -> &dyn MergeStrategy {
        self.by_table
            .get(table)
            .unwrap_or(&self.default)
            .as_ref()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("tables", &self.by_table.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_store::{ColumnKind, ColumnSpec, TableSchema};
    use tempfile::tempdir;

    fn employees_schema() -> TableSchema {
        TableSchema::new(HIERARCHY_TABLE)
            .with_column(ColumnSpec::new("name", ColumnKind::Text))
            .with_column(ColumnSpec::new("role", ColumnKind::Text))
            .with_column(
                ColumnSpec::nullable("manager_id", ColumnKind::Integer)
                    .with_reference(HIERARCHY_TABLE),
            )
    }

    fn open_employees() -> (tempfile::TempDir, DatabaseFile) {
        let dir = tempdir().unwrap();
        let mut db = DatabaseFile::open(&dir.path().join("hierarchy.db")).unwrap();
        db.ensure_table(employees_schema());
        db.ensure_column(HIERARCHY_TABLE, ColumnSpec::sync_marker())
            .unwrap();
        (dir, db)
    }

    fn employee(id: RowId, name: &str, role: &str) -> Row {
        Row::new(id).with("name", name).with("role", role)
    }

    #[test]
    fn insert_or_replace_stamps_and_reports() {
        let (_dir, mut db) = open_employees();
        let strategy = InsertOrReplace;

        let first = strategy
            .apply(&mut db, HIERARCHY_TABLE, &employee(1, "ada", "lead"), 50)
            .unwrap();
        assert_eq!(first, MergeDisposition::Inserted(1));

        let row = db.table(HIERARCHY_TABLE).unwrap().get(1).unwrap().clone();
        assert_eq!(row.get(SYNC_MARKER_COLUMN).as_integer(), Some(50));

        let second = strategy
            .apply(&mut db, HIERARCHY_TABLE, &employee(1, "ada", "cto"), 60)
            .unwrap();
        assert_eq!(second, MergeDisposition::Updated(1));
        let row = db.table(HIERARCHY_TABLE).unwrap().get(1).unwrap().clone();
        assert_eq!(row.get("role").as_text(), Some("cto"));
        assert_eq!(row.get(SYNC_MARKER_COLUMN).as_integer(), Some(60));
    }

    #[test]
    fn natural_key_updates_in_place_when_newer() {
        let (_dir, mut db) = open_employees();
        db.upsert(
            HIERARCHY_TABLE,
            employee(1, "ada", "lead").with(SYNC_MARKER_COLUMN, 10i64),
        )
        .unwrap();

        // Same person under key 7 on the other side, newer marker.
        let incoming = employee(7, "ada", "lead")
            .with("manager_id", Value::Null)
            .with(SYNC_MARKER_COLUMN, 20i64);

        let strategy = NaturalKeyMerge::new(["name", "role"]);
        let result = strategy
            .apply(&mut db, HIERARCHY_TABLE, &incoming, 99)
            .unwrap();

        // Updated under the resident key; no duplicate was inserted.
        assert_eq!(result, MergeDisposition::Updated(1));
        let table = db.table(HIERARCHY_TABLE).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(1).unwrap().get(SYNC_MARKER_COLUMN).as_integer(),
            Some(99)
        );
    }

    #[test]
    fn natural_key_keeps_local_when_newer() {
        let (_dir, mut db) = open_employees();
        db.upsert(
            HIERARCHY_TABLE,
            employee(1, "ada", "lead")
                .with("manager_id", Value::Null)
                .with(SYNC_MARKER_COLUMN, 30i64),
        )
        .unwrap();

        let incoming = employee(7, "ada", "lead").with(SYNC_MARKER_COLUMN, 20i64);
        let strategy = NaturalKeyMerge::new(["name", "role"]);
        let result = strategy
            .apply(&mut db, HIERARCHY_TABLE, &incoming, 99)
            .unwrap();

        assert_eq!(result, MergeDisposition::Unchanged);
        let table = db.table(HIERARCHY_TABLE).unwrap();
        assert_eq!(table.len(), 1);
        // Local row untouched, marker included.
        assert_eq!(
            table.get(1).unwrap().get(SYNC_MARKER_COLUMN).as_integer(),
            Some(30)
        );
    }

    #[test]
    fn natural_key_reallocates_on_pk_collision() {
        let (_dir, mut db) = open_employees();
        db.upsert(
            HIERARCHY_TABLE,
            employee(1, "ada", "lead").with(SYNC_MARKER_COLUMN, 10i64),
        )
        .unwrap();

        // Different person arriving under the occupied key 1.
        let incoming = employee(1, "bob", "eng").with(SYNC_MARKER_COLUMN, 20i64);
        let strategy = NaturalKeyMerge::new(["name", "role"]);
        let result = strategy
            .apply(&mut db, HIERARCHY_TABLE, &incoming, 99)
            .unwrap();

        assert_eq!(result, MergeDisposition::Inserted(2));
        let table = db.table(HIERARCHY_TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().get("name").as_text(), Some("ada"));
        assert_eq!(table.get(2).unwrap().get("name").as_text(), Some("bob"));
    }

    #[test]
    fn natural_key_plain_insert_and_same_key_update() {
        let (_dir, mut db) = open_employees();
        let strategy = NaturalKeyMerge::new(["name", "role"]);

        let result = strategy
            .apply(&mut db, HIERARCHY_TABLE, &employee(3, "eve", "eng"), 40)
            .unwrap();
        assert_eq!(result, MergeDisposition::Inserted(3));

        // Same identity, same key: a straight update.
        let incoming = employee(3, "eve", "eng").with("manager_id", Value::Null);
        let result = strategy
            .apply(&mut db, HIERARCHY_TABLE, &incoming, 41)
            .unwrap();
        assert_eq!(result, MergeDisposition::Updated(3));
    }

    #[test]
    fn registry_dispatches_by_table() {
        let registry = StrategyRegistry::with_defaults();

        let (_dir, mut db) = open_employees();
        db.upsert(
            HIERARCHY_TABLE,
            employee(1, "ada", "lead").with(SYNC_MARKER_COLUMN, 10i64),
        )
        .unwrap();

        // The hierarchy table resolves to natural-key reconciliation:
        // the duplicate identity folds into the resident row.
        let incoming = employee(9, "ada", "lead").with(SYNC_MARKER_COLUMN, 20i64);
        let result = registry
            .strategy_for(HIERARCHY_TABLE)
            .apply(&mut db, HIERARCHY_TABLE, &incoming, 99)
            .unwrap();
        assert_eq!(result, MergeDisposition::Updated(1));

        // Unregistered tables fall back to insert-or-replace.
        let fallback = registry.strategy_for("surveys");
        let dir = tempdir().unwrap();
        let mut other = DatabaseFile::open(&dir.path().join("surveys.db")).unwrap();
        other.ensure_table(
            TableSchema::new("surveys")
                .with_column(ColumnSpec::nullable("title", ColumnKind::Text))
                .with_column(ColumnSpec::sync_marker()),
        );
        let result = fallback
            .apply(&mut other, "surveys", &Row::new(5).with("title", "Q3"), 70)
            .unwrap();
        assert_eq!(result, MergeDisposition::Inserted(5));
    }
}
