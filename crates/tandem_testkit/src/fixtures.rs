//! Paired-directory fixtures and the application schemas.
//!
//! The schemas mirror the three application databases the reconciler
//! is pointed at: an org hierarchy, a survey catalog, and collected
//! responses.

use std::path::{Path, PathBuf};
use tandem_store::{
    ColumnKind, ColumnSpec, DatabaseFile, Row, RowId, StoreResult, TableSchema,
    SYNC_MARKER_COLUMN,
};
use tempfile::TempDir;

/// A pair of side directories with automatic cleanup.
///
/// Side A and side B each hold copies of the named database files, the
/// way two operators' shared folders would.
pub struct PairFixture {
    /// Root directory for side A.
    pub side_a: PathBuf,
    /// Root directory for side B.
    pub side_b: PathBuf,
    _temp: TempDir,
}

impl PairFixture {
    /// Creates a fresh pair of empty side directories.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp directory");
        let side_a = temp.path().join("side_a");
        let side_b = temp.path().join("side_b");
        std::fs::create_dir_all(&side_a).expect("failed to create side A");
        std::fs::create_dir_all(&side_b).expect("failed to create side B");
        Self {
            side_a,
            side_b,
            _temp: temp,
        }
    }

    /// Path of a database file on side A.
    pub fn path_a(&self, file: &str) -> PathBuf {
        self.side_a.join(file)
    }

    /// Path of a database file on side B.
    pub fn path_b(&self, file: &str) -> PathBuf {
        self.side_b.join(file)
    }

    /// Opens a database file on side A.
    pub fn open_a(&self, file: &str) -> DatabaseFile {
        open(&self.path_a(file))
    }

    /// Opens a database file on side B.
    pub fn open_b(&self, file: &str) -> DatabaseFile {
        open(&self.path_b(file))
    }
}

impl Default for PairFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn open(path: &Path) -> DatabaseFile {
    DatabaseFile::open(path).expect("failed to open database file")
}

/// Schema of the org-hierarchy table (`hierarchy.db`).
///
/// `manager_id` is a self-reference into the same table; `name` plus
/// `role` form the natural identity used for conflict reconciliation.
pub fn employees_schema() -> TableSchema {
    TableSchema::new("employees")
        .with_column(ColumnSpec::new("name", ColumnKind::Text))
        .with_column(ColumnSpec::new("role", ColumnKind::Text))
        .with_column(
            ColumnSpec::nullable("manager_id", ColumnKind::Integer).with_reference("employees"),
        )
}

/// Schema of the survey catalog table (`surveys.db`).
pub fn surveys_schema() -> TableSchema {
    TableSchema::new("surveys")
        .with_column(ColumnSpec::new("title", ColumnKind::Text))
        .with_column(ColumnSpec::nullable("audience", ColumnKind::Text))
        .with_column(ColumnSpec::nullable("open", ColumnKind::Bool))
}

/// Schema of the collected-responses table (`responses.db`).
pub fn responses_schema() -> TableSchema {
    TableSchema::new("responses")
        .with_column(ColumnSpec::new("survey", ColumnKind::Text))
        .with_column(ColumnSpec::nullable("answer", ColumnKind::Text))
        .with_column(ColumnSpec::nullable("score", ColumnKind::Integer))
}

/// Builds an employee row.
pub fn employee(id: RowId, name: &str, role: &str, manager: Option<RowId>) -> Row {
    Row::new(id)
        .with("name", name)
        .with("role", role)
        .with("manager_id", manager)
}

/// Builds a survey row.
pub fn survey(id: RowId, title: &str) -> Row {
    Row::new(id).with("title", title)
}

/// Builds a response row.
pub fn response(id: RowId, survey: &str, answer: &str) -> Row {
    Row::new(id).with("survey", survey).with("answer", answer)
}

/// Stamps a row with a change marker.
pub fn stamped(row: Row, stamp: u64) -> Row {
    row.with(SYNC_MARKER_COLUMN, stamp as i64)
}

/// Seeds a table into a database file and upserts the given rows.
///
/// The marker column is added up front so pre-stamped rows pass
/// validation.
pub fn seed(db: &mut DatabaseFile, schema: TableSchema, rows: Vec<Row>) -> StoreResult<()> {
    let table = schema.name.clone();
    db.ensure_table(schema);
    db.ensure_column(&table, ColumnSpec::sync_marker())?;
    for row in rows {
        db.upsert(&table, row)?;
    }
    db.save()
}
