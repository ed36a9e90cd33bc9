//! Per-table synchronization watermarks.
//!
//! Watermarks live in the reserved `_sync_state` table inside each
//! database copy: one row per synchronized table, holding the newest
//! marker value already exchanged with the peer copy. Malformed or
//! missing metadata is never fatal; it reads as "never synchronized"
//! and the next scan falls back to a full-table scan.

use crate::clock::Stamp;
use crate::error::SyncResult;
use tandem_store::{DatabaseFile, Row, TableSchema, SYNC_META_TABLE};

/// Column holding the synchronized table's name.
const TABLE_COLUMN: &str = "table";
/// Column holding the watermark stamp.
const WATERMARK_COLUMN: &str = "watermark";

/// Reads the watermark recorded for a table.
///
/// Returns `None` when the metadata table is absent, has no row for
/// this table, or the stored value is unreadable (corrupt metadata is
/// a recoverable condition, not an error).
pub fn watermark(db: &DatabaseFile, table: &str) -> Option<Stamp> {
    let meta = db.table(SYNC_META_TABLE)?;
    meta.iter()
        .filter(|row| row.get(TABLE_COLUMN).as_text() == Some(table))
        .filter_map(|row| row.get(WATERMARK_COLUMN).as_integer())
        .filter(|stamp| *stamp >= 0)
        .map(|stamp| stamp as Stamp)
        .max()
}

/// Records a watermark for a table.
///
/// Watermarks are monotonic: a stamp at or below the stored value is a
/// no-op. The metadata table is created on first use; an unusable
/// metadata table (wrong shape) is reset rather than trusted.
pub fn set_watermark(db: &mut DatabaseFile, table: &str, stamp: Stamp) -> SyncResult<()> {
    if watermark(db, table).is_some_and(|existing| existing >= stamp) {
        return Ok(());
    }

    if db.ensure_table(TableSchema::sync_meta()) {
        tracing::debug!("created {SYNC_META_TABLE} metadata table in {:?}", db.path());
    } else if !meta_is_usable(db) {
        tracing::warn!(
            "resetting unreadable {SYNC_META_TABLE} metadata table in {:?}",
            db.path()
        );
        db.reset_table(TableSchema::sync_meta());
    }

    let row_id = db
        .table(SYNC_META_TABLE)
        .map(|meta| {
            meta.iter()
                .find(|row| row.get(TABLE_COLUMN).as_text() == Some(table))
                .map(|row| row.id)
                .unwrap_or_else(|| meta.allocate_id())
        })
        .unwrap_or(1);

    let row = Row::new(row_id)
        .with(TABLE_COLUMN, table)
        .with(WATERMARK_COLUMN, stamp as i64);
    db.upsert(SYNC_META_TABLE, row)?;
    Ok(())
}

/// Checks that the metadata table can hold watermark rows.
fn meta_is_usable(db: &DatabaseFile) -> bool {
    let Some(meta) = db.table(SYNC_META_TABLE) else {
        return false;
    };
    let expected = TableSchema::sync_meta();
    expected.columns.iter().all(|wanted| {
        meta.schema
            .column(&wanted.name)
            .is_some_and(|col| col.kind == wanted.kind)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_store::{ColumnKind, ColumnSpec};
    use tempfile::tempdir;

    fn open_db() -> (tempfile::TempDir, DatabaseFile) {
        let dir = tempdir().unwrap();
        let db = DatabaseFile::open(&dir.path().join("x.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn absent_metadata_reads_none() {
        let (_dir, db) = open_db();
        assert_eq!(watermark(&db, "employees"), None);
    }

    #[test]
    fn set_then_get() {
        let (_dir, mut db) = open_db();
        set_watermark(&mut db, "employees", 100).unwrap();
        assert_eq!(watermark(&db, "employees"), Some(100));
        assert_eq!(watermark(&db, "surveys"), None);
    }

    #[test]
    fn watermarks_are_monotonic() {
        let (_dir, mut db) = open_db();
        set_watermark(&mut db, "employees", 100).unwrap();
        set_watermark(&mut db, "employees", 40).unwrap();
        assert_eq!(watermark(&db, "employees"), Some(100));

        set_watermark(&mut db, "employees", 150).unwrap();
        assert_eq!(watermark(&db, "employees"), Some(150));
    }

    #[test]
    fn one_row_per_table() {
        let (_dir, mut db) = open_db();
        set_watermark(&mut db, "employees", 10).unwrap();
        set_watermark(&mut db, "employees", 20).unwrap();
        set_watermark(&mut db, "surveys", 5).unwrap();

        assert_eq!(db.table(SYNC_META_TABLE).unwrap().len(), 2);
    }

    #[test]
    fn corrupt_metadata_reads_none_and_recovers() {
        let (_dir, mut db) = open_db();

        // A metadata table of the wrong shape: watermark stored as text.
        let bad = TableSchema::new(SYNC_META_TABLE)
            .with_column(ColumnSpec::new(TABLE_COLUMN, ColumnKind::Text))
            .with_column(ColumnSpec::new(WATERMARK_COLUMN, ColumnKind::Text));
        db.ensure_table(bad);
        db.upsert(
            SYNC_META_TABLE,
            Row::new(1)
                .with(TABLE_COLUMN, "employees")
                .with(WATERMARK_COLUMN, "not a stamp"),
        )
        .unwrap();

        // Unreadable value: treated as never synchronized.
        assert_eq!(watermark(&db, "employees"), None);

        // Writing resets the table to a usable shape.
        set_watermark(&mut db, "employees", 7).unwrap();
        assert_eq!(watermark(&db, "employees"), Some(7));
    }
}
