//! Change scanning.
//!
//! Given a table and the target copy's watermark, the scanner collects
//! the rows that still need to travel: everything stamped after the
//! watermark, or the whole table when no watermark exists yet.

use crate::clock::Stamp;
use crate::error::SyncResult;
use std::collections::BTreeSet;
use tandem_store::{ColumnSpec, DatabaseFile, Row, RowId, StoreError, SYNC_MARKER_COLUMN};

/// The eagerly collected result of one change scan.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// Changed rows, primary-key ascending, all columns included.
    pub rows: Vec<Row>,
    /// The largest non-null marker among the collected rows.
    pub max_marker: Option<Stamp>,
    /// True if the marker column had to be added to the table first.
    pub migrated: bool,
}

impl ChangeBatch {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a row's change marker.
///
/// Rows predating the marker column, or carrying an unreadable value,
/// have no marker ("unknown age").
pub fn marker_of(row: &Row) -> Option<Stamp> {
    row.get(SYNC_MARKER_COLUMN)
        .as_integer()
        .filter(|stamp| *stamp >= 0)
        .map(|stamp| stamp as Stamp)
}

/// Collects the rows of `table` that are new relative to `watermark`.
///
/// - With no watermark, every row is included — including rows whose
///   marker is null (unknown age; they get their one chance here).
/// - With a watermark, only rows whose marker exceeds it are included;
///   null markers were covered by the first full scan.
/// - Rows whose id is in `exclude` were written by this run's opposite
///   pass and must not travel back.
///
/// Legacy tables without the marker column are migrated before the
/// scan (the new column reads as null for existing rows).
pub fn scan(
    db: &mut DatabaseFile,
    table: &str,
    watermark: Option<Stamp>,
    exclude: &BTreeSet<RowId>,
) -> SyncResult<ChangeBatch> {
    let migrated = db.ensure_column(table, ColumnSpec::sync_marker())?;
    if migrated {
        tracing::info!("added {SYNC_MARKER_COLUMN} column to {table} in {:?}", db.path());
    }

    let source = db
        .table(table)
        .ok_or_else(|| StoreError::table_not_found(table))?;

    let mut rows = Vec::new();
    let mut max_marker = None;
    for row in source.iter() {
        if exclude.contains(&row.id) {
            continue;
        }
        let marker = marker_of(row);
        let included = match watermark {
            None => true,
            Some(mark) => marker.is_some_and(|m| m > mark),
        };
        if !included {
            continue;
        }
        max_marker = max_marker.max(marker);
        rows.push(row.clone());
    }

    Ok(ChangeBatch {
        rows,
        max_marker,
        migrated,
    })
}
