//! Batch merge application.

use crate::clock::{MarkerClock, Stamp};
use crate::scanner::ChangeBatch;
use crate::strategy::{MergeDisposition, StrategyRegistry};
use std::collections::BTreeSet;
use std::sync::Arc;
use tandem_store::{DatabaseFile, RowId};

/// Accounting for one applied batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Rows written into the target copy.
    pub applied: u64,
    /// Rows skipped after a per-row failure.
    pub skipped: u64,
    /// Rows that lost to newer local data; nothing was written.
    pub unchanged: u64,
    /// Primary keys written into the target copy.
    ///
    /// The driver excludes these from the same run's reverse scan so a
    /// row never travels straight back to where it came from.
    pub applied_ids: BTreeSet<RowId>,
    /// The largest fresh stamp issued while applying.
    pub max_stamp: Option<Stamp>,
}

/// Applies change batches through the per-table strategy registry.
///
/// The merge is best-effort: a row that fails (constraint violation,
/// unknown column) is logged and skipped, and the rest of the batch
/// continues. Every row a strategy writes gets a fresh marker stamp.
#[derive(Debug)]
pub struct MergeApplier {
    registry: Arc<StrategyRegistry>,
    clock: Arc<MarkerClock>,
}

impl MergeApplier {
    /// Creates an applier over the given registry and clock.
    pub fn new(registry: Arc<StrategyRegistry>, clock: Arc<MarkerClock>) -> Self {
        Self { registry, clock }
    }

    /// Applies every row of `batch` into `table` of the target copy.
    pub fn apply_batch(
        &self,
        db: &mut DatabaseFile,
        table: &str,
        batch: &ChangeBatch,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let strategy = self.registry.strategy_for(table);

        for incoming in &batch.rows {
            let stamp = self.clock.next_stamp();
            match strategy.apply(db, table, incoming, stamp) {
                Ok(MergeDisposition::Unchanged) => {
                    tracing::debug!("{table}: row {} lost to newer local data", incoming.id);
                    outcome.unchanged += 1;
                }
                Ok(disposition) => {
                    outcome.applied += 1;
                    outcome.max_stamp = outcome.max_stamp.max(Some(stamp));
                    if let Some(id) = disposition.row_id() {
                        outcome.applied_ids.insert(id);
                    }
                }
                Err(error) => {
                    tracing::warn!("{table}: skipping row {}: {error}", incoming.id);
                    outcome.skipped += 1;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use tandem_store::{ColumnKind, ColumnSpec, Row, TableSchema, SYNC_MARKER_COLUMN};
    use tempfile::tempdir;

    fn employees_schema() -> TableSchema {
        TableSchema::new("employees")
            .with_column(ColumnSpec::new("name", ColumnKind::Text))
            .with_column(ColumnSpec::new("role", ColumnKind::Text))
            .with_column(
                ColumnSpec::nullable("manager_id", ColumnKind::Integer)
                    .with_reference("employees"),
            )
    }

    fn applier() -> MergeApplier {
        MergeApplier::new(
            Arc::new(StrategyRegistry::with_defaults()),
            Arc::new(MarkerClock::new()),
        )
    }

    fn open_pair() -> (tempfile::TempDir, DatabaseFile, DatabaseFile) {
        let dir = tempdir().unwrap();
        let mut source = DatabaseFile::open(&dir.path().join("src.db")).unwrap();
        let mut target = DatabaseFile::open(&dir.path().join("dst.db")).unwrap();
        for db in [&mut source, &mut target] {
            db.ensure_table(employees_schema());
            db.ensure_column("employees", ColumnSpec::sync_marker())
                .unwrap();
        }
        (dir, source, target)
    }

    fn employee(id: i64, name: &str, manager: Option<i64>) -> Row {
        Row::new(id)
            .with("name", name)
            .with("role", "eng")
            .with("manager_id", manager)
    }

    #[test]
    fn batch_applies_and_stamps() {
        let (_dir, mut source, mut target) = open_pair();
        source.upsert("employees", employee(1, "ada", None)).unwrap();
        source.upsert("employees", employee(2, "bob", Some(1))).unwrap();

        let batch = scan(&mut source, "employees", None, &BTreeSet::new()).unwrap();
        let outcome = applier().apply_batch(&mut target, "employees", &batch);

        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.applied_ids, [1, 2].into_iter().collect());
        assert!(outcome.max_stamp.is_some());

        let table = target.table("employees").unwrap();
        assert_eq!(table.len(), 2);
        // Applied rows carry fresh stamps (source rows had none at all).
        let stamp = table.get(1).unwrap().get(SYNC_MARKER_COLUMN).as_integer();
        assert!(stamp.is_some());
        assert!(stamp.unwrap() as u64 <= outcome.max_stamp.unwrap());
    }

    #[test]
    fn constraint_violation_skips_row_and_continues() {
        let (_dir, mut source, mut target) = open_pair();
        // Row 1 references manager 9, which exists only on the source.
        source.upsert("employees", employee(9, "boss", None)).unwrap();
        source
            .upsert("employees", employee(1, "ada", Some(9)))
            .unwrap();
        source.upsert("employees", employee(2, "bob", None)).unwrap();

        // Scan only rows 1 and 2 (simulate a partial batch where the
        // manager row is not travelling).
        let mut batch = scan(&mut source, "employees", None, &BTreeSet::new()).unwrap();
        batch.rows.retain(|row| row.id != 9);

        let outcome = applier().apply_batch(&mut target, "employees", &batch);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.applied, 1);

        let table = target.table("employees").unwrap();
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (_dir, mut source, mut target) = open_pair();
        let batch = scan(&mut source, "employees", None, &BTreeSet::new()).unwrap();
        let outcome = applier().apply_batch(&mut target, "employees", &batch);

        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.max_stamp, None);
        assert!(outcome.applied_ids.is_empty());
    }
}
