//! Reconciliation driver.
//!
//! The driver walks the cross product of configured files × tables ×
//! directions (A→B, then B→A), sequentially. Each file pair is opened
//! and exclusively held for its whole merge, then released. A bad
//! table or an unopenable file is logged and skipped; the run always
//! proceeds to whatever remains.

use crate::applier::MergeApplier;
use crate::clock::MarkerClock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::progress::{FileReport, ProgressEvent, ProgressSender, RunReport, TableReport};
use crate::scanner::scan;
use crate::state::{Direction, DriverState, TableStep};
use crate::strategy::StrategyRegistry;
use crate::watermark::{set_watermark, watermark};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;
use tandem_store::{ColumnSpec, DatabaseFile};
use uuid::Uuid;

/// Both copies of one named database file.
///
/// Opening the pair acquires both exclusive locks; dropping it at the
/// end of the file's merge releases them.
struct FilePair {
    a: DatabaseFile,
    b: DatabaseFile,
}

impl FilePair {
    fn open(path_a: &Path, path_b: &Path) -> SyncResult<Self> {
        Ok(Self {
            a: DatabaseFile::open(path_a)?,
            b: DatabaseFile::open(path_b)?,
        })
    }
}

/// The pairwise reconciler.
///
/// `run` executes synchronously; [`Reconciler::spawn`] runs the same
/// loop on a worker thread so an interactive caller stays responsive,
/// observing progress through one-way events. There is no mid-batch
/// cancellation: once a run starts, the only control is to wait.
pub struct Reconciler {
    config: SyncConfig,
    applier: MergeApplier,
    state: RwLock<DriverState>,
}

impl Reconciler {
    /// Creates a reconciler with the stock strategy registry.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_registry(config, StrategyRegistry::with_defaults())
    }

    /// Creates a reconciler with a custom strategy registry.
    pub fn with_registry(config: SyncConfig, registry: StrategyRegistry) -> Self {
        Self {
            config,
            applier: MergeApplier::new(Arc::new(registry), Arc::new(MarkerClock::new())),
            state: RwLock::new(DriverState::Idle),
        }
    }

    /// The driver's current state.
    pub fn state(&self) -> DriverState {
        self.state.read().clone()
    }

    fn set_state(&self, state: DriverState) {
        *self.state.write() = state;
    }

    /// Runs the full reconciliation synchronously.
    pub fn run(&self, progress: &ProgressSender) -> RunReport {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        progress.emit(ProgressEvent::RunStarted {
            run_id,
            files: self.config.files.clone(),
        });

        let mut files = Vec::with_capacity(self.config.files.len());
        for file in &self.config.files {
            progress.emit(ProgressEvent::FileStarted { file: file.clone() });
            match self.merge_file(file, progress) {
                Ok(tables) => {
                    progress.emit(ProgressEvent::FileCompleted { file: file.clone() });
                    files.push(FileReport {
                        file: file.clone(),
                        tables,
                        error: None,
                    });
                }
                Err(error) => {
                    progress.emit(ProgressEvent::FileFailed {
                        file: file.clone(),
                        reason: error.to_string(),
                    });
                    files.push(FileReport {
                        file: file.clone(),
                        tables: Vec::new(),
                        error: Some(error.to_string()),
                    });
                }
            }
            self.set_state(DriverState::Idle);
        }

        let report = RunReport {
            run_id,
            files,
            duration: start.elapsed(),
        };
        progress.emit(ProgressEvent::RunCompleted {
            report: report.clone(),
        });
        report
    }

    /// Spawns the run on a dedicated worker thread.
    pub fn spawn(self: Arc<Self>) -> SyncResult<SyncHandle> {
        let (sender, events) = mpsc::channel();
        let reconciler = Arc::clone(&self);
        let worker = thread::Builder::new()
            .name("tandem-sync".into())
            .spawn(move || {
                let progress = ProgressSender::new(sender);
                reconciler.run(&progress)
            })?;
        Ok(SyncHandle {
            reconciler: self,
            events,
            worker,
        })
    }

    fn merge_file(&self, file: &str, progress: &ProgressSender) -> SyncResult<Vec<TableReport>> {
        let mut pair = FilePair::open(
            &self.config.path_a.join(file),
            &self.config.path_b.join(file),
        )?;

        let mut tables = Vec::new();
        for table in table_union(&pair) {
            match self.merge_table(&mut pair, file, &table) {
                Ok(report) => {
                    progress.emit(ProgressEvent::TableMerged {
                        file: file.to_string(),
                        table: table.clone(),
                        applied: report.applied,
                        skipped: report.skipped,
                    });
                    tables.push(report);
                }
                Err(error) => {
                    tracing::error!("{file}/{table}: abandoned: {error}");
                    progress.emit(ProgressEvent::TableSkipped {
                        file: file.to_string(),
                        table: table.clone(),
                        reason: error.to_string(),
                    });
                    tables.push(TableReport::failed(&table, error.to_string()));
                }
            }
        }
        Ok(tables)
    }

    fn merge_table(&self, pair: &mut FilePair, file: &str, table: &str) -> SyncResult<TableReport> {
        materialize_missing_side(pair, table);

        // Both copies need the marker column before stamped rows land.
        pair.a.ensure_column(table, ColumnSpec::sync_marker())?;
        pair.b.ensure_column(table, ColumnSpec::sync_marker())?;

        // A → B
        self.set_state(DriverState::Scanning(TableStep::new(
            file,
            table,
            Direction::AToB,
        )));
        let wm_b = watermark(&pair.b, table);
        let batch_ab = scan(&mut pair.a, table, wm_b, &BTreeSet::new())?;
        self.set_state(DriverState::Applying(TableStep::new(
            file,
            table,
            Direction::AToB,
        )));
        let out_ab = self.applier.apply_batch(&mut pair.b, table, &batch_ab);

        // B → A; rows just written into B stay home.
        self.set_state(DriverState::Scanning(TableStep::new(
            file,
            table,
            Direction::BToA,
        )));
        let wm_a = watermark(&pair.a, table);
        let batch_ba = scan(&mut pair.b, table, wm_a, &out_ab.applied_ids)?;
        self.set_state(DriverState::Applying(TableStep::new(
            file,
            table,
            Direction::BToA,
        )));
        let out_ba = self.applier.apply_batch(&mut pair.a, table, &batch_ba);

        // Advance both watermarks past everything this run scanned or
        // stamped, so re-stamped rows never travel again in a later run.
        let high = [
            wm_a,
            wm_b,
            batch_ab.max_marker,
            batch_ba.max_marker,
            out_ab.max_stamp,
            out_ba.max_stamp,
        ]
        .into_iter()
        .flatten()
        .max();
        if let Some(high) = high {
            set_watermark(&mut pair.a, table, high)?;
            set_watermark(&mut pair.b, table, high)?;
        }
        pair.a.save()?;
        pair.b.save()?;

        Ok(TableReport {
            table: table.to_string(),
            scanned: (batch_ab.len() + batch_ba.len()) as u64,
            applied: out_ab.applied + out_ba.applied,
            skipped: out_ab.skipped + out_ba.skipped,
            error: None,
        })
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// A running background reconciliation.
pub struct SyncHandle {
    reconciler: Arc<Reconciler>,
    events: mpsc::Receiver<ProgressEvent>,
    worker: thread::JoinHandle<RunReport>,
}

impl SyncHandle {
    /// The one-way progress event stream.
    pub fn events(&self) -> &mpsc::Receiver<ProgressEvent> {
        &self.events
    }

    /// The driver's current state.
    pub fn state(&self) -> DriverState {
        self.reconciler.state()
    }

    /// Waits for the run to finish and returns its report.
    pub fn join(self) -> SyncResult<RunReport> {
        self.worker.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            SyncError::worker_panicked(message)
        })
    }
}

/// Sorted union of user table names across both copies.
fn table_union(pair: &FilePair) -> Vec<String> {
    let mut names: BTreeSet<String> = pair.a.user_table_names().into_iter().collect();
    names.extend(pair.b.user_table_names());
    names.into_iter().collect()
}

/// Copies a table's schema onto the side that lacks it.
///
/// A missing file opens as an empty database, so the peer's schema is
/// the only way its rows can land anywhere.
fn materialize_missing_side(pair: &mut FilePair, table: &str) {
    if pair.a.table(table).is_none() {
        if let Some(t) = pair.b.table(table) {
            let schema = t.schema.clone();
            pair.a.ensure_table(schema);
        }
    } else if pair.b.table(table).is_none() {
        if let Some(t) = pair.a.table(table) {
            let schema = t.schema.clone();
            pair.b.ensure_table(schema);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_store::{ColumnKind, ColumnSpec, Row, TableSchema};
    use tempfile::tempdir;

    fn notes_schema() -> TableSchema {
        TableSchema::new("notes").with_column(ColumnSpec::nullable("body", ColumnKind::Text))
    }

    #[test]
    fn table_union_merges_both_sides() {
        let dir = tempdir().unwrap();
        let mut pair = FilePair::open(&dir.path().join("a.db"), &dir.path().join("b.db")).unwrap();
        pair.a.ensure_table(notes_schema());
        pair.a.ensure_table(TableSchema::sync_meta());
        pair.b.ensure_table(TableSchema::new("extra"));

        assert_eq!(table_union(&pair), vec!["extra".to_string(), "notes".to_string()]);
    }

    #[test]
    fn missing_side_is_materialized() {
        let dir = tempdir().unwrap();
        let mut pair = FilePair::open(&dir.path().join("a.db"), &dir.path().join("b.db")).unwrap();
        pair.a.ensure_table(notes_schema());

        materialize_missing_side(&mut pair, "notes");
        assert_eq!(pair.b.table("notes").unwrap().schema, notes_schema());
    }

    #[test]
    fn run_merges_a_single_file() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("a");
        let path_b = dir.path().join("b");
        {
            let mut db = DatabaseFile::open(&path_a.join("notes.db")).unwrap();
            db.ensure_table(notes_schema());
            db.upsert("notes", Row::new(1).with("body", "hello")).unwrap();
            db.save().unwrap();
        }

        let config = SyncConfig::new(&path_a, &path_b).with_files(["notes.db"]);
        let reconciler = Reconciler::new(config);
        let report = reconciler.run(&ProgressSender::log_only());

        assert_eq!(report.rows_applied(), 1);
        assert_eq!(report.files_failed(), 0);
        assert_eq!(reconciler.state(), DriverState::Idle);

        let db = DatabaseFile::open(&path_b.join("notes.db")).unwrap();
        assert_eq!(db.table("notes").unwrap().len(), 1);
    }

    #[test]
    fn locked_file_fails_visibly_but_run_continues() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("a");
        let path_b = dir.path().join("b");

        // Hold the lock on one copy so its pair cannot open.
        let _held = DatabaseFile::open(&path_a.join("locked.db")).unwrap();
        {
            let mut db = DatabaseFile::open(&path_a.join("fine.db")).unwrap();
            db.ensure_table(notes_schema());
            db.upsert("notes", Row::new(1).with("body", "x")).unwrap();
            db.save().unwrap();
        }

        let config = SyncConfig::new(&path_a, &path_b).with_files(["locked.db", "fine.db"]);
        let report = Reconciler::new(config).run(&ProgressSender::log_only());

        assert_eq!(report.files_failed(), 1);
        assert_eq!(report.rows_applied(), 1);
        assert!(report.files[0].error.as_deref().unwrap().contains("locked"));
    }

    #[test]
    fn spawn_reports_through_events_and_join() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("a");
        let path_b = dir.path().join("b");
        {
            let mut db = DatabaseFile::open(&path_a.join("notes.db")).unwrap();
            db.ensure_table(notes_schema());
            db.upsert("notes", Row::new(1).with("body", "bg")).unwrap();
            db.save().unwrap();
        }

        let config = SyncConfig::new(&path_a, &path_b).with_files(["notes.db"]);
        let handle = Arc::new(Reconciler::new(config)).spawn().unwrap();

        let mut saw_completed = false;
        while let Ok(event) = handle.events().recv() {
            if matches!(event, ProgressEvent::RunCompleted { .. }) {
                saw_completed = true;
                break;
            }
        }
        assert!(saw_completed);

        let report = handle.join().unwrap();
        assert_eq!(report.rows_applied(), 1);
    }
}
