//! Progress events and run reports.
//!
//! The driver reports progress as one-way notifications: events are
//! sent fire-and-forget over an mpsc channel and mirrored to `tracing`,
//! so a slow or departed listener can never stall a run.

use std::fmt;
use std::sync::mpsc;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of merging one table within one file pair (both directions).
#[derive(Debug, Clone)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Rows collected by the change scans, both directions.
    pub scanned: u64,
    /// Rows written into either copy.
    pub applied: u64,
    /// Rows skipped after a per-row failure.
    pub skipped: u64,
    /// Set when the table was abandoned by the driver.
    pub error: Option<String>,
}

impl TableReport {
    /// A report for a table the driver abandoned.
    pub fn failed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            scanned: 0,
            applied: 0,
            skipped: 0,
            error: Some(reason.into()),
        }
    }
}

/// Outcome of merging one named database file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Database file name.
    pub file: String,
    /// Per-table outcomes; empty when the file could not be opened.
    pub tables: Vec<TableReport>,
    /// Set when the file pair could not be opened at all.
    pub error: Option<String>,
}

/// Outcome of a full reconciliation run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Per-file outcomes, in configuration order.
    pub files: Vec<FileReport>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunReport {
    /// Total rows written across all files and tables.
    pub fn rows_applied(&self) -> u64 {
        self.tables().map(|t| t.applied).sum()
    }

    /// Total rows skipped across all files and tables.
    pub fn rows_skipped(&self) -> u64 {
        self.tables().map(|t| t.skipped).sum()
    }

    /// Number of tables the driver abandoned.
    pub fn tables_failed(&self) -> u64 {
        self.tables().filter(|t| t.error.is_some()).count() as u64
    }

    /// Number of files that could not be opened.
    pub fn files_failed(&self) -> u64 {
        self.files.iter().filter(|f| f.error.is_some()).count() as u64
    }

    fn tables(&self) -> impl Iterator<Item = &TableReport> {
        self.files.iter().flat_map(|f| f.tables.iter())
    }
}

/// A progress notification emitted while a run executes.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A run began.
    RunStarted {
        /// Unique id of the run.
        run_id: Uuid,
        /// Database files the run will visit.
        files: Vec<String>,
    },
    /// A file pair is being merged.
    FileStarted {
        /// Database file name.
        file: String,
    },
    /// A table finished both merge directions.
    TableMerged {
        /// Database file name.
        file: String,
        /// Table name.
        table: String,
        /// Rows written into either copy.
        applied: u64,
        /// Rows skipped after per-row failures.
        skipped: u64,
    },
    /// A table was abandoned after an unexpected error.
    TableSkipped {
        /// Database file name.
        file: String,
        /// Table name.
        table: String,
        /// Why the table was abandoned.
        reason: String,
    },
    /// A file pair finished merging.
    FileCompleted {
        /// Database file name.
        file: String,
    },
    /// A file pair could not be opened; its sync was aborted.
    FileFailed {
        /// Database file name.
        file: String,
        /// Why the file was abandoned.
        reason: String,
    },
    /// The run finished.
    RunCompleted {
        /// The final report.
        report: RunReport,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::RunStarted { run_id, files } => {
                write!(f, "run {run_id} started over {} file(s)", files.len())
            }
            ProgressEvent::FileStarted { file } => write!(f, "{file}: merging"),
            ProgressEvent::TableMerged {
                file,
                table,
                applied,
                skipped,
            } => write!(
                f,
                "{file}/{table}: {applied} row(s) applied, {skipped} skipped"
            ),
            ProgressEvent::TableSkipped {
                file,
                table,
                reason,
            } => write!(f, "{file}/{table}: table skipped: {reason}"),
            ProgressEvent::FileCompleted { file } => write!(f, "{file}: done"),
            ProgressEvent::FileFailed { file, reason } => {
                write!(f, "{file}: failed: {reason}")
            }
            ProgressEvent::RunCompleted { report } => write!(
                f,
                "run {} completed: {} row(s) applied, {} skipped, {} table(s) failed",
                report.run_id,
                report.rows_applied(),
                report.rows_skipped(),
                report.tables_failed()
            ),
        }
    }
}

/// Fire-and-forget progress channel.
///
/// Every event is logged through `tracing`; delivery to the channel is
/// best-effort and a disconnected receiver is ignored.
#[derive(Debug)]
pub struct ProgressSender {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// Creates a sender that forwards events to the given channel.
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Creates a sender that only logs.
    pub fn log_only() -> Self {
        Self { sender: None }
    }

    /// Emits one event.
    pub fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::TableSkipped { .. } | ProgressEvent::FileFailed { .. } => {
                tracing::warn!("{event}");
            }
            _ => tracing::info!("{event}"),
        }
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
