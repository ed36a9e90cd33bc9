//! # Tandem Sync
//!
//! Pairwise reconciler for copies of Tandem database files.
//!
//! This crate provides:
//! - Driver state machine (idle → scanning → applying → idle)
//! - Per-table watermark tracking inside each database copy
//! - Change scanning with marker-column migration
//! - Merge application with pluggable per-table strategies
//! - One-way progress events and a background worker entry point
//!
//! ## Architecture
//!
//! The reconciler performs a **two-way, single-round merge**: for each
//! named database file under the two side directories, and for each
//! table, new rows flow A→B and then B→A. "New" means stamped after
//! the target copy's watermark; applied rows are re-stamped and both
//! watermarks then advance past every stamp the run issued, so nothing
//! travels twice.
//!
//! ## Key Invariants
//!
//! - Watermarks never decrease
//! - A watermark only advances after its batch has been applied
//! - Per-row failures skip the row, never the batch
//! - Per-table failures skip the table, never the run
//! - Running twice with no intervening writes applies zero rows
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_sync::{Reconciler, SyncConfig};
//!
//! let config = SyncConfig::new("/shares/site_a", "/shares/site_b");
//! let handle = Arc::new(Reconciler::new(config)).spawn().unwrap();
//! for event in handle.events() {
//!     println!("{event}");
//! }
//! let report = handle.join().unwrap();
//! println!("applied {} row(s)", report.rows_applied());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod clock;
mod config;
mod driver;
mod error;
mod progress;
mod scanner;
mod state;
mod strategy;
mod watermark;

pub use applier::{BatchOutcome, MergeApplier};
pub use clock::{MarkerClock, Stamp};
pub use config::{SyncConfig, DEFAULT_DATABASE_FILES};
pub use driver::{Reconciler, SyncHandle};
pub use error::{SyncError, SyncResult};
pub use progress::{FileReport, ProgressEvent, ProgressSender, RunReport, TableReport};
pub use scanner::{marker_of, scan, ChangeBatch};
pub use state::{Direction, DriverState, TableStep};
pub use strategy::{
    InsertOrReplace, MergeDisposition, MergeStrategy, NaturalKeyMerge, StrategyRegistry,
    HIERARCHY_TABLE,
};
pub use watermark::{set_watermark, watermark};
