//! # Tandem Store
//!
//! Single-file table store underlying the Tandem reconciler.
//!
//! This crate provides:
//! - [`DatabaseFile`]: a named container of tables backed by one file
//! - [`Table`] / [`Row`] / [`Value`]: typed rows over an implicit
//!   integer primary key
//! - Schema declarations with nullability and foreign-key checks
//! - Atomic persistence (write-temp, fsync, rename) and exclusive
//!   advisory file locking
//!
//! ## Design Principles
//!
//! - A missing file is an empty database, not an error
//! - Mutation goes through [`DatabaseFile::upsert`] so cross-table
//!   reference checks always run
//! - Reserved names (the `_sync_state` table, the `sync_stamp` column)
//!   belong to the synchronizer, not the application
//!
//! ## Example
//!
//! ```no_run
//! use tandem_store::{ColumnKind, ColumnSpec, DatabaseFile, Row, TableSchema};
//! use std::path::Path;
//!
//! let mut db = DatabaseFile::open(Path::new("surveys.db")).unwrap();
//! db.ensure_table(
//!     TableSchema::new("surveys").with_column(ColumnSpec::new("title", ColumnKind::Text)),
//! );
//! db.upsert("surveys", Row::new(1).with("title", "Q3 feedback")).unwrap();
//! db.save().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod schema;
mod table;
mod value;

pub use error::{StoreError, StoreResult};
pub use file::DatabaseFile;
pub use schema::{
    is_reserved_table, ColumnKind, ColumnSpec, TableSchema, RESERVED_TABLE_PREFIX,
    SYNC_MARKER_COLUMN, SYNC_META_TABLE,
};
pub use table::{Row, RowId, Table};
pub use value::{Value, ValueKind};
