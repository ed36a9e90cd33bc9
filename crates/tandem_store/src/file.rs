//! Single-file database container.
//!
//! Each database is one file on disk holding a CBOR image of its
//! tables, plus a `<name>.lock` sidecar:
//!
//! ```text
//! <dir>/
//! ├─ hierarchy.db          # CBOR image of all tables
//! ├─ hierarchy.db.lock     # Advisory lock, held while the file is open
//! └─ hierarchy.db.tmp      # Transient, atomic-save staging
//! ```
//!
//! The lock file ensures only one handle can mutate a database file at a
//! time. Saves are atomic: write temp, fsync, rename, fsync directory.

use crate::error::{StoreError, StoreResult};
use crate::schema::{is_reserved_table, ColumnSpec, TableSchema};
use crate::table::{Row, Table};
use crate::value::Value;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk image format version.
const FORMAT_VERSION: u16 = 1;

/// Suffix of the advisory lock sidecar.
const LOCK_SUFFIX: &str = "lock";

/// Suffix of the atomic-save staging file.
const TEMP_SUFFIX: &str = "tmp";

/// The serialized form of a database file.
#[derive(Debug, Serialize, Deserialize)]
struct FileImage {
    format_version: u16,
    tables: BTreeMap<String, Table>,
}

/// An open database file: a named container of tables.
///
/// Opening acquires an exclusive advisory lock that is held until the
/// handle is dropped, so a file pair being merged cannot be mutated by
/// a second synchronizer run. A missing file opens as an empty database
/// and is created on first [`save`](Self::save).
pub struct DatabaseFile {
    path: PathBuf,
    tables: BTreeMap<String, Table>,
    /// Lock sidecar handle, held for exclusive access.
    _lock_file: File,
}

impl std::fmt::Debug for DatabaseFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseFile")
            .field("path", &self.path)
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DatabaseFile {
    /// Opens a database file, creating parent directories as needed.
    ///
    /// A missing data file is treated as an empty database, not an
    /// error. A corrupt or version-mismatched image is surfaced to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileLocked`] if another handle holds the
    /// lock, [`StoreError::Decode`] / [`StoreError::InvalidFormat`] for
    /// unreadable images, and I/O errors otherwise.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling_path(path, LOCK_SUFFIX))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::FileLocked);
        }

        let tables = if path.exists() {
            let data = fs::read(path)?;
            if data.is_empty() {
                BTreeMap::new()
            } else {
                let image: FileImage = ciborium::de::from_reader(data.as_slice())
                    .map_err(|e| StoreError::decode(e.to_string()))?;
                if image.format_version != FORMAT_VERSION {
                    return Err(StoreError::invalid_format(format!(
                        "unsupported format version {} (expected {})",
                        image.format_version, FORMAT_VERSION
                    )));
                }
                image.tables
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            tables,
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists the database image atomically.
    ///
    /// Uses the write-then-rename pattern: write to a temp file, sync
    /// it, rename over the data file, then fsync the directory so the
    /// rename is durable.
    pub fn save(&self) -> StoreResult<()> {
        let image = FileImage {
            format_version: FORMAT_VERSION,
            tables: self.tables.clone(),
        };
        let mut data = Vec::new();
        ciborium::ser::into_writer(&image, &mut data)
            .map_err(|e| StoreError::encode(e.to_string()))?;

        let temp_path = sibling_path(&self.path, TEMP_SUFFIX);
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        sync_parent_dir(&self.path)?;
        Ok(())
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Names of non-reserved tables, ascending.
    pub fn user_table_names(&self) -> Vec<String> {
        self.tables
            .keys()
            .filter(|name| !is_reserved_table(name))
            .cloned()
            .collect()
    }

    /// Creates the table if it does not exist.
    ///
    /// Returns true if the table was created. An existing table is left
    /// untouched even if its schema differs.
    pub fn ensure_table(&mut self, schema: TableSchema) -> bool {
        if self.tables.contains_key(&schema.name) {
            return false;
        }
        self.tables.insert(schema.name.clone(), Table::new(schema));
        true
    }

    /// Adds a column to an existing table's schema if absent.
    ///
    /// Existing rows are untouched; the new column reads as null for
    /// them. Returns true if the column was added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TableNotFound`] if the table does not
    /// exist.
    pub fn ensure_column(&mut self, table: &str, spec: ColumnSpec) -> StoreResult<bool> {
        let table = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        if table.schema.has_column(&spec.name) {
            return Ok(false);
        }
        table.schema.columns.push(spec);
        Ok(true)
    }

    /// Drops any existing table of this name and recreates it empty.
    ///
    /// Used to recover metadata tables whose stored shape is no longer
    /// readable.
    pub fn reset_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), Table::new(schema));
    }

    /// Inserts or replaces a row by primary key, after validation.
    ///
    /// Validation covers: every field must name a declared column and
    /// match its kind; non-nullable columns must carry a non-null value;
    /// reference columns must point at an existing row of the referenced
    /// table (a row may reference its own key).
    pub fn upsert(&mut self, table_name: &str, row: Row) -> StoreResult<()> {
        self.validate(table_name, &row)?;
        let table = self
            .tables
            .get_mut(table_name)
            .ok_or_else(|| StoreError::table_not_found(table_name))?;
        table.put(row);
        Ok(())
    }

    fn validate(&self, table_name: &str, row: &Row) -> StoreResult<()> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::table_not_found(table_name))?;

        for column in &table.schema.columns {
            let value = row.get(&column.name);
            if value.is_null() {
                if !column.nullable {
                    return Err(StoreError::type_mismatch(
                        table_name,
                        &column.name,
                        "null value in non-nullable column",
                    ));
                }
                continue;
            }
            column
                .check_value(value)
                .map_err(|message| StoreError::type_mismatch(table_name, &column.name, message))?;

            if let (Some(target), Value::Integer(key)) = (&column.references, value) {
                let resolves = if target == table_name {
                    table.contains(*key) || *key == row.id
                } else {
                    self.tables
                        .get(target.as_str())
                        .is_some_and(|t| t.contains(*key))
                };
                if !resolves {
                    return Err(StoreError::ForeignKeyViolation {
                        table: table_name.to_string(),
                        column: column.name.clone(),
                        value: *key,
                    });
                }
            }
        }

        for field in row.fields.keys() {
            if !table.schema.has_column(field) {
                return Err(StoreError::UnknownColumn {
                    table: table_name.to_string(),
                    column: field.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Builds a sibling path with an extra suffix, e.g. `x.db` → `x.db.lock`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Fsyncs the parent directory so a rename is durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

/// Windows NTFS journaling covers metadata durability; no directory
/// fsync is available there.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> StoreResult<()> {
    Ok(())
}
