//! Error types for the table store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The on-disk image could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// The on-disk image could not be encoded.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the encode failure.
        message: String,
    },

    /// Invalid database file format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Another handle holds the exclusive lock on this file.
    #[error("database file locked: another process has exclusive access")]
    FileLocked,

    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the table.
        name: String,
    },

    /// A row carries a column the table schema does not declare.
    #[error("unknown column {column:?} in table {table:?}")]
    UnknownColumn {
        /// Table the row targets.
        table: String,
        /// The undeclared column name.
        column: String,
    },

    /// A row value does not match the declared column kind.
    #[error("type mismatch for column {column:?} in table {table:?}: {message}")]
    TypeMismatch {
        /// Table the row targets.
        table: String,
        /// The offending column name.
        column: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A reference column points at a row that does not exist.
    #[error("foreign key violation: {table}.{column} references missing row {value}")]
    ForeignKeyViolation {
        /// Table the row targets.
        table: String,
        /// The reference column name.
        column: String,
        /// The dangling key value.
        value: i64,
    },
}

impl StoreError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a table-not-found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }
}
