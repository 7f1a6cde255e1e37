//! Error types for the FlatGeobuf driver.

use std::io;
use thiserror::Error;

/// Errors that can occur while reading a FlatGeobuf file.
#[derive(Debug, Error)]
pub enum FgbError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The magic bytes or the header table could not be read.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A single record could not be decoded. Fatal for that record only.
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// Resolving a row failed. I/O failures, malformed records and out of
    /// range indices are all folded into this condition; the original
    /// failure, if any, is kept as the error source.
    #[error("Row {row} not found")]
    RowNotFound {
        row: u64,
        #[source]
        cause: Option<Box<FgbError>>,
    },

    #[error("Column {column} out of range (field count {field_count})")]
    ColumnOutOfRange { column: usize, field_count: usize },

    /// Arguments a caller passed in violate the operation's contract.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("File has no spatial index")]
    NoSpatialIndex,

    #[error("Driver is closed")]
    Closed,
}

impl FgbError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        FgbError::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub(crate) fn row_not_found(row: u64, cause: Option<FgbError>) -> Self {
        FgbError::RowNotFound {
            row,
            cause: cause.map(Box::new),
        }
    }

    /// Returns true for the row-not-found condition of the row/column contract.
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, FgbError::RowNotFound { .. })
    }

    /// Returns true if the record bytes themselves are undecodable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FgbError::MalformedRecord { .. })
    }
}

/// Result type for driver operations
pub type FgbResult<T> = Result<T, FgbError>;
