//! Error types for Gridsync core.

use thiserror::Error;

use gridsync_engine::WorkbookError;

/// Errors that can occur while binding a workbook to a replicated store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Malformed store key: {key:?}")]
    MalformedKey { key: String },

    #[error("Store carries {present} but not {missing}")]
    DimensionMismatch {
        present: &'static str,
        missing: &'static str,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidMetadata { key: &'static str, value: String },

    #[error("Grid of {num_rows}x{num_cols} exceeds {max_cells} cells")]
    GridTooLarge {
        num_rows: usize,
        num_cols: usize,
        max_cells: usize,
    },

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Peer already joined: {0}")]
    DuplicatePeer(String),

    #[error("Expected {peer} {cell} to be {expected:?}, found {actual:?}")]
    Expectation {
        peer: String,
        cell: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
