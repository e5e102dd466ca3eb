// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for ListDB tables.

use listdb_oplog::{OpLogError, RestoreError};
use thiserror::Error;

/// Errors that can occur when opening or mutating a table.
#[derive(Debug, Error)]
pub enum ListDbError {
    /// An I/O error occurred on one of the table files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The primary file and the log could not be reconciled.
    #[error("restore failed: {0}")]
    Restore(#[from] RestoreError),

    /// A document could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A position outside the document list was requested.
    #[error("index {index} is out of range for {len} documents")]
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Document count at the time of the call.
        len: usize,
    },

    /// The table was closed or dropped.
    #[error("table '{0}' is closed")]
    Closed(String),

    /// The registry already holds a different kind of table under this key.
    #[error("table '{0}' is already open as a different table kind")]
    TableKindMismatch(String),

    /// A lock was poisoned by a panicking thread.
    #[error("lock poisoned: internal concurrency error")]
    LockPoisoned,
}

impl From<OpLogError> for ListDbError {
    fn from(err: OpLogError) -> Self {
        match err {
            OpLogError::Io(err) => Self::Io(err),
            OpLogError::Restore(err) => Self::Restore(err),
        }
    }
}

/// Convenience alias pinning the error type to [`ListDbError`].
pub type Result<T> = std::result::Result<T, ListDbError>;
