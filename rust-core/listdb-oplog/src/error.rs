// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Operation Log - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines the error conditions of the operation log: I/O failures while
// appending or reading, and the inconsistencies that replay can detect
// between the primary file and the log.

use thiserror::Error;

use crate::entry::LogAction;

/// Errors that can occur while writing or reading an operation log.
#[derive(Debug, Error)]
pub enum OpLogError {
    /// An I/O error occurred while reading or writing a table file.
    #[error("operation log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The primary file and the log disagree.
    #[error(transparent)]
    Restore(#[from] RestoreError),
}

/// An inconsistency detected while replaying the log over the primary file.
///
/// Under `RestorePolicy::Strict` the first of these aborts the restore. Under
/// `RestorePolicy::Tolerant` it is recorded and replay carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    /// A log line is not of the form `action: index`.
    #[error("log line {line} is malformed: '{text}'")]
    MalformedEntry {
        /// One-based line number in the log file.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// A `flushed` header appeared after the first entry.
    #[error("log line {line} carries a flushed header that is not the first entry")]
    MisplacedFlushMarker {
        /// One-based line number in the log file.
        line: usize,
    },

    /// The primary file holds fewer lines than the `flushed` header declares.
    #[error("{found} documents in the primary file but {expected} were flushed")]
    MissingFlushedDocuments {
        /// Count declared by the header.
        expected: usize,
        /// Lines actually present.
        found: usize,
    },

    /// A document-carrying entry has no document line left in the primary file.
    #[error("no document in the primary file for {action}: {index}")]
    MissingDocument {
        /// The entry's action.
        action: LogAction,
        /// The entry's index.
        index: usize,
    },

    /// An entry addresses a position outside the current document list.
    #[error("{action}: {index} is out of range for {len} documents")]
    IndexOutOfRange {
        /// The entry's action.
        action: LogAction,
        /// The entry's index.
        index: usize,
        /// Document count when the entry was replayed.
        len: usize,
    },

    /// An `added` entry whose index is not the current document count.
    #[error("added: {index} does not match the document count {len}")]
    AddedIndexMismatch {
        /// The entry's index.
        index: usize,
        /// Document count when the entry was replayed.
        len: usize,
    },

    /// The primary file holds document lines that no log entry accounts for.
    #[error("{count} documents in the primary file are not recorded in the log")]
    UnreplayedDocuments {
        /// Number of leftover lines.
        count: usize,
    },

    /// A document line could not be decoded.
    #[error("document {position} cannot be decoded: {message}")]
    CorruptDocument {
        /// Zero-based position in the reconstructed list.
        position: usize,
        /// Decoder message.
        message: String,
    },
}

/// Convenience type alias for operation log results.
pub type OpLogResult<T> = Result<T, OpLogError>;
