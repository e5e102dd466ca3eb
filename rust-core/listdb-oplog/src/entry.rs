// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Operation Log - Entry types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines the log entry and its action. The on-disk form is one text line
// per entry:
//
//   <action>: <index>
//
// where `action` is one of `added`, `replaced`, `inserted`, `deleted` or
// `flushed`, and `index` is a zero-based position into the document list at
// the time the entry was applied (for `flushed`, the compacted count).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Legacy marker written before compaction by older table files. Carries no
/// information and is skipped during replay.
pub const LEGACY_FLUSHING_MARKER: &str = "flushing";

// ---------------------------------------------------------------------------
// LogAction
// ---------------------------------------------------------------------------

/// The mutation recorded by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    /// A document line was appended at the end.
    Added,
    /// The document at `index` was overwritten.
    Replaced,
    /// A document line was inserted at `index`.
    Inserted,
    /// The document at `index` was removed.
    Deleted,
    /// Header: the first `index` primary lines are the compacted list.
    Flushed,
}

impl LogAction {
    /// Returns `true` if the entry consumes a document line from the
    /// primary file during replay.
    pub fn carries_document(self) -> bool {
        matches!(self, Self::Added | Self::Replaced | Self::Inserted)
    }

    /// The keyword written to the log.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Replaced => "replaced",
            Self::Inserted => "inserted",
            Self::Deleted => "deleted",
            Self::Flushed => "flushed",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "replaced" => Ok(Self::Replaced),
            "inserted" => Ok(Self::Inserted),
            "deleted" => Ok(Self::Deleted),
            "flushed" => Ok(Self::Flushed),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// A single entry of the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// What happened.
    pub action: LogAction,
    /// Where it happened.
    pub index: usize,
}

impl LogEntry {
    /// Build an entry.
    pub fn new(action: LogAction, index: usize) -> Self {
        Self { action, index }
    }

    /// Parse one log line. Surrounding whitespace is ignored.
    ///
    /// Returns `None` if the line is not a well-formed entry.
    pub fn parse(line: &str) -> Option<Self> {
        let (action, index) = line.trim().split_once(':')?;
        let action = action.trim().parse::<LogAction>().ok()?;
        let index = index.trim().parse::<usize>().ok()?;
        Some(Self { action, index })
    }

    /// Render the entry as a log line, without the trailing newline.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.index)
    }
}

/// Returns `true` for the legacy `flushing` marker line.
pub fn is_legacy_marker(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(LEGACY_FLUSHING_MARKER)
        .map(|rest| rest.is_empty() || rest.starts_with(':'))
        .unwrap_or(false)
}
