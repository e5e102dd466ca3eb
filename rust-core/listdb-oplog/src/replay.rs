// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Operation Log - Deterministic replay
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rebuilds a table's document lines from its primary file and log. The
// primary file is a journal: the compacted list written by the last flush,
// followed by one line per document-carrying log entry. Replay walks the log
// in order and pulls document lines from the journal as entries need them.
//
// Documents stay as raw lines here; decoding is the table's job.

use std::vec::IntoIter;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::{is_legacy_marker, LogAction, LogEntry};
use crate::error::RestoreError;

/// What to do when replay finds an inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorePolicy {
    /// Abort on the first inconsistency.
    #[default]
    Strict,
    /// Reconstruct as much as possible and record the first inconsistency.
    Tolerant,
}

/// The outcome of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Replayed {
    /// Document lines in list order.
    pub lines: Vec<String>,
    /// Log entries found after the `flushed` header.
    pub pending: usize,
    /// First inconsistency met under `RestorePolicy::Tolerant`.
    pub first_error: Option<RestoreError>,
}

/// Replay `log` over `primary`.
///
/// With no log, every primary line is a document. Under
/// `RestorePolicy::Strict` the first inconsistency is returned as an error.
pub fn replay(
    primary: Vec<String>,
    log: Option<&[String]>,
    policy: RestorePolicy,
) -> Result<Replayed, RestoreError> {
    let Some(log) = log else {
        debug!(documents = primary.len(), "No log, taking primary file as is");
        return Ok(Replayed {
            lines: primary,
            ..Replayed::default()
        });
    };

    let mut replay = Replay {
        journal: primary.into_iter(),
        lines: Vec::new(),
        policy,
        first_error: None,
    };

    let mut seen_entries = 0usize;
    let mut pending = 0usize;

    for (number, text) in log.iter().enumerate() {
        let line = number + 1;
        if text.trim().is_empty() || is_legacy_marker(text) {
            continue;
        }

        let Some(entry) = LogEntry::parse(text) else {
            replay.fail(RestoreError::MalformedEntry {
                line,
                text: text.clone(),
            })?;
            continue;
        };

        if entry.action == LogAction::Flushed {
            if seen_entries > 0 {
                replay.fail(RestoreError::MisplacedFlushMarker { line })?;
            } else {
                replay.load_flushed(entry.index)?;
            }
        } else {
            replay.apply(entry)?;
            pending += 1;
        }
        seen_entries += 1;
    }

    let leftover = replay.journal.len();
    if leftover > 0 {
        replay.fail(RestoreError::UnreplayedDocuments { count: leftover })?;
    }

    debug!(
        documents = replay.lines.len(),
        pending,
        "Replayed operation log"
    );

    Ok(Replayed {
        lines: replay.lines,
        pending,
        first_error: replay.first_error,
    })
}

struct Replay {
    journal: IntoIter<String>,
    lines: Vec<String>,
    policy: RestorePolicy,
    first_error: Option<RestoreError>,
}

impl Replay {
    fn fail(&mut self, error: RestoreError) -> Result<(), RestoreError> {
        match self.policy {
            RestorePolicy::Strict => Err(error),
            RestorePolicy::Tolerant => {
                warn!(error = %error, "Tolerating restore error");
                if self.first_error.is_none() {
                    self.first_error = Some(error);
                }
                Ok(())
            }
        }
    }

    fn load_flushed(&mut self, expected: usize) -> Result<(), RestoreError> {
        for found in 0..expected {
            match self.journal.next() {
                Some(line) => self.lines.push(line),
                None => {
                    return self.fail(RestoreError::MissingFlushedDocuments { expected, found });
                }
            }
        }
        Ok(())
    }

    fn next_document(&mut self, entry: LogEntry) -> Result<Option<String>, RestoreError> {
        match self.journal.next() {
            Some(line) => Ok(Some(line)),
            None => {
                self.fail(RestoreError::MissingDocument {
                    action: entry.action,
                    index: entry.index,
                })?;
                Ok(None)
            }
        }
    }

    fn out_of_range(&mut self, entry: LogEntry) -> Result<(), RestoreError> {
        let len = self.lines.len();
        self.fail(RestoreError::IndexOutOfRange {
            action: entry.action,
            index: entry.index,
            len,
        })
    }

    fn apply(&mut self, entry: LogEntry) -> Result<(), RestoreError> {
        let index = entry.index;
        match entry.action {
            LogAction::Deleted => {
                if index < self.lines.len() {
                    self.lines.remove(index);
                } else {
                    self.out_of_range(entry)?;
                }
            }
            LogAction::Replaced => {
                let Some(document) = self.next_document(entry)? else {
                    return Ok(());
                };
                if index < self.lines.len() {
                    self.lines[index] = document;
                } else {
                    self.out_of_range(entry)?;
                }
            }
            LogAction::Added => {
                let Some(document) = self.next_document(entry)? else {
                    return Ok(());
                };
                let len = self.lines.len();
                if index != len {
                    self.fail(RestoreError::AddedIndexMismatch { index, len })?;
                }
                self.lines.push(document);
            }
            LogAction::Inserted => {
                let Some(document) = self.next_document(entry)? else {
                    return Ok(());
                };
                if index <= self.lines.len() {
                    self.lines.insert(index, document);
                } else {
                    self.out_of_range(entry)?;
                    self.lines.push(document);
                }
            }
            LogAction::Flushed => unreachable!("flushed headers are handled by the caller"),
        }
        Ok(())
    }
}
