// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Operation Log - Append-only writers
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `LineAppender` appends newline-terminated lines to a file without any
// user-space buffering and syncs according to the configured `SyncMode`.
// Both table files (primary journal and log) are written through it.
// `OpLogWriter` layers the entry format on top and knows how to reset the
// log to a fresh `flushed` header after compaction.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::{LogAction, LogEntry};
use crate::error::OpLogResult;

// ---------------------------------------------------------------------------
// SyncMode
// ---------------------------------------------------------------------------

/// Controls how aggressively appends are pushed to stable storage.
///
/// Every append reaches the OS before the call returns, whatever the mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// `sync_data` after every append. Acknowledged operations survive a
    /// power loss.
    #[default]
    Fsync,

    /// `sync_data` at most once per interval.
    Periodic(Duration),

    /// Never sync explicitly; the OS page cache flushes eventually. A
    /// process crash loses nothing, a power loss may.
    Async,
}

// ---------------------------------------------------------------------------
// LineAppender
// ---------------------------------------------------------------------------

/// An unbuffered, append-only line writer.
#[derive(Debug)]
pub struct LineAppender {
    path: PathBuf,
    file: File,
    sync_mode: SyncMode,
    last_sync: Instant,
}

impl LineAppender {
    /// Open `path` for appending, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> OpLogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            sync_mode,
            last_sync: Instant::now(),
        })
    }

    /// Create `path` empty, truncating any previous content.
    pub fn create(path: impl AsRef<Path>, sync_mode: SyncMode) -> OpLogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            sync_mode,
            last_sync: Instant::now(),
        })
    }

    /// Append `line` followed by a newline in a single write.
    ///
    /// `line` must not contain a newline itself.
    pub fn append_line(&mut self, line: &str) -> OpLogResult<()> {
        debug_assert!(!line.contains('\n'), "appended line contains a newline");

        let mut buffer = Vec::with_capacity(line.len() + 1);
        buffer.extend_from_slice(line.as_bytes());
        buffer.push(b'\n');
        self.file.write_all(&buffer)?;

        self.maybe_sync()
    }

    /// Force a `sync_data` regardless of the sync mode.
    pub fn sync(&mut self) -> OpLogResult<()> {
        self.file.sync_data()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Current length of the file in bytes.
    pub fn file_len(&self) -> OpLogResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Cut the file back to `len` bytes, discarding anything appended after
    /// that point. A file that is not longer than `len` is left alone.
    pub fn truncate(&mut self, len: u64) -> OpLogResult<()> {
        if self.file_len()? > len {
            self.file.set_len(len)?;
            self.maybe_sync()?;
        }
        Ok(())
    }

    /// The file this appender writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured sync mode.
    pub fn sync_mode(&self) -> &SyncMode {
        &self.sync_mode
    }

    fn maybe_sync(&mut self) -> OpLogResult<()> {
        match &self.sync_mode {
            SyncMode::Fsync => self.sync()?,
            SyncMode::Periodic(interval) => {
                if self.last_sync.elapsed() >= *interval {
                    self.sync()?;
                }
            }
            SyncMode::Async => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OpLogWriter
// ---------------------------------------------------------------------------

/// A point in the log that [`OpLogWriter::rollback`] can return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMark {
    len: u64,
    pending: usize,
}

/// Appends operation entries to a table's log file.
#[derive(Debug)]
pub struct OpLogWriter {
    appender: LineAppender,
    /// Entries appended since the last `flushed` header.
    pending: usize,
}

impl OpLogWriter {
    /// Open an existing log (or create an empty one) for appending.
    ///
    /// `pending` is the number of entries already present after the last
    /// `flushed` header, as found by replay.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode, pending: usize) -> OpLogResult<Self> {
        Ok(Self {
            appender: LineAppender::open(path, sync_mode)?,
            pending,
        })
    }

    /// Append one entry.
    pub fn append(&mut self, entry: LogEntry) -> OpLogResult<()> {
        self.appender.append_line(&entry.to_line())?;
        self.pending += 1;
        debug!(entry = %entry, log = %self.appender.path().display(), "Appended log entry");
        Ok(())
    }

    /// Truncate the log and write a `flushed: count` header. The header is
    /// always synced.
    pub fn reset(&mut self, count: usize) -> OpLogResult<()> {
        let sync_mode = self.appender.sync_mode().clone();
        let mut appender = LineAppender::create(self.appender.path(), sync_mode)?;
        appender.append_line(&LogEntry::new(LogAction::Flushed, count).to_line())?;
        appender.sync()?;
        self.appender = appender;
        self.pending = 0;
        Ok(())
    }

    /// Remember the current end of the log.
    pub fn mark(&self) -> OpLogResult<LogMark> {
        Ok(LogMark {
            len: self.appender.file_len()?,
            pending: self.pending,
        })
    }

    /// Drop every entry appended after `mark`, including a partly written
    /// one.
    pub fn rollback(&mut self, mark: LogMark) -> OpLogResult<()> {
        self.appender.truncate(mark.len)?;
        self.pending = mark.pending;
        Ok(())
    }

    /// Number of entries written since the last `flushed` header.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        self.appender.path()
    }

    /// Force a sync of the log file.
    pub fn sync(&mut self) -> OpLogResult<()> {
        self.appender.sync()
    }
}
