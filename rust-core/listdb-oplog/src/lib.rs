// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Operation Log crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provides crash recovery for ListDB tables. Every mutation of a table is
// recorded as one line in an append-only log before the call returns; the
// document it carries (if any) is appended to the table's primary file. On
// open, the log is replayed over the primary file to rebuild the exact
// document list as of the last acknowledged operation.
//
// ## On-disk format
//
// ```text
// Names.listdb       one JSON document per line (journal)
// Names.listdb.log   flushed: <n>        -- first line after a flush
//                    added: <index>      -- consumes one journal line
//                    replaced: <index>   -- consumes one journal line
//                    inserted: <index>   -- consumes one journal line
//                    deleted: <index>
// ```
//
// ## Usage
//
// ```no_run
// use listdb_oplog::{replay, read_lines, LogAction, LogEntry, OpLogWriter, RestorePolicy, SyncMode};
// use std::path::Path;
//
// let mut log = OpLogWriter::open("/tmp/Notes.listdb.log", SyncMode::Fsync, 0).unwrap();
// log.append(LogEntry::new(LogAction::Deleted, 0)).unwrap();
//
// let primary = read_lines(Path::new("/tmp/Notes.listdb")).unwrap().unwrap_or_default();
// let entries = read_lines(Path::new("/tmp/Notes.listdb.log")).unwrap();
// let replayed = replay(primary, entries.as_deref(), RestorePolicy::Strict).unwrap();
// println!("{} documents", replayed.lines.len());
// ```

pub mod entry;
pub mod error;
pub mod reader;
pub mod replay;
pub mod writer;

pub use entry::{LogAction, LogEntry};
pub use error::{OpLogError, OpLogResult, RestoreError};
pub use reader::read_lines;
pub use replay::{replay, Replayed, RestorePolicy};
pub use writer::{LineAppender, LogMark, OpLogWriter, SyncMode};
