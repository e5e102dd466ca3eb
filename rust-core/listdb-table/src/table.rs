// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The ListDB table.
//
// A table is an ordered list of documents of one type, held in memory and
// backed by two files: the primary journal and the operation log (see the
// `listdb-oplog` crate). Every mutating call appends the document line (if
// any) to the journal, then the log entry, then updates the list, then
// fires events; all of it under one mutex, so calls never interleave.
//
// `flush()` compacts: the current list is written to a fresh primary file
// and the log is reset to a `flushed` header.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use listdb_oplog::{LineAppender, LogAction, LogEntry, OpLogWriter, RestoreError, SyncMode};
use tracing::{debug, info, warn};

use crate::codec::{encode, Document};
use crate::config::{TableConfig, TableMode};
use crate::error::{ListDbError, Result};
use crate::paths::{ensure_directory, remove_if_exists, TablePaths};
use crate::registry::LeaseGuard;
use crate::restore::restore;

/// What a save, add or insert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new document was appended.
    Added,
    /// An equal document was overwritten in place.
    Updated,
    /// An equal document was moved to the end.
    MovedToEnd,
    /// An equal document was moved to the requested index.
    Moved,
    /// A new document was inserted at the requested index.
    Inserted,
}

impl SaveOutcome {
    /// Returns `true` if no equal document existed before the call.
    pub fn is_new(self) -> bool {
        matches!(self, Self::Added | Self::Inserted)
    }
}

pub(crate) type Handler<T> = Box<dyn Fn(&T, bool) + Send + Sync>;

// ---------------------------------------------------------------------------
// Open files
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct TableFiles {
    data: LineAppender,
    log: OpLogWriter,
}

impl TableFiles {
    fn open(paths: &TablePaths, sync_mode: &SyncMode, pending: usize) -> Result<Self> {
        Ok(Self {
            data: LineAppender::open(&paths.file, sync_mode.clone())?,
            log: OpLogWriter::open(&paths.log, sync_mode.clone(), pending)?,
        })
    }

    fn create(paths: &TablePaths, sync_mode: &SyncMode) -> Result<Self> {
        LineAppender::create(&paths.log, sync_mode.clone())?;
        Ok(Self {
            data: LineAppender::create(&paths.file, sync_mode.clone())?,
            log: OpLogWriter::open(&paths.log, sync_mode.clone(), 0)?,
        })
    }

    fn append(&mut self, line: Option<&str>, entries: &[LogEntry]) -> Result<()> {
        if let Some(line) = line {
            self.data.append_line(line)?;
        }
        for entry in entries {
            self.log.append(*entry)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Locked state
// ---------------------------------------------------------------------------

/// Everything guarded by the table mutex.
pub(crate) struct TableState<T> {
    name: String,
    pub(crate) documents: Vec<T>,
    files: Option<TableFiles>,
    saved: Vec<Handler<T>>,
    removed: Vec<Handler<T>>,
    /// Highest id handed out; only indexed tables use it.
    pub(crate) last_id: i64,
}

impl<T: Document> TableState<T> {
    fn files(&mut self) -> Result<&mut TableFiles> {
        match self.files.as_mut() {
            Some(files) => Ok(files),
            None => Err(ListDbError::Closed(self.name.clone())),
        }
    }

    pub(crate) fn position(&self, document: &T) -> Option<usize> {
        self.documents.iter().position(|d| d == document)
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index > len {
            return Err(ListDbError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    /// Append the document line (if any), then the log entries. A failed
    /// write is cut back out of both files; if that fails too, the table is
    /// closed rather than left with uncommitted lines in its journal.
    fn write(&mut self, document: Option<&T>, entries: &[LogEntry]) -> Result<()> {
        let line = document.map(encode).transpose()?;
        let files = self.files()?;
        let data_len = files.data.file_len()?;
        let mark = files.log.mark()?;

        let Err(err) = files.append(line.as_deref(), entries) else {
            return Ok(());
        };
        let rolled_back = files
            .data
            .truncate(data_len)
            .and_then(|()| files.log.rollback(mark));
        if let Err(rollback) = rolled_back {
            warn!(
                table = %self.name,
                error = %rollback,
                "Could not undo a failed write, closing table"
            );
            self.files = None;
        }
        Err(err)
    }

    fn fire_saved(&self, index: usize, as_new: bool) {
        let document = &self.documents[index];
        for handler in &self.saved {
            handler(document, as_new);
        }
    }

    fn fire_removed(&self, document: &T, success: bool) {
        for handler in &self.removed {
            handler(document, success);
        }
    }

    pub(crate) fn save(&mut self, found: Option<usize>, document: T) -> Result<SaveOutcome> {
        match found {
            Some(index) => {
                self.write(
                    Some(&document),
                    &[LogEntry::new(LogAction::Replaced, index)],
                )?;
                self.documents[index] = document;
                self.fire_saved(index, false);
                Ok(SaveOutcome::Updated)
            }
            None => self.append(document),
        }
    }

    pub(crate) fn add(&mut self, found: Option<usize>, document: T) -> Result<SaveOutcome> {
        match found {
            Some(index) => {
                let last = self.documents.len() - 1;
                self.write(
                    Some(&document),
                    &[
                        LogEntry::new(LogAction::Deleted, index),
                        LogEntry::new(LogAction::Added, last),
                    ],
                )?;
                self.documents.remove(index);
                self.documents.push(document);
                self.fire_saved(last, false);
                Ok(SaveOutcome::MovedToEnd)
            }
            None => self.append(document),
        }
    }

    pub(crate) fn insert(
        &mut self,
        found: Option<usize>,
        index: usize,
        document: T,
    ) -> Result<SaveOutcome> {
        match found {
            Some(old) => {
                self.check_index(index, self.documents.len() - 1)?;
                self.write(
                    Some(&document),
                    &[
                        LogEntry::new(LogAction::Deleted, old),
                        LogEntry::new(LogAction::Inserted, index),
                    ],
                )?;
                self.documents.remove(old);
                self.documents.insert(index, document);
                self.fire_saved(index, false);
                Ok(SaveOutcome::Moved)
            }
            None => {
                self.check_index(index, self.documents.len())?;
                self.write(
                    Some(&document),
                    &[LogEntry::new(LogAction::Inserted, index)],
                )?;
                self.documents.insert(index, document);
                self.fire_saved(index, true);
                Ok(SaveOutcome::Inserted)
            }
        }
    }

    fn append(&mut self, document: T) -> Result<SaveOutcome> {
        let index = self.documents.len();
        self.write(Some(&document), &[LogEntry::new(LogAction::Added, index)])?;
        self.documents.push(document);
        self.fire_saved(index, true);
        Ok(SaveOutcome::Added)
    }

    fn remove(&mut self, document: &T) -> Result<bool> {
        match self.position(document) {
            Some(index) => {
                self.write(None, &[LogEntry::new(LogAction::Deleted, index)])?;
                let removed = self.documents.remove(index);
                self.fire_removed(&removed, true);
                Ok(true)
            }
            None => {
                self.fire_removed(document, false);
                Ok(false)
            }
        }
    }

    fn remove_at(&mut self, index: usize) -> Result<T> {
        let len = self.documents.len();
        if index >= len {
            return Err(ListDbError::IndexOutOfRange { index, len });
        }
        self.write(None, &[LogEntry::new(LogAction::Deleted, index)])?;
        let removed = self.documents.remove(index);
        self.fire_removed(&removed, true);
        Ok(removed)
    }

    fn flush(&mut self, paths: &TablePaths, sync_mode: &SyncMode) -> Result<()> {
        self.files()?;

        // The `.new` file is the commit point: once it exists, a reopen
        // takes it as the primary file and ignores the log.
        let mut compacted = LineAppender::create(&paths.tmp_file, SyncMode::Async)?;
        for document in &self.documents {
            compacted.append_line(&encode(document)?)?;
        }
        compacted.sync()?;
        drop(compacted);
        fs::rename(&paths.tmp_file, &paths.new_file)?;

        let count = self.documents.len();
        let files = self.files()?;
        files.log.reset(count)?;

        remove_if_exists(&paths.file)?;
        fs::rename(&paths.new_file, &paths.file)?;
        files.data = LineAppender::open(&paths.file, sync_mode.clone())?;

        info!(table = %paths.name, documents = count, "Flushed table");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// An ordered, durable list of documents of type `T`.
///
/// The table behaves like an ordered set under value equality: saving,
/// adding or inserting a document equal to a stored one updates or moves
/// the stored one instead of adding a copy.
///
/// Tables are normally obtained through a [`Registry`](crate::Registry),
/// which guarantees a single open instance per directory and type. Opening
/// the same files twice through [`Table::open`] corrupts the log.
///
/// Event handlers run under the table lock and must not call back into the
/// same table.
pub struct Table<T: Document> {
    paths: TablePaths,
    config: TableConfig,
    first_restore_error: Option<RestoreError>,
    state: Mutex<TableState<T>>,
    /// Held by registry-opened tables. Fields drop after `Drop::drop`, so
    /// the lease outlives the closing flush.
    _lease: Option<LeaseGuard>,
}

impl<T: Document> Table<T> {
    /// Open (or create) the table for `T` in `directory`, replaying its log.
    pub fn open(directory: impl AsRef<Path>, config: TableConfig) -> Result<Self> {
        let directory = ensure_directory(directory.as_ref())?;
        let paths = TablePaths::new(&directory, &T::table_name());

        let restored = restore::<T>(&paths, config.restore_policy)?;
        let mut files = TableFiles::open(&paths, &config.sync_mode, restored.pending)?;
        if restored.log_missing && !restored.documents.is_empty() {
            // Without a header, replay would read the primary file as an
            // empty journal and the first new entry would not line up.
            files.log.reset(restored.documents.len())?;
        }
        let needs_flush = restored.first_error.is_some()
            || (config.mode.flush_on_start && restored.pending > 0);

        let table = Self {
            state: Mutex::new(TableState {
                name: paths.name.clone(),
                documents: restored.documents,
                files: Some(files),
                saved: Vec::new(),
                removed: Vec::new(),
                last_id: 0,
            }),
            paths,
            config,
            first_restore_error: restored.first_error,
            _lease: None,
        };

        if needs_flush {
            table.flush()?;
        }

        info!(
            table = %table.paths.name,
            file = %table.paths.file.display(),
            restore_error = table.first_restore_error.is_some(),
            "Opened table"
        );

        Ok(table)
    }

    pub(crate) fn with_lease(mut self, lease: LeaseGuard) -> Self {
        self._lease = Some(lease);
        self
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, TableState<T>>> {
        self.state.lock().map_err(|_| ListDbError::LockPoisoned)
    }

    // -- mutations ---------------------------------------------------------

    /// Overwrite the equal document in place, or append `document`.
    ///
    /// Returns [`SaveOutcome::Updated`] or [`SaveOutcome::Added`].
    pub fn save(&self, document: T) -> Result<SaveOutcome> {
        let mut state = self.lock()?;
        let found = state.position(&document);
        state.save(found, document)
    }

    /// Append `document`, moving an equal stored document to the end.
    ///
    /// Returns [`SaveOutcome::MovedToEnd`] or [`SaveOutcome::Added`].
    pub fn add(&self, document: T) -> Result<SaveOutcome> {
        let mut state = self.lock()?;
        let found = state.position(&document);
        state.add(found, document)
    }

    /// [`add`](Self::add) every document in order, under one lock.
    pub fn add_range(&self, documents: impl IntoIterator<Item = T>) -> Result<Vec<SaveOutcome>> {
        let mut state = self.lock()?;
        documents
            .into_iter()
            .map(|document| {
                let found = state.position(&document);
                state.add(found, document)
            })
            .collect()
    }

    /// Insert `document` at `index`. An equal stored document is removed
    /// first and the index applies to the shortened list.
    ///
    /// Returns [`SaveOutcome::Moved`] or [`SaveOutcome::Inserted`]; an index
    /// past the end is rejected before anything is written.
    pub fn insert(&self, index: usize, document: T) -> Result<SaveOutcome> {
        let mut state = self.lock()?;
        let found = state.position(&document);
        state.insert(found, index, document)
    }

    /// Insert the documents at consecutive positions starting at `index`.
    pub fn insert_range(
        &self,
        index: usize,
        documents: impl IntoIterator<Item = T>,
    ) -> Result<Vec<SaveOutcome>> {
        let mut state = self.lock()?;
        documents
            .into_iter()
            .enumerate()
            .map(|(offset, document)| {
                let found = state.position(&document);
                state.insert(found, index + offset, document)
            })
            .collect()
    }

    /// Remove the first document equal to `document`.
    pub fn remove(&self, document: &T) -> Result<bool> {
        self.lock()?.remove(document)
    }

    /// Remove and return the document at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        self.lock()?.remove_at(index)
    }

    /// Remove `count` documents starting at `index`.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<()> {
        let mut state = self.lock()?;
        let len = state.documents.len();
        match index.checked_add(count) {
            Some(end) if end <= len => {}
            _ => return Err(ListDbError::IndexOutOfRange { index, len }),
        }
        for _ in 0..count {
            state.remove_at(index)?;
        }
        Ok(())
    }

    /// Remove every document matching `predicate`; returns how many.
    pub fn remove_all(&self, mut predicate: impl FnMut(&T) -> bool) -> Result<usize> {
        let mut state = self.lock()?;
        let matched: Vec<T> = state
            .documents
            .iter()
            .filter(|d| predicate(*d))
            .cloned()
            .collect();
        for document in &matched {
            state.remove(document)?;
        }
        Ok(matched.len())
    }

    // -- maintenance -------------------------------------------------------

    /// Rewrite the primary file from the current list and reset the log.
    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush(&self.paths, &self.config.sync_mode)
    }

    /// Forget every document and delete both files. The table stays closed
    /// until [`clear`](Self::clear) recreates it.
    pub fn drop_table(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.documents.clear();
        state.files = None;
        for path in [
            &self.paths.file,
            &self.paths.log,
            &self.paths.new_file,
            &self.paths.tmp_file,
        ] {
            remove_if_exists(path)?;
        }
        info!(table = %self.paths.name, "Dropped table");
        Ok(())
    }

    /// Remove every document, leaving empty files behind.
    pub fn clear(&self) -> Result<()> {
        self.drop_table()?;
        let mut state = self.lock()?;
        state.files = Some(TableFiles::create(&self.paths, &self.config.sync_mode)?);
        Ok(())
    }

    /// Close the files, flushing first if the mode asks for it. Further
    /// mutations fail with [`ListDbError::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.files.is_none() {
            return Ok(());
        }
        if self.config.mode.flush_on_close {
            state.flush(&self.paths, &self.config.sync_mode)?;
        }
        state.files = None;
        debug!(table = %self.paths.name, "Closed table");
        Ok(())
    }

    /// Returns `true` once the table is closed or dropped.
    pub fn is_closed(&self) -> Result<bool> {
        Ok(self.lock()?.files.is_none())
    }

    // -- events ------------------------------------------------------------

    /// Call `handler(document, as_new)` after every committed save, add or
    /// insert.
    pub fn on_saved(&self, handler: impl Fn(&T, bool) + Send + Sync + 'static) -> Result<()> {
        self.lock()?.saved.push(Box::new(handler));
        Ok(())
    }

    /// Call `handler(document, success)` after every remove attempt.
    pub fn on_removed(&self, handler: impl Fn(&T, bool) + Send + Sync + 'static) -> Result<()> {
        self.lock()?.removed.push(Box::new(handler));
        Ok(())
    }

    // -- reads -------------------------------------------------------------

    /// Lazily yield the documents matching `predicate`.
    ///
    /// The iterator takes the lock for each step and holds no snapshot:
    /// mutations made between steps are visible, positions may shift.
    pub fn find<P>(&self, predicate: P) -> Find<'_, T, P>
    where
        P: FnMut(&T) -> bool,
    {
        Find {
            table: self,
            predicate,
            position: 0,
        }
    }

    /// Number of documents.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.documents.len())
    }

    /// Returns `true` if the table holds no documents.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.documents.is_empty())
    }

    /// A copy of the document at `index`.
    pub fn get(&self, index: usize) -> Result<Option<T>> {
        Ok(self.lock()?.documents.get(index).cloned())
    }

    /// Position of the first document equal to `document`.
    pub fn index_of(&self, document: &T) -> Result<Option<usize>> {
        Ok(self.lock()?.position(document))
    }

    /// A snapshot of every document, in order.
    pub fn documents(&self) -> Result<Vec<T>> {
        Ok(self.lock()?.documents.clone())
    }

    /// The first document.
    pub fn first(&self) -> Result<Option<T>> {
        Ok(self.lock()?.documents.first().cloned())
    }

    /// The last document.
    pub fn last(&self) -> Result<Option<T>> {
        Ok(self.lock()?.documents.last().cloned())
    }

    /// The first document matching `predicate`.
    pub fn first_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Result<Option<T>> {
        Ok(self.lock()?.documents.iter().find(|d| predicate(*d)).cloned())
    }

    /// The last document matching `predicate`.
    pub fn last_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Result<Option<T>> {
        Ok(self
            .lock()?
            .documents
            .iter()
            .rev()
            .find(|d| predicate(*d))
            .cloned())
    }

    /// Log entries written since the last flush.
    pub fn pending_entries(&self) -> Result<usize> {
        let mut state = self.lock()?;
        Ok(state.files()?.log.pending())
    }

    // -- metadata ----------------------------------------------------------

    /// Table name, e.g. `Notes`.
    pub fn name(&self) -> &str {
        &self.paths.name
    }

    /// Primary file path.
    pub fn file(&self) -> &Path {
        &self.paths.file
    }

    /// Log file path.
    pub fn log_file(&self) -> &Path {
        &self.paths.log
    }

    /// Directory holding the table files.
    pub fn directory(&self) -> &Path {
        &self.paths.directory
    }

    /// Compaction flags.
    pub fn mode(&self) -> TableMode {
        self.config.mode
    }

    /// The first inconsistency tolerated while opening, if any.
    pub fn first_restore_error(&self) -> Option<&RestoreError> {
        self.first_restore_error.as_ref()
    }
}

impl<T: Document> Drop for Table<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(table = %self.paths.name, error = %err, "Ignoring error while closing table");
        }
    }
}

impl<T: Document> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.paths.name)
            .field("file", &self.paths.file)
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Find
// ---------------------------------------------------------------------------

/// Lazy iterator returned by [`Table::find`].
pub struct Find<'a, T: Document, P> {
    table: &'a Table<T>,
    predicate: P,
    position: usize,
}

impl<T, P> Iterator for Find<'_, T, P>
where
    T: Document,
    P: FnMut(&T) -> bool,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let state = match self.table.lock() {
            Ok(state) => state,
            Err(err) => {
                warn!(table = %self.table.name(), error = %err, "Ending find on unusable table");
                return None;
            }
        };
        while let Some(document) = state.documents.get(self.position) {
            self.position += 1;
            if (self.predicate)(document) {
                return Some(document.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        title: String,
        done: bool,
    }

    impl Document for Task {}

    fn task(title: &str) -> Task {
        Task {
            title: title.to_string(),
            done: false,
        }
    }

    fn config() -> TableConfig {
        TableConfig::default()
            .with_mode(TableMode::NONE)
            .with_sync_mode(SyncMode::Async)
    }

    fn log_text(table: &Table<Task>) -> String {
        fs::read_to_string(table.log_file()).unwrap()
    }

    #[test]
    fn test_save_twice_updates() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();

        assert_eq!(table.save(task("a")).unwrap(), SaveOutcome::Added);
        assert_eq!(table.save(task("a")).unwrap(), SaveOutcome::Updated);
        assert_eq!(table.count().unwrap(), 1);
        assert_eq!(log_text(&table), "added: 0\nreplaced: 0\n");
    }

    #[test]
    fn test_add_existing_moves_to_end() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.add_range([task("a"), task("b"), task("c")]).unwrap();

        assert_eq!(table.add(task("a")).unwrap(), SaveOutcome::MovedToEnd);
        assert_eq!(
            table.documents().unwrap(),
            vec![task("b"), task("c"), task("a")]
        );
        assert!(log_text(&table).ends_with("deleted: 0\nadded: 2\n"));
    }

    #[test]
    fn test_insert_existing_logs_delete_then_insert() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.add_range([task("a"), task("b"), task("c")]).unwrap();

        assert_eq!(table.insert(0, task("c")).unwrap(), SaveOutcome::Moved);
        assert_eq!(
            table.documents().unwrap(),
            vec![task("c"), task("a"), task("b")]
        );
        assert!(log_text(&table).ends_with("deleted: 2\ninserted: 0\n"));
    }

    #[test]
    fn test_insert_past_end_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.save(task("a")).unwrap();

        let err = table.insert(2, task("b")).unwrap_err();
        assert!(matches!(err, ListDbError::IndexOutOfRange { index: 2, len: 1 }));

        // Moving the only document to index 1 is out of range as well.
        let err = table.insert(1, task("a")).unwrap_err();
        assert!(matches!(err, ListDbError::IndexOutOfRange { index: 1, len: 0 }));

        assert_eq!(log_text(&table), "added: 0\n");
    }

    #[test]
    fn test_remove_range_counts_length() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table
            .add_range(["a", "b", "c", "d", "e"].map(task))
            .unwrap();

        table.remove_range(1, 3).unwrap();
        assert_eq!(table.documents().unwrap(), vec![task("a"), task("e")]);

        assert!(table.remove_range(1, 2).is_err());
        assert_eq!(table.count().unwrap(), 2);
    }

    #[test]
    fn test_remove_all_fires_events() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&removed);
        table
            .on_removed(move |_, success| {
                if success {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        table.add_range(["x1", "y", "x2"].map(task)).unwrap();
        let count = table.remove_all(|t| t.title.starts_with('x')).unwrap();

        assert_eq!(count, 2);
        assert_eq!(removed.load(Ordering::SeqCst), 2);
        assert_eq!(table.documents().unwrap(), vec![task("y")]);
    }

    #[test]
    fn test_saved_event_reports_newness() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        table
            .on_saved(move |doc, as_new| sink.lock().unwrap().push((doc.title.clone(), as_new)))
            .unwrap();

        table.save(task("a")).unwrap();
        table.save(task("a")).unwrap();
        table.insert(0, task("b")).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("a".to_string(), true),
                ("a".to_string(), false),
                ("b".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_find_is_lazy_and_restartable() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.add_range(["a1", "b", "a2"].map(task)).unwrap();

        let mut found = table.find(|t| t.title.starts_with('a'));
        assert_eq!(found.next(), Some(task("a1")));
        table.add(task("a3")).unwrap();
        assert_eq!(found.next(), Some(task("a2")));
        assert_eq!(found.next(), Some(task("a3")));
        assert_eq!(found.next(), None);

        assert_eq!(table.find(|t| t.title.starts_with('a')).count(), 3);
    }

    #[test]
    fn test_flush_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.add_range(["a", "b"].map(task)).unwrap();
        table.remove(&task("a")).unwrap();

        table.flush().unwrap();
        let first = table.documents().unwrap();
        assert_eq!(table.pending_entries().unwrap(), 0);
        assert_eq!(log_text(&table), "flushed: 1\n");

        table.flush().unwrap();
        assert_eq!(table.documents().unwrap(), first);
        assert_eq!(table.pending_entries().unwrap(), 0);
        assert_eq!(log_text(&table), "flushed: 1\n");
        assert_eq!(fs::read_to_string(table.file()).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_drop_and_clear() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.save(task("a")).unwrap();

        table.drop_table().unwrap();
        assert!(!table.file().exists());
        assert!(!table.log_file().exists());
        assert!(matches!(table.save(task("b")), Err(ListDbError::Closed(_))));

        table.clear().unwrap();
        assert!(table.file().exists());
        assert_eq!(table.save(task("b")).unwrap(), SaveOutcome::Added);
        assert_eq!(table.documents().unwrap(), vec![task("b")]);
    }

    #[test]
    fn test_first_and_last() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        assert_eq!(table.first().unwrap(), None);

        table.add_range(["a1", "b", "a2"].map(task)).unwrap();
        assert_eq!(table.first().unwrap(), Some(task("a1")));
        assert_eq!(table.last().unwrap(), Some(task("a2")));
        assert_eq!(table.last_where(|t| t.title == "b").unwrap(), Some(task("b")));
        assert_eq!(table.first_where(|t| t.done).unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_log_write_leaves_no_stray_document() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.save(task("a")).unwrap();
        let journal = fs::read_to_string(table.file()).unwrap();

        // Every write to /dev/full fails with ENOSPC.
        let real_log = {
            let mut state = table.lock().unwrap();
            let files = state.files.as_mut().unwrap();
            let full = OpLogWriter::open("/dev/full", SyncMode::Async, 0).unwrap();
            std::mem::replace(&mut files.log, full)
        };

        assert!(matches!(table.save(task("b")), Err(ListDbError::Io(_))));
        assert_eq!(table.documents().unwrap(), vec![task("a")]);
        assert_eq!(fs::read_to_string(table.file()).unwrap(), journal);

        table.lock().unwrap().files.as_mut().unwrap().log = real_log;
        table.save(task("c")).unwrap();
        drop(table);

        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        assert_eq!(table.documents().unwrap(), vec![task("a"), task("c")]);
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let dir = TempDir::new().unwrap();
        let table = Table::<Task>::open(dir.path(), config()).unwrap();
        table.save(task("a")).unwrap();

        let panicked = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _state = table.lock().unwrap();
                    panic!("writer died while holding the table lock");
                })
                .join()
                .is_err()
        });
        assert!(panicked);

        assert!(matches!(table.count(), Err(ListDbError::LockPoisoned)));
        assert_eq!(table.find(|_| true).next(), None);
    }
}
