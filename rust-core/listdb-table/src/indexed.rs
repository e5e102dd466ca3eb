// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Indexed tables.
//
// An indexed table hands every newly stored document a unique, strictly
// increasing 64-bit id. Ids are taken from the wall clock in nanoseconds and
// bumped past the last id handed out, so they are never reused even if the
// clock steps back. Lookups by id are linear scans.

use std::fmt;
use std::path::Path;

use chrono::Utc;
use listdb_oplog::RestoreError;

use crate::codec::Document;
use crate::config::{TableConfig, TableMode};
use crate::error::Result;
use crate::registry::LeaseGuard;
use crate::table::{Find, SaveOutcome, Table, TableState};

/// A document carrying a table-assigned id.
///
/// An id of `0` means "not assigned yet". Only the table calls
/// [`set_id`](HasId::set_id).
pub trait HasId: Document {
    /// The assigned id, or `0`.
    fn id(&self) -> i64;

    /// Store a freshly assigned id.
    fn set_id(&mut self, id: i64);
}

/// A [`Table`] whose documents get unique ids on insertion.
///
/// A document with a non-zero id is matched against stored documents by id;
/// one without is matched by value equality. Mutating calls take the
/// document by `&mut` so the caller sees the assigned id.
pub struct IndexedTable<T: HasId> {
    table: Table<T>,
}

impl<T: HasId> IndexedTable<T> {
    /// Open (or create) the indexed table for `T` in `directory`.
    pub fn open(directory: impl AsRef<Path>, config: TableConfig) -> Result<Self> {
        let table = Table::open(directory, config)?;
        {
            let mut state = table.lock()?;
            state.last_id = state.documents.iter().map(HasId::id).max().unwrap_or(0);
        }
        Ok(Self { table })
    }

    pub(crate) fn with_lease(self, lease: LeaseGuard) -> Self {
        Self {
            table: self.table.with_lease(lease),
        }
    }

    fn locate(state: &TableState<T>, document: &T) -> Option<usize> {
        match document.id() {
            0 => state.position(document),
            id => state.documents.iter().position(|d| d.id() == id),
        }
    }

    fn assign_id(state: &mut TableState<T>, document: &mut T) {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let id = now.max(state.last_id + 1);
        state.last_id = id;
        document.set_id(id);
    }

    /// Locate `document`, give it an id if it is new, and run `store`. If a
    /// new document fails to store, the caller gets it back unchanged.
    fn store_with<F>(
        state: &mut TableState<T>,
        document: &mut T,
        store: F,
    ) -> Result<SaveOutcome>
    where
        F: FnOnce(&mut TableState<T>, Option<usize>, T) -> Result<SaveOutcome>,
    {
        let found = Self::locate(state, document);
        let previous_id = document.id();
        if found.is_none() {
            Self::assign_id(state, document);
        }
        let outcome = store(state, found, document.clone());
        if outcome.is_err() && found.is_none() {
            document.set_id(previous_id);
        }
        outcome
    }

    /// Overwrite the matching document, or append `document` under a new id.
    pub fn save(&self, document: &mut T) -> Result<SaveOutcome> {
        let mut state = self.table.lock()?;
        Self::store_with(&mut state, document, |state, found, doc| state.save(found, doc))
    }

    /// Move the matching document to the end, or append `document` under a
    /// new id.
    pub fn add(&self, document: &mut T) -> Result<SaveOutcome> {
        let mut state = self.table.lock()?;
        Self::store_with(&mut state, document, |state, found, doc| state.add(found, doc))
    }

    /// [`add`](Self::add) every document in order, under one lock. Stops at
    /// the first failure; documents stored before it keep their ids.
    pub fn add_range(&self, documents: &mut [T]) -> Result<Vec<SaveOutcome>> {
        let mut state = self.table.lock()?;
        let mut outcomes = Vec::with_capacity(documents.len());
        for document in documents.iter_mut() {
            outcomes.push(Self::store_with(&mut state, document, |state, found, doc| {
                state.add(found, doc)
            })?);
        }
        Ok(outcomes)
    }

    /// Move the matching document to `index`, or insert `document` there
    /// under a new id.
    pub fn insert(&self, index: usize, document: &mut T) -> Result<SaveOutcome> {
        let mut state = self.table.lock()?;
        Self::store_with(&mut state, document, |state, found, doc| {
            state.insert(found, index, doc)
        })
    }

    /// Insert the documents at consecutive positions starting at `index`.
    pub fn insert_range(&self, index: usize, documents: &mut [T]) -> Result<Vec<SaveOutcome>> {
        let mut outcomes = Vec::with_capacity(documents.len());
        for (offset, document) in documents.iter_mut().enumerate() {
            outcomes.push(self.insert(index + offset, document)?);
        }
        Ok(outcomes)
    }

    /// The document with id `id`, if stored.
    pub fn get_by_id(&self, id: i64) -> Result<Option<T>> {
        Ok(self
            .table
            .lock()?
            .documents
            .iter()
            .find(|d| d.id() == id)
            .cloned())
    }

    /// Highest id handed out so far.
    pub fn last_id(&self) -> Result<i64> {
        Ok(self.table.lock()?.last_id)
    }

    /// Remove the first document equal to `document`.
    pub fn remove(&self, document: &T) -> Result<bool> {
        self.table.remove(document)
    }

    /// Remove the document with id `id`.
    pub fn remove_by_id(&self, id: i64) -> Result<bool> {
        Ok(self.table.remove_all(|d| d.id() == id)? > 0)
    }

    /// Remove and return the document at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        self.table.remove_at(index)
    }

    /// Remove `count` documents starting at `index`.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<()> {
        self.table.remove_range(index, count)
    }

    /// Remove every document matching `predicate`; returns how many.
    pub fn remove_all(&self, predicate: impl FnMut(&T) -> bool) -> Result<usize> {
        self.table.remove_all(predicate)
    }

    /// See [`Table::flush`].
    pub fn flush(&self) -> Result<()> {
        self.table.flush()
    }

    /// See [`Table::drop_table`].
    pub fn drop_table(&self) -> Result<()> {
        self.table.drop_table()
    }

    /// See [`Table::clear`].
    pub fn clear(&self) -> Result<()> {
        self.table.clear()
    }

    /// See [`Table::close`].
    pub fn close(&self) -> Result<()> {
        self.table.close()
    }

    pub fn is_closed(&self) -> Result<bool> {
        self.table.is_closed()
    }

    /// See [`Table::on_saved`].
    pub fn on_saved(&self, handler: impl Fn(&T, bool) + Send + Sync + 'static) -> Result<()> {
        self.table.on_saved(handler)
    }

    /// See [`Table::on_removed`].
    pub fn on_removed(&self, handler: impl Fn(&T, bool) + Send + Sync + 'static) -> Result<()> {
        self.table.on_removed(handler)
    }

    /// See [`Table::find`].
    pub fn find<P>(&self, predicate: P) -> Find<'_, T, P>
    where
        P: FnMut(&T) -> bool,
    {
        self.table.find(predicate)
    }

    pub fn count(&self) -> Result<usize> {
        self.table.count()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.table.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<T>> {
        self.table.get(index)
    }

    pub fn index_of(&self, document: &T) -> Result<Option<usize>> {
        self.table.index_of(document)
    }

    pub fn documents(&self) -> Result<Vec<T>> {
        self.table.documents()
    }

    pub fn first(&self) -> Result<Option<T>> {
        self.table.first()
    }

    pub fn last(&self) -> Result<Option<T>> {
        self.table.last()
    }

    pub fn pending_entries(&self) -> Result<usize> {
        self.table.pending_entries()
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn file(&self) -> &Path {
        self.table.file()
    }

    pub fn log_file(&self) -> &Path {
        self.table.log_file()
    }

    pub fn directory(&self) -> &Path {
        self.table.directory()
    }

    pub fn mode(&self) -> TableMode {
        self.table.mode()
    }

    pub fn first_restore_error(&self) -> Option<&RestoreError> {
        self.table.first_restore_error()
    }
}

impl<T: HasId> fmt::Debug for IndexedTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexedTable").field(&self.table).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listdb_oplog::SyncMode;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        id: i64,
        name: String,
    }

    impl Document for Contact {}

    impl HasId for Contact {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn contact(name: &str) -> Contact {
        Contact {
            id: 0,
            name: name.to_string(),
        }
    }

    fn config() -> TableConfig {
        TableConfig::default()
            .with_mode(TableMode::NONE)
            .with_sync_mode(SyncMode::Async)
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let dir = TempDir::new().unwrap();
        let table = IndexedTable::<Contact>::open(dir.path(), config()).unwrap();

        let mut ids = Vec::new();
        for i in 0..50 {
            let mut c = contact(&format!("c{i}"));
            assert_eq!(table.save(&mut c).unwrap(), SaveOutcome::Added);
            ids.push(c.id);
        }

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table.last_id().unwrap(), *ids.last().unwrap());
    }

    #[test]
    fn test_edited_document_updates_by_id() {
        let dir = TempDir::new().unwrap();
        let table = IndexedTable::<Contact>::open(dir.path(), config()).unwrap();

        let mut c = contact("Ada");
        table.save(&mut c).unwrap();
        let id = c.id;

        c.name = "Ada L.".to_string();
        assert_eq!(table.save(&mut c).unwrap(), SaveOutcome::Updated);
        assert_eq!(c.id, id);
        assert_eq!(table.count().unwrap(), 1);
        assert_eq!(table.get_by_id(id).unwrap().unwrap().name, "Ada L.");
    }

    #[test]
    fn test_get_by_id_missing() {
        let dir = TempDir::new().unwrap();
        let table = IndexedTable::<Contact>::open(dir.path(), config()).unwrap();
        assert_eq!(table.get_by_id(12345).unwrap(), None);
    }

    #[test]
    fn test_failed_insert_leaves_id_untouched() {
        let dir = TempDir::new().unwrap();
        let table = IndexedTable::<Contact>::open(dir.path(), config()).unwrap();

        let mut c = contact("x");
        assert!(table.insert(3, &mut c).is_err());
        assert_eq!(c.id, 0);
        assert!(table.is_empty().unwrap());
    }

    #[test]
    fn test_failed_save_and_add_leave_id_untouched() {
        let dir = TempDir::new().unwrap();
        let table = IndexedTable::<Contact>::open(dir.path(), config()).unwrap();
        let mut kept = contact("kept");
        table.save(&mut kept).unwrap();
        table.close().unwrap();

        let mut c = contact("x");
        assert!(table.save(&mut c).is_err());
        assert_eq!(c.id, 0);
        assert!(table.add(&mut c).is_err());
        assert_eq!(c.id, 0);

        let mut batch = [contact("y"), contact("z")];
        assert!(table.add_range(&mut batch).is_err());
        assert!(batch.iter().all(|d| d.id == 0));

        // A stored document keeps its id even when the call fails.
        let id = kept.id;
        assert!(table.save(&mut kept).is_err());
        assert_eq!(kept.id, id);
    }

    #[test]
    fn test_remove_by_id() {
        let dir = TempDir::new().unwrap();
        let table = IndexedTable::<Contact>::open(dir.path(), config()).unwrap();
        let mut all = [contact("a"), contact("b")];
        table.add_range(&mut all).unwrap();

        assert!(table.remove_by_id(all[0].id).unwrap());
        assert!(!table.remove_by_id(all[0].id).unwrap());
        assert_eq!(table.documents().unwrap(), vec![all[1].clone()]);
    }
}
