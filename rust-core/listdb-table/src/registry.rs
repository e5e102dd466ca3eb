// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table registry.
//
// Two table objects writing the same files would interleave log entries
// and corrupt the table, so tables are opened through a `Registry`, which
// keeps at most one live instance per (directory, table name).
//
// The registry holds weak references only: a table lives as long as some
// caller holds its `Arc`. Each registry-opened table carries a lease that is
// released after its closing flush, and a reopen of the same key waits for
// the previous lease so the old and new instance never overlap on disk. The
// wait happens outside the registry lock.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use tracing::{debug, info};

use crate::codec::Document;
use crate::config::{RegistryConfig, TableConfig};
use crate::error::{ListDbError, Result};
use crate::indexed::{HasId, IndexedTable};
use crate::paths::ensure_directory;
use crate::table::Table;

type TableKey = (PathBuf, String);

/// A table kind the registry can hand out.
pub trait RegisteredTable: Any + Send + Sync {
    /// Canonical directory of the table files.
    fn directory(&self) -> &Path;
    /// Table name.
    fn name(&self) -> &str;
    /// Close the files, flushing if the table mode asks for it.
    fn close(&self) -> Result<()>;
}

impl<T: Document> RegisteredTable for Table<T> {
    fn directory(&self) -> &Path {
        Table::directory(self)
    }

    fn name(&self) -> &str {
        Table::name(self)
    }

    fn close(&self) -> Result<()> {
        Table::close(self)
    }
}

impl<T: HasId> RegisteredTable for IndexedTable<T> {
    fn directory(&self) -> &Path {
        IndexedTable::directory(self)
    }

    fn name(&self) -> &str {
        IndexedTable::name(self)
    }

    fn close(&self) -> Result<()> {
        IndexedTable::close(self)
    }
}

/// Signals that a registry-opened table has closed its files.
#[derive(Debug, Default)]
pub(crate) struct Lease {
    released: Mutex<bool>,
    signal: Condvar,
}

impl Lease {
    fn is_released(&self) -> bool {
        // A poisoned flag can only come from a panicking releaser.
        self.released.lock().map_or(true, |released| *released)
    }

    fn wait(&self) -> Result<()> {
        let mut released = self.released.lock().map_err(|_| ListDbError::LockPoisoned)?;
        while !*released {
            released = self
                .signal
                .wait(released)
                .map_err(|_| ListDbError::LockPoisoned)?;
        }
        Ok(())
    }
}

/// Owned by the table; releases the lease when dropped.
#[derive(Debug)]
pub(crate) struct LeaseGuard(Arc<Lease>);

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Ok(mut released) = self.0.released.lock() {
            *released = true;
        }
        self.0.signal.notify_all();
    }
}

struct Entry {
    table: Weak<dyn Any + Send + Sync>,
    lease: Arc<Lease>,
    kind: &'static str,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.table.strong_count() > 0
    }

    fn is_closing(&self) -> bool {
        !self.is_live() && !self.lease.is_released()
    }
}

/// Opens tables and guarantees a single live instance per key.
///
/// # Example
///
/// ```rust,no_run
/// use listdb_table::{Document, Registry, RegistryConfig};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Note { text: String }
///
/// impl Document for Note {}
///
/// # fn main() -> listdb_table::Result<()> {
/// let registry = Registry::new(RegistryConfig::from_env());
/// let notes = registry.table::<Note>(None)?;
/// notes.save(Note { text: "hello".into() })?;
/// registry.close(&notes)?;
/// # Ok(())
/// # }
/// ```
pub struct Registry {
    config: RegistryConfig,
    tables: Mutex<HashMap<TableKey, Entry>>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// A registry configured from the environment.
    pub fn from_env() -> Self {
        Self::new(RegistryConfig::from_env())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TableKey, Entry>>> {
        self.tables.lock().map_err(|_| ListDbError::LockPoisoned)
    }

    /// The live table for `T` in `directory` (or the default directory),
    /// opening it if needed.
    pub fn table<T: Document>(&self, directory: Option<&Path>) -> Result<Arc<Table<T>>> {
        self.get_or_open(directory, &T::table_name(), |dir, config, lease| {
            Ok(Table::open(dir, config)?.with_lease(lease))
        })
    }

    /// The live indexed table for `T` in `directory` (or the default
    /// directory), opening it if needed.
    pub fn indexed_table<T: HasId>(
        &self,
        directory: Option<&Path>,
    ) -> Result<Arc<IndexedTable<T>>> {
        self.get_or_open(directory, &T::table_name(), |dir, config, lease| {
            Ok(IndexedTable::open(dir, config)?.with_lease(lease))
        })
    }

    fn get_or_open<X, F>(&self, directory: Option<&Path>, name: &str, open: F) -> Result<Arc<X>>
    where
        X: Any + Send + Sync,
        F: FnOnce(&Path, TableConfig, LeaseGuard) -> Result<X>,
    {
        let directory =
            ensure_directory(directory.unwrap_or(self.config.default_directory.as_path()))?;
        let key = (directory, name.to_string());

        loop {
            let mut tables = self.lock()?;
            let closing = match tables.get(&key) {
                Some(entry) => match entry.table.upgrade() {
                    Some(live) => {
                        return live.downcast::<X>().map_err(|_| {
                            debug!(
                                table = name,
                                open_as = entry.kind,
                                requested = type_name::<X>(),
                                "Table kind mismatch"
                            );
                            ListDbError::TableKindMismatch(name.to_string())
                        });
                    }
                    None if !entry.lease.is_released() => Some(Arc::clone(&entry.lease)),
                    None => None,
                },
                None => None,
            };

            if let Some(lease) = closing {
                drop(tables);
                debug!(table = name, "Waiting for the previous instance to close");
                lease.wait()?;
                continue;
            }

            let lease = Arc::new(Lease::default());
            let table = Arc::new(open(
                &key.0,
                self.config.table.clone(),
                LeaseGuard(Arc::clone(&lease)),
            )?);
            let any: Arc<dyn Any + Send + Sync> = table.clone();
            tables.insert(
                key,
                Entry {
                    table: Arc::downgrade(&any),
                    lease,
                    kind: type_name::<X>(),
                },
            );
            return Ok(table);
        }
    }

    /// Unregister `table` and close it. Other holders of the same `Arc` see
    /// [`ListDbError::Closed`] from then on; the next lookup opens a fresh
    /// instance.
    pub fn close<X: RegisteredTable>(&self, table: &Arc<X>) -> Result<()> {
        let key = (table.directory().to_path_buf(), table.name().to_string());
        let mut tables = self.lock()?;
        let this = Arc::as_ptr(table) as *const ();
        let registered = tables
            .get(&key)
            .is_some_and(|entry| entry.table.as_ptr() as *const () == this);
        if registered {
            tables.remove(&key);
        }
        table.close()?;
        info!(table = %key.1, dir = %key.0.display(), "Closed registered table");
        Ok(())
    }

    /// Number of tables currently open through this registry. Entries of
    /// dropped tables are pruned.
    pub fn live_tables(&self) -> Result<usize> {
        let mut tables = self.lock()?;
        tables.retain(|_, entry| entry.is_live() || entry.is_closing());
        Ok(tables.values().filter(|entry| entry.is_live()).count())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
