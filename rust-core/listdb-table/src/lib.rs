// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Table crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded, append-only list database. A table is an ordered list of
// serde documents kept in memory and made durable by a journal file plus an
// operation log (see `listdb-oplog`). Reopening a table replays the log, so
// every acknowledged mutation survives a crash; `flush()` compacts both
// files.
//
// ## Usage
//
// ```no_run
// use listdb_table::{Document, Registry, RegistryConfig};
// use serde::{Deserialize, Serialize};
//
// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
// struct Task { title: String, done: bool }
//
// impl Document for Task {}
//
// let registry = Registry::new(RegistryConfig::from_env());
// let tasks = registry.table::<Task>(None).unwrap();
// tasks.save(Task { title: "write docs".into(), done: false }).unwrap();
// for task in tasks.find(|t| !t.done) {
//     println!("{}", task.title);
// }
// ```

pub mod codec;
pub mod config;
pub mod error;
pub mod indexed;
pub mod paths;
pub mod registry;
pub mod table;

mod restore;

pub use codec::{decode, default_table_name, encode, Document};
pub use config::{RegistryConfig, TableConfig, TableMode, DATA_DIR_ENV};
pub use error::{ListDbError, Result};
pub use indexed::{HasId, IndexedTable};
pub use paths::{TablePaths, TABLE_EXTENSION};
pub use registry::{RegisteredTable, Registry};
pub use table::{Find, SaveOutcome, Table};

pub use listdb_oplog::{RestoreError, RestorePolicy, SyncMode};
