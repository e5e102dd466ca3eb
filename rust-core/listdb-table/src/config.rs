// SPDX-License-Identifier: PMPL-1.0-or-later
//! Table and registry configuration.
//!
//! Defaults follow the behaviour tables have always had: flush on close,
//! no flush on start, fsync on every append, strict restore.

use std::path::PathBuf;

use listdb_oplog::{RestorePolicy, SyncMode};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the default table directory.
pub const DATA_DIR_ENV: &str = "LISTDB_DATA_DIR";

/// When a table compacts itself on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableMode {
    /// Flush when the table is closed or its last handle is dropped.
    pub flush_on_close: bool,
    /// Flush right after opening if the log carried any entries.
    pub flush_on_start: bool,
}

impl TableMode {
    /// Neither flag set. A table opened in this mode only compacts on an
    /// explicit `flush()`.
    pub const NONE: Self = Self {
        flush_on_close: false,
        flush_on_start: false,
    };
}

impl Default for TableMode {
    fn default() -> Self {
        Self {
            flush_on_close: true,
            flush_on_start: false,
        }
    }
}

/// Per-table settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Compaction flags.
    pub mode: TableMode,
    /// Durability of each append.
    pub sync_mode: SyncMode,
    /// Reaction to an inconsistent log on open.
    pub restore_policy: RestorePolicy,
}

impl TableConfig {
    /// Builder-style setter for the mode.
    pub fn with_mode(mut self, mode: TableMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder-style setter for the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Builder-style setter for the restore policy.
    pub fn with_restore_policy(mut self, restore_policy: RestorePolicy) -> Self {
        self.restore_policy = restore_policy;
        self
    }
}

/// Settings shared by every table a registry opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory used when a caller does not name one.
    pub default_directory: PathBuf,
    /// Settings applied to each opened table.
    pub table: TableConfig,
}

impl RegistryConfig {
    /// Defaults, with the directory taken from `LISTDB_DATA_DIR` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            config.default_directory = PathBuf::from(dir);
        }
        config
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_directory: std::env::temp_dir().join("listdb"),
            table: TableConfig::default(),
        }
    }
}
