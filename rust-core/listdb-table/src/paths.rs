// SPDX-License-Identifier: PMPL-1.0-or-later
//! File layout of a table.
//!
//! ```text
//! <dir>/<Name>.listdb           primary file (journal)
//! <dir>/<Name>.listdb.log       operation log
//! <dir>/<Name>.listdb.new       completed compaction, awaiting promotion
//! <dir>/<Name>.listdb.new.tmp   compaction being written
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;

/// Extension of the primary file.
pub const TABLE_EXTENSION: &str = "listdb";

/// Paths of every file belonging to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    /// Table name, e.g. `Notes`.
    pub name: String,
    /// Directory holding the files.
    pub directory: PathBuf,
    /// Primary file.
    pub file: PathBuf,
    /// Operation log.
    pub log: PathBuf,
    /// Completed compaction.
    pub new_file: PathBuf,
    /// Compaction in progress.
    pub tmp_file: PathBuf,
}

impl TablePaths {
    /// Lay out the files of table `name` inside `directory`.
    pub fn new(directory: &Path, name: &str) -> Self {
        let file = directory.join(format!("{name}.{TABLE_EXTENSION}"));
        Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            log: with_suffix(&file, ".log"),
            new_file: with_suffix(&file, ".new"),
            tmp_file: with_suffix(&file, ".new.tmp"),
            file,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Create `directory` if needed and return its canonical form, so that two
/// spellings of the same directory map to the same table.
pub fn ensure_directory(directory: &Path) -> Result<PathBuf> {
    if !directory.exists() {
        fs::create_dir_all(directory)?;
        info!(dir = %directory.display(), "Created table directory");
    }
    Ok(fs::canonicalize(directory)?)
}

/// Remove `path`, treating a missing file as success.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
