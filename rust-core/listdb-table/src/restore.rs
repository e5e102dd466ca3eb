// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table recovery on open.
//
// 1. A leftover `.new.tmp` is an interrupted compaction and is deleted.
// 2. A leftover `.new` is a completed compaction: the log is discarded,
//    then `.new` replaces the primary file. Until the rename, `.new` still
//    exists, so an interrupted promotion is simply repeated.
// 3. The log is replayed over the primary file.
// 4. Document lines are decoded.

use std::fs;

use listdb_oplog::{read_lines, replay, RestoreError, RestorePolicy};
use tracing::{debug, info, warn};

use crate::codec::{decode, Document};
use crate::error::Result;
use crate::paths::{remove_if_exists, TablePaths};

/// Documents rebuilt from disk.
#[derive(Debug)]
pub(crate) struct Restored<T> {
    pub documents: Vec<T>,
    /// Log entries found after the last `flushed` header.
    pub pending: usize,
    /// First inconsistency tolerated under `RestorePolicy::Tolerant`.
    pub first_error: Option<RestoreError>,
    /// No log existed, so the primary file was read as fully compacted.
    pub log_missing: bool,
}

pub(crate) fn restore<T: Document>(paths: &TablePaths, policy: RestorePolicy) -> Result<Restored<T>> {
    if remove_if_exists(&paths.tmp_file)? {
        warn!(
            table = %paths.name,
            file = %paths.tmp_file.display(),
            "Removed incomplete compaction file"
        );
    }

    if paths.new_file.exists() {
        remove_if_exists(&paths.log)?;
        remove_if_exists(&paths.file)?;
        fs::rename(&paths.new_file, &paths.file)?;
        info!(table = %paths.name, "Promoted completed compaction file");
    }

    let primary = read_lines(&paths.file)?.unwrap_or_default();
    let log = read_lines(&paths.log)?;
    let log_missing = log.is_none();
    let replayed = replay(primary, log.as_deref(), policy)?;

    let mut first_error = replayed.first_error;
    let mut documents = Vec::with_capacity(replayed.lines.len());
    for (position, line) in replayed.lines.iter().enumerate() {
        match decode::<T>(line) {
            Ok(document) => documents.push(document),
            Err(err) => {
                let error = RestoreError::CorruptDocument {
                    position,
                    message: err.to_string(),
                };
                match policy {
                    RestorePolicy::Strict => return Err(error.into()),
                    RestorePolicy::Tolerant => {
                        warn!(table = %paths.name, error = %error, "Skipping undecodable document");
                        first_error.get_or_insert(error);
                    }
                }
            }
        }
    }

    debug!(
        table = %paths.name,
        documents = documents.len(),
        pending = replayed.pending,
        "Restored table"
    );

    Ok(Restored {
        documents,
        pending: replayed.pending,
        first_error,
        log_missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        n: u32,
    }

    impl Document for Item {}

    fn paths(dir: &TempDir) -> TablePaths {
        TablePaths::new(dir.path(), "Items")
    }

    #[test]
    fn test_fresh_table_is_empty() {
        let dir = TempDir::new().unwrap();
        let restored = restore::<Item>(&paths(&dir), RestorePolicy::Strict).unwrap();
        assert!(restored.documents.is_empty());
        assert_eq!(restored.pending, 0);
    }

    #[test]
    fn test_completed_compaction_wins() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.file, "{\"n\":1}\n{\"n\":2}\n").unwrap();
        fs::write(&paths.log, "added: 0\nadded: 1\ndeleted: 0\n").unwrap();
        fs::write(&paths.new_file, "{\"n\":2}\n").unwrap();

        let restored = restore::<Item>(&paths, RestorePolicy::Strict).unwrap();
        assert_eq!(restored.documents, vec![Item { n: 2 }]);
        assert!(!paths.new_file.exists());
        assert!(!paths.log.exists());
    }

    #[test]
    fn test_interrupted_promotion_is_repeated() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        // Log already removed, old journal still in place.
        fs::write(&paths.file, "{\"n\":1}\n{\"n\":2}\n").unwrap();
        fs::write(&paths.new_file, "{\"n\":2}\n").unwrap();

        let restored = restore::<Item>(&paths, RestorePolicy::Strict).unwrap();
        assert_eq!(restored.documents, vec![Item { n: 2 }]);
        assert!(restored.log_missing);
        assert!(!paths.new_file.exists());
    }

    #[test]
    fn test_incomplete_compaction_is_discarded() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.file, "{\"n\":1}\n").unwrap();
        fs::write(&paths.log, "added: 0\n").unwrap();
        fs::write(&paths.tmp_file, "{\"n\":").unwrap();

        let restored = restore::<Item>(&paths, RestorePolicy::Strict).unwrap();
        assert_eq!(restored.documents, vec![Item { n: 1 }]);
        assert_eq!(restored.pending, 1);
        assert!(!restored.log_missing);
        assert!(!paths.tmp_file.exists());
    }

    #[test]
    fn test_corrupt_document_follows_policy() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.file, "{\"n\":1}\nnot json\n").unwrap();

        let err = restore::<Item>(&paths, RestorePolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            crate::ListDbError::Restore(RestoreError::CorruptDocument { position: 1, .. })
        ));

        let restored = restore::<Item>(&paths, RestorePolicy::Tolerant).unwrap();
        assert_eq!(restored.documents, vec![Item { n: 1 }]);
        assert!(matches!(
            restored.first_error,
            Some(RestoreError::CorruptDocument { position: 1, .. })
        ));
    }
}
