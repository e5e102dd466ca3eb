// SPDX-License-Identifier: PMPL-1.0-or-later
//
// ListDB Operation Log - Readers for crash recovery
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Loads the raw lines of a table's primary file and log file. Parsing and
// validation happen in `replay`, so that every inconsistency is reported
// through `RestoreError` and subject to the restore policy.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use tracing::debug;

use crate::error::OpLogResult;

/// Read all lines of `path`, with line terminators stripped (including a
/// trailing `\r`).
///
/// Returns `Ok(None)` if the file does not exist.
pub fn read_lines(path: &Path) -> OpLogResult<Option<Vec<String>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let mut line = line?;
        if line.ends_with('\r') {
            line.pop();
        }
        lines.push(line);
    }

    debug!(path = %path.display(), count = lines.len(), "Read table file");

    Ok(Some(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_lines(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn test_strips_line_terminators() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lines");
        fs::write(&path, "a\r\nb\nc").unwrap();

        let lines = read_lines(&path).unwrap().unwrap();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_file_has_no_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lines");
        fs::write(&path, "").unwrap();

        assert_eq!(read_lines(&path).unwrap(), Some(Vec::new()));
    }
}
