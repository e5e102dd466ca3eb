// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for operation log parsing and replay

#![no_main]

use libfuzzer_sys::fuzz_target;
use listdb_oplog::{replay, LogEntry, RestorePolicy};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // First half is the journal, second half the log.
    let split = text.len() / 2;
    let split = (split..=text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    let (journal, log) = text.split_at(split);

    let journal: Vec<String> = journal.lines().map(str::to_string).collect();
    let log: Vec<String> = log.lines().map(str::to_string).collect();

    // Parsed entries print back to a line that parses to the same entry.
    for line in &log {
        if let Some(entry) = LogEntry::parse(line) {
            assert_eq!(LogEntry::parse(&entry.to_line()), Some(entry));
        }
    }

    // Tolerant replay never fails and never panics; strict replay may fail.
    let tolerant = replay(journal.clone(), Some(log.as_slice()), RestorePolicy::Tolerant);
    assert!(tolerant.is_ok());
    let _ = replay(journal, Some(log.as_slice()), RestorePolicy::Strict);
});
