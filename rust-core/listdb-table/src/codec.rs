// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document codec for ListDB.
//
// A document is stored as one compact JSON line. `serde_json` escapes every
// control character inside strings, so an encoded document never contains
// a raw newline and the primary file stays line-oriented.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A record type that can be stored in a table.
///
/// Equality decides whether a saved document is new or already present, so
/// it should compare whatever makes two documents "the same" to the caller.
///
/// # Example
///
/// ```rust
/// use listdb_table::Document;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Bookmark { url: String, title: String }
///
/// impl Document for Bookmark {}
///
/// assert_eq!(Bookmark::table_name(), "Bookmarks");
/// ```
pub trait Document: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync + 'static {
    /// Name of the table holding this type; used to build the file names.
    ///
    /// Defaults to the type's short name followed by `s`.
    fn table_name() -> String {
        default_table_name::<Self>()
    }
}

/// Pluralized short name of `T`: `my_app::model::Note<u8>` becomes `Notes`.
pub fn default_table_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    format!("{short}s")
}

/// Encode `document` as a single line.
pub fn encode<T: Serialize>(document: &T) -> Result<String> {
    let line = serde_json::to_string(document)?;
    debug_assert!(!line.contains('\n'));
    Ok(line)
}

/// Decode a document from one line.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line)?)
}
