//! Declared column type -> [`StorageClass`] resolution.
//!
//! Keyword rules are checked in order and the first hit wins. Anything that
//! matches nothing falls back to `Numeric`, like SQLite's own affinity rules.

use crate::types::StorageClass;

/// Keyword groups in priority order. `INTEGER PRIMARY KEY` is handled first,
/// separately, because it is a phrase rather than a keyword.
const RULES: &[(&[&str], StorageClass)] = &[
    (&["BOOL"], StorageClass::Boolean),
    (&["INT"], StorageClass::Integer),
    (&["DATE", "TIME"], StorageClass::DateLike),
    (&["CHAR", "TEXT", "CLOB"], StorageClass::Text),
    (&["BLOB", "GUID", "UUID"], StorageClass::Blob),
    (&["REAL", "DOUB", "FLOA"], StorageClass::Real),
    (&["NUMERIC", "JSON", "DECIMAL"], StorageClass::Numeric),
];

/// Normalized (upper-cased, single-spaced) declaration text.
fn normalize(declared: &str) -> String {
    declared
        .split_whitespace()
        .map(|word| word.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a declared column type such as `"VARCHAR(255) NOT NULL"`.
pub fn resolve_declared_type(declared: &str) -> StorageClass {
    let decl = normalize(declared);

    if decl.contains("INTEGER PRIMARY KEY") {
        return StorageClass::RowidAlias;
    }

    let base = RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| decl.contains(kw)))
        .map(|(_, class)| *class)
        .unwrap_or(StorageClass::Numeric);

    if decl.contains("NOT NULL") {
        base.not_null()
    } else {
        base
    }
}

/// Returns true if the declaration carries a `DEFAULT` clause.
pub fn has_default(declared: &str) -> bool {
    normalize(declared)
        .split(' ')
        .any(|word| word == "DEFAULT")
}
