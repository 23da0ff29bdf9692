//! Input enumeration.

use crate::cli::error::HelpfulError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions selected when walking a directory.
pub const DB_EXTENSIONS: [&str; 5] = ["sqlite", "sqlite3", "db", "db3", "sqlitedb"];

/// Companion files carved alongside a database.
pub const COMPANION_SUFFIXES: [&str; 2] = ["-journal", "-wal"];

/// Returns true if a file found while walking should be carved.
pub fn is_carvable(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let base = COMPANION_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name);
    Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            DB_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Expand files and directories into the list of files to carve.
///
/// Files named explicitly are always kept. Directories are walked
/// recursively and filtered with [`is_carvable`]. Order follows the
/// arguments, then file name; duplicates are dropped.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, HelpfulError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(HelpfulError::path_not_found(path));
        }
        if path.is_file() {
            if seen.insert(path.clone()) {
                inputs.push(path.clone());
            }
            continue;
        }

        for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry under {}: {}", path.display(), err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_carvable(entry.path()) {
                continue;
            }
            let found = entry.into_path();
            if seen.insert(found.clone()) {
                inputs.push(found);
            }
        }
    }

    debug!("Collected {} input files", inputs.len());
    Ok(inputs)
}
