use crate::error::{ContentError, Result};
use crate::schema::CollectionDefinition;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Files whose name starts with `_` or `.` are never part of a collection
pub fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            name.starts_with('_') || name.starts_with('.')
        })
        .unwrap_or(true)
}

/// Expand every pattern of a collection against the content root.
/// Results are deduplicated and sorted, which fixes the discovery order.
pub fn discover(content_root: &Path, collection: &CollectionDefinition) -> Result<Vec<PathBuf>> {
    let root = Pattern::escape(&content_root.to_string_lossy());
    let mut files = BTreeSet::new();

    for pattern in collection.patterns() {
        let full = format!("{}/{}", root.trim_end_matches('/'), pattern.trim_start_matches("./"));
        let entries = glob::glob_with(&full, MATCH_OPTIONS).map_err(|e| ContentError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() && !is_ignored(&path) => {
                    files.insert(path);
                }
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable path while matching '{pattern}': {e}"),
            }
        }
    }

    Ok(files.into_iter().collect())
}

/// Whether a (possibly deleted) file would belong to the collection
pub fn matches_collection(content_root: &Path, collection: &CollectionDefinition, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(content_root) else {
        return false;
    };
    if is_ignored(path) {
        return false;
    }
    collection.patterns().iter().any(|pattern| {
        Pattern::new(pattern.trim_start_matches("./"))
            .map(|p| p.matches_path_with(relative, MATCH_OPTIONS))
            .unwrap_or(false)
    })
}
