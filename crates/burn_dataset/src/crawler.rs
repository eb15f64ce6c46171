//! Recursive file discovery for slice datasets.

use crate::types::{DatasetError, DatasetResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// All files under `root` (recursively) whose extension matches `extension`
/// case-insensitively, sorted by path. Symlinks are not followed.
pub fn crawl(root: &Path, extension: &str) -> DatasetResult<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            DatasetError::Io {
                path,
                source: err.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
        if matches {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}
