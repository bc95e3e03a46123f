use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract::is_pdf;

/// Documents (`.pdf`, `.txt`) stored under `root`, sorted by path.
///
/// Missing directories yield an empty list; the storage layout is created
/// lazily by whoever writes to it.
pub fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_pdf(p) || is_txt(p))
        .collect();
    files.sort();
    files
}

fn is_txt(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}
