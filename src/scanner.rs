use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Discover captured completion files under `root`.
///
/// Batch runs point at a directory of raw model outputs saved one per
/// file. We accept `.txt` and `.json` files and skip hidden entries and
/// the tool's own `output/` directory so reruns don't re-ingest
/// artifacts.
pub fn scan_captures(root: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.path().extension().and_then(|e| e.to_str()) {
            Some("txt") | Some("json") => results.push(entry.path().to_path_buf()),
            _ => {}
        }
    }

    results.sort();
    results
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_str().unwrap_or("");
    if entry.depth() == 0 {
        return false;
    }
    name.starts_with('.') || (entry.file_type().is_dir() && name == "output")
}
