use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Expands the command-line inputs into image files. Folders are walked
/// recursively and filtered by extension; files named explicitly are kept
/// as given so a bad one shows up in the export report. The result is sorted
/// and free of duplicates.
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for input in inputs {
        if input.is_dir() {
            let before = found.len();
            for entry in WalkDir::new(input).into_iter().filter_map(|res| res.ok()) {
                if entry.file_type().is_file() && is_supported_image(entry.path()) {
                    found.insert(entry.into_path());
                }
            }
            debug!(folder = %input.display(), images = found.len() - before, "scanned folder");
        } else {
            if !is_supported_image(input) {
                warn!(input = %input.display(), "input does not look like a supported image");
            }
            found.insert(input.clone());
        }
    }
    found.into_iter().collect()
}
