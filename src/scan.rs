use anyhow::{bail, Result};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively enumerate regular files under `root` whose extension
/// (case-insensitive) is in `extensions` and whose size is at least
/// `min_size_bytes`. The result is sorted lexicographically by full path so
/// batch runs are deterministic.
pub fn find_candidates(
    root: &Path,
    extensions: &BTreeSet<String>,
    min_size_bytes: u64,
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Search root '{}' is not a directory", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry under '{}': {}", root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(extension) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.contains(&extension.to_ascii_lowercase()) {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) if metadata.len() >= min_size_bytes => {
                files.push(entry.into_path());
            }
            Ok(metadata) => {
                debug!(
                    "Skipping '{}': {} bytes below minimum {}",
                    entry.path().display(),
                    metadata.len(),
                    min_size_bytes
                );
            }
            Err(err) => {
                warn!("Skipping '{}': {}", entry.path().display(), err);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Normalize a user-supplied extension list into the lowercase set the
/// scanner matches against. Leading dots are tolerated.
pub fn extension_set<I, S>(extensions: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
