use anyhow::{Context, Result};
use log::debug;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DONE_PREFIX: &str = "[DONE]-";

/// Append-only record of basenames already known to be in the target format,
/// persisted as `[DONE]-<basename>` lines. Membership is an exact basename
/// string match, so duplicate basenames in different directories collide; the
/// format is kept for compatibility with existing log files.
///
/// All appends go through one mutex so concurrent batch workers cannot
/// interleave partial lines.
pub struct SkipLog {
    path: PathBuf,
    entries: Mutex<BTreeSet<String>>,
}

impl SkipLog {
    /// Read the full log (if it exists) and keep the entry set in memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut entries = BTreeSet::new();
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read skip log '{}'", path.display()))?;
            for line in contents.lines() {
                if let Some(name) = line.strip_prefix(DONE_PREFIX) {
                    entries.insert(name.to_string());
                }
            }
        }
        debug!(
            "Skip log '{}' loaded with {} entries",
            path.display(),
            entries.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn contains(&self, basename: &str) -> bool {
        self.entries.lock().unwrap().contains(basename)
    }

    /// Append a basename. A no-op when the name is already recorded, so
    /// re-running a batch never duplicates lines.
    pub fn record(&self, basename: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains(basename) {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open skip log '{}'", self.path.display()))?;
        writeln!(file, "{}{}", DONE_PREFIX, basename)
            .with_context(|| format!("Failed to append to skip log '{}'", self.path.display()))?;
        entries.insert(basename.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn round_trip_membership() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("converted.log");

        let log = SkipLog::open(&path)?;
        assert!(!log.contains("movie.mp4"));
        log.record("movie.mp4")?;
        assert!(log.contains("movie.mp4"));
        assert!(!log.contains("other.mp4"));

        // A fresh instance sees the persisted entry.
        let reloaded = SkipLog::open(&path)?;
        assert!(reloaded.contains("movie.mp4"));
        Ok(())
    }

    #[test]
    fn persisted_format_is_done_prefixed_lines() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("converted.log");
        let log = SkipLog::open(&path)?;
        log.record("a.mp4")?;
        log.record("b.mp4")?;

        let contents = fs::read_to_string(&path)?;
        assert_eq!(contents, "[DONE]-a.mp4\n[DONE]-b.mp4\n");
        Ok(())
    }

    #[test]
    fn recording_twice_appends_once() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("converted.log");
        let log = SkipLog::open(&path)?;
        log.record("movie.mp4")?;
        log.record("movie.mp4")?;

        let contents = fs::read_to_string(&path)?;
        assert_eq!(contents.lines().count(), 1);
        Ok(())
    }

    #[test]
    fn lines_unrelated_to_done_entries_are_ignored() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("converted.log");
        fs::write(&path, "[DONE]-kept.mp4\nsome stray line\n")?;

        let log = SkipLog::open(&path)?;
        assert!(log.contains("kept.mp4"));
        assert!(!log.contains("some stray line"));
        Ok(())
    }

    #[test]
    fn concurrent_appends_produce_distinct_whole_lines() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("converted.log");
        let log = Arc::new(SkipLog::open(&path)?);

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || log.record(&format!("file-{i:02}.mp4")).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = fs::read_to_string(&path)?;
        let lines: BTreeSet<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 32);
        for line in &lines {
            assert!(line.starts_with("[DONE]-file-"), "corrupt line: {line:?}");
        }
        Ok(())
    }
}
