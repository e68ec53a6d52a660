//! Push history: one JSON entry per push attempt under `.pmg/push-log/`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Record of a single push attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushLogEntry {
    pub commit_id: String,
    /// When the push finished (Unix seconds).
    pub timestamp: i64,
    pub succeeded: u64,
    pub failed: u64,
    pub total: u64,
    /// Whether the commit was marked synced by this attempt.
    pub synced: bool,
    pub duration_ms: u64,
}

pub struct PushLog {
    log_dir: PathBuf,
}

impl PushLog {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            log_dir: state_dir.join("push-log"),
        }
    }

    pub fn append(&self, entry: &PushLogEntry) -> Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        // Attempts on the same commit within one second get a numeric suffix.
        let mut attempt = 0u32;
        let path = loop {
            let name = format!("{}_{}_{:03}.json", entry.timestamp, entry.commit_id, attempt);
            let candidate = self.log_dir.join(name);
            if !candidate.exists() {
                break candidate;
            }
            attempt += 1;
        };
        fs::write(&path, serde_json::to_string_pretty(entry)?)?;
        Ok(())
    }

    /// All entries, oldest first.
    pub fn all(&self) -> Result<Vec<PushLogEntry>> {
        if !self.log_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.log_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut entries = Vec::new();
        for path in files {
            let data = fs::read_to_string(&path)?;
            match serde_json::from_str::<PushLogEntry>(&data) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Ignoring corrupt push log entry {:?}: {}", path, e),
            }
        }
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    pub fn latest(&self) -> Result<Option<PushLogEntry>> {
        Ok(self.all()?.pop())
    }

    pub fn for_commit(&self, commit_id: &str) -> Result<Vec<PushLogEntry>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.commit_id == commit_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(commit: &str, ts: i64, failed: u64) -> PushLogEntry {
        PushLogEntry {
            commit_id: commit.into(),
            timestamp: ts,
            succeeded: 3 - failed,
            failed,
            total: 3,
            synced: failed == 0,
            duration_ms: 5,
        }
    }

    #[test]
    fn test_append_and_query() {
        let tmp = TempDir::new().unwrap();
        let log = PushLog::new(tmp.path());
        assert!(log.latest().unwrap().is_none());

        log.append(&entry("c1", 100, 1)).unwrap();
        log.append(&entry("c1", 100, 0)).unwrap();
        log.append(&entry("c2", 200, 0)).unwrap();

        assert_eq!(log.all().unwrap().len(), 3);
        let c1 = log.for_commit("c1").unwrap();
        assert_eq!(c1.len(), 2);
        assert_eq!(c1[0].failed, 1);
        assert!(c1[1].synced);
        assert_eq!(log.latest().unwrap().unwrap().commit_id, "c2");
    }

    #[test]
    fn test_corrupt_entries_skipped() {
        let tmp = TempDir::new().unwrap();
        let log = PushLog::new(tmp.path());
        log.append(&entry("c1", 100, 0)).unwrap();
        fs::write(tmp.path().join("push-log").join("bad.json"), "{").unwrap();
        assert_eq!(log.all().unwrap().len(), 1);
    }
}
