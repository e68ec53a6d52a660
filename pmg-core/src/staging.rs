//! Staging buffer: pending path changes between `add` and `commit`.
//!
//! Stored as one line per entry, `A\t<path>` for a change and `D\t<path>`
//! for a deletion, the path written as a JSON string so that any filename
//! fits on one line. Bare unquoted paths are still read. Entries are only
//! ever appended; repeated staging of the same path is resolved by
//! [`StagingBuffer::resolved`].

use crate::error::Result;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    pub path: String,
    pub is_deletion: bool,
}

impl StagedChange {
    pub fn modified(path: impl Into<String>) -> Self {
        Self { path: path.into(), is_deletion: false }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self { path: path.into(), is_deletion: true }
    }

    fn to_line(&self) -> Result<String> {
        let tag = if self.is_deletion { 'D' } else { 'A' };
        Ok(format!("{}\t{}", tag, serde_json::to_string(&self.path)?))
    }

    fn from_line(line: &str) -> Option<Self> {
        match line.split_once('\t') {
            Some(("A", path)) => decode_path(path).map(Self::modified),
            Some(("D", path)) => decode_path(path).map(Self::deleted),
            Some(_) => None,
            // Untagged lines are plain paths.
            None if !line.trim().is_empty() => Some(Self::modified(line.trim())),
            None => None,
        }
    }
}

fn decode_path(raw: &str) -> Option<String> {
    let path = if raw.starts_with('"') {
        serde_json::from_str::<String>(raw).ok()?
    } else {
        raw.to_string()
    };
    (!path.is_empty()).then_some(path)
}

pub struct StagingBuffer {
    path: PathBuf,
}

impl StagingBuffer {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    pub fn append(&self, changes: &[StagedChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut buf = String::new();
        for change in changes {
            buf.push_str(&change.to_line()?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Every entry in staging order, duplicates included.
    pub fn entries(&self) -> Result<Vec<StagedChange>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in data.lines() {
            match StagedChange::from_line(line) {
                Some(change) => entries.push(change),
                None if line.is_empty() => {}
                None => tracing::warn!("Skipping malformed staging entry: {:?}", line),
            }
        }
        Ok(entries)
    }

    /// One entry per path: the last staged state wins, ordered by first appearance.
    pub fn resolved(&self) -> Result<Vec<StagedChange>> {
        let entries = self.entries()?;
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut resolved: Vec<StagedChange> = Vec::new();
        for change in entries {
            match index.get(&change.path) {
                Some(&i) => resolved[i] = change,
                None => {
                    index.insert(change.path.clone(), resolved.len());
                    resolved.push(change);
                }
            }
        }
        Ok(resolved)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::write(&self.path, b"")?;
        }
        Ok(())
    }
}
