//! Change detector behind `pmg add`.
//!
//! Walks the working tree, compares each file's content hash with the latest
//! tracked record for its path and stages what differs. Paths the store knows
//! about that have vanished from disk are staged as deletions.

use crate::error::Result;
use crate::hash::hash_file;
use crate::ignore::IgnoreRules;
use crate::staging::{StagedChange, StagingBuffer};
use crate::store::MetadataStore;
use crate::workspace::Workspace;
use std::path::Path;
use walkdir::WalkDir;

/// Files larger than this are never staged unless configured otherwise.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Outcome of one change-detection pass.
#[derive(Debug, Default, Clone)]
pub struct AddReport {
    /// Changes appended to the staging buffer, in walk order then deletions.
    pub staged: Vec<StagedChange>,
    /// Files whose hash matches the latest tracked record.
    pub unchanged: usize,
    /// Files and directories skipped by ignore rules.
    pub ignored: usize,
    /// Files skipped for exceeding the size ceiling.
    pub oversized: Vec<String>,
    /// Files that could not be read or hashed.
    pub unreadable: Vec<String>,
}

impl AddReport {
    pub fn modified_count(&self) -> usize {
        self.staged.iter().filter(|c| !c.is_deletion).count()
    }

    pub fn deleted_count(&self) -> usize {
        self.staged.iter().filter(|c| c.is_deletion).count()
    }
}

pub struct ChangeDetector<'a> {
    workspace: &'a Workspace,
    store: &'a MetadataStore,
    rules: IgnoreRules,
    max_file_size: u64,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(workspace: &'a Workspace, store: &'a MetadataStore) -> Self {
        Self {
            workspace,
            store,
            rules: IgnoreRules::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_rules(mut self, rules: IgnoreRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Compute staged changes without touching the staging buffer.
    pub fn detect(&self) -> Result<AddReport> {
        let root = self.workspace.root();
        let mut report = AddReport::default();
        let mut ignored = 0usize;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| match relative_path(root, entry.path()) {
                Some(rel) if self.rules.is_ignored(&rel) => {
                    tracing::debug!("ignoring {}", rel);
                    ignored += 1;
                    false
                }
                _ => true,
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_path(root, entry.path()) else {
                tracing::warn!("Skipping non UTF-8 path {:?}", entry.path());
                continue;
            };

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", rel, e);
                    report.unreadable.push(rel);
                    continue;
                }
            };
            if size > self.max_file_size {
                tracing::warn!(
                    "Skipping {} ({} bytes exceeds the {} byte limit)",
                    rel,
                    size,
                    self.max_file_size
                );
                report.oversized.push(rel);
                continue;
            }

            let hash = match hash_file(entry.path()) {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!("Cannot hash {}: {}", rel, e);
                    report.unreadable.push(rel);
                    continue;
                }
            };

            match self.store.latest_record(&rel)? {
                Some(latest) if latest.content_hash == hash => report.unchanged += 1,
                _ => {
                    tracing::debug!("staging {} ({})", rel, hash);
                    report.staged.push(StagedChange::modified(rel));
                }
            }
        }
        report.ignored = ignored;

        for path in self.store.all_distinct_paths()? {
            if self.rules.is_ignored(&path) || self.workspace.resolve(&path).exists() {
                continue;
            }
            if let Some(latest) = self.store.latest_record(&path)? {
                if !latest.is_deleted() {
                    tracing::debug!("staging deletion of {}", path);
                    report.staged.push(StagedChange::deleted(path));
                }
            }
        }

        Ok(report)
    }

    /// Detect changes and append them to the staging buffer.
    pub fn stage(&self, buffer: &StagingBuffer) -> Result<AddReport> {
        let report = self.detect()?;
        buffer.append(&report.staged)?;
        tracing::info!(
            "Staged {} change(s): {} modified, {} deleted",
            report.staged.len(),
            report.modified_count(),
            report.deleted_count()
        );
        Ok(report)
    }
}

/// `/`-separated path of `path` relative to `root`, if it is valid UTF-8.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{DELETED, hash_bytes};
    use crate::store::FileVersionRecord;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Workspace, MetadataStore) {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        fs::create_dir_all(ws.state_dir()).unwrap();
        let store = MetadataStore::open(&ws.db_path()).unwrap();
        (tmp, ws, store)
    }

    fn track(store: &MetadataStore, path: &str, hash: &str) {
        store
            .insert(&FileVersionRecord {
                path: path.into(),
                content_hash: hash.into(),
                timestamp: 1,
                commit_message: "m".into(),
                author: "a".into(),
                commit_id: "c".into(),
                synced: true,
            })
            .unwrap();
    }

    #[test]
    fn test_new_files_are_staged() {
        let (tmp, ws, store) = setup();
        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        fs::create_dir(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src").join("lib.rs"), "two").unwrap();

        let report = ChangeDetector::new(&ws, &store).detect().unwrap();
        assert_eq!(
            report.staged,
            vec![StagedChange::modified("a.txt"), StagedChange::modified("src/lib.rs")]
        );
    }

    #[test]
    fn test_unchanged_files_are_not_staged() {
        let (tmp, ws, store) = setup();
        fs::write(tmp.path().join("a.txt"), "same").unwrap();
        track(&store, "a.txt", &hash_bytes(b"same"));

        let report = ChangeDetector::new(&ws, &store).detect().unwrap();
        assert!(report.staged.is_empty());
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn test_state_dir_and_ignored_paths_skipped() {
        let (tmp, ws, store) = setup();
        fs::create_dir(tmp.path().join("target")).unwrap();
        fs::write(tmp.path().join("target").join("out.bin"), "x").unwrap();
        fs::write(tmp.path().join("keep.txt"), "k").unwrap();

        let report = ChangeDetector::new(&ws, &store)
            .with_rules(IgnoreRules::new(["target"]))
            .detect()
            .unwrap();
        assert_eq!(report.staged, vec![StagedChange::modified("keep.txt")]);
        assert_eq!(report.ignored, 2);
    }

    #[test]
    fn test_oversized_files_skipped() {
        let (tmp, ws, store) = setup();
        fs::write(tmp.path().join("big.bin"), vec![0u8; 64]).unwrap();

        let report = ChangeDetector::new(&ws, &store)
            .with_max_file_size(16)
            .detect()
            .unwrap();
        assert!(report.staged.is_empty());
        assert_eq!(report.oversized, vec!["big.bin".to_string()]);
    }

    #[test]
    fn test_missing_tracked_path_staged_as_deletion_once() {
        let (_tmp, ws, store) = setup();
        track(&store, "gone.txt", "h1");
        track(&store, "already.txt", "h2");
        track(&store, "already.txt", DELETED);

        let report = ChangeDetector::new(&ws, &store).detect().unwrap();
        assert_eq!(report.staged, vec![StagedChange::deleted("gone.txt")]);
    }

    #[test]
    fn test_ignored_tracked_path_not_staged_as_deletion() {
        let (_tmp, ws, store) = setup();
        track(&store, "logs/app.log", "h1");

        let report = ChangeDetector::new(&ws, &store)
            .with_rules(IgnoreRules::new(["logs"]))
            .detect()
            .unwrap();
        assert!(report.staged.is_empty());
    }

    #[test]
    fn test_stage_appends_to_buffer() {
        let (tmp, ws, store) = setup();
        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        let buffer = StagingBuffer::new(&ws.staging_path());

        let detector = ChangeDetector::new(&ws, &store);
        detector.stage(&buffer).unwrap();
        detector.stage(&buffer).unwrap();
        assert_eq!(buffer.entries().unwrap().len(), 2);
        assert_eq!(buffer.resolved().unwrap().len(), 1);
    }
}
