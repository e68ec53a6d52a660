//! Push: upload one commit's records and decide whether it is synced.
//!
//! Files are sent independently on a bounded pool. The commit flips to synced
//! only after every upload has reported back and none failed; otherwise the
//! whole commit stays pending and the next push resends all of its files.

use crate::config::RepositoryIdentity;
use crate::error::{PmgError, Result};
use crate::hash::hash_bytes;
use crate::history::{PushLog, PushLogEntry};
use crate::remote::{FileUpload, Remote};
use crate::store::{FileVersionRecord, MetadataStore};
use crate::workspace::Workspace;
use futures::StreamExt;
use std::time::Instant;

/// Outcome of one file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    /// Hash that was sent; the on-disk hash at push time for regular files.
    pub content_hash: String,
    pub deletion: bool,
    /// `None` on success, otherwise why the file was not accepted.
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of pushing one commit.
#[derive(Debug, Clone)]
pub struct PushReport {
    pub commit_id: String,
    /// Per-file outcomes in commit order.
    pub files: Vec<FileOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    /// Whether the commit is now marked synced.
    pub synced: bool,
    pub duration_ms: u64,
}

impl PushReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.succeeded())
    }
}

pub struct PushEngine<'a> {
    workspace: &'a Workspace,
    store: &'a MetadataStore,
    remote: &'a dyn Remote,
    repo: &'a RepositoryIdentity,
    concurrency: usize,
}

impl<'a> PushEngine<'a> {
    pub fn new(
        workspace: &'a Workspace,
        store: &'a MetadataStore,
        remote: &'a dyn Remote,
        repo: &'a RepositoryIdentity,
    ) -> Self {
        Self { workspace, store, remote, repo, concurrency: 1 }
    }

    /// Number of uploads in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Push `commit_id`, or the newest unsynced commit when `None`.
    pub async fn push(&self, commit_id: Option<&str>) -> Result<PushReport> {
        let start = Instant::now();
        let commit_id = match commit_id {
            Some(id) => id.to_string(),
            None => {
                let id = self
                    .store
                    .latest_unsynced_commit()?
                    .ok_or(PmgError::NoUnsyncedCommit)?;
                tracing::info!("No commit id given, using latest unsynced: {}", id);
                id
            }
        };

        let records = self.store.records_for_commit(&commit_id)?;
        if records.is_empty() {
            return Err(PmgError::CommitNotFound(commit_id));
        }
        let total = records.len();
        tracing::info!("Pushing commit {} ({} file(s)) to {}", commit_id, total, self.repo);

        let mut outcomes: Vec<(usize, FileOutcome)> = futures::stream::iter(
            records
                .into_iter()
                .enumerate()
                .map(|(i, record)| async move { (i, self.push_one(record).await) }),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;
        outcomes.sort_by_key(|(i, _)| *i);
        let files: Vec<FileOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        let failed = files.iter().filter(|f| !f.succeeded()).count();
        let succeeded = total - failed;
        let synced = failed == 0;
        if synced {
            self.store.mark_commit_synced(&commit_id)?;
            tracing::info!("Commit {} marked as synced", commit_id);
        } else {
            tracing::warn!(
                "{} of {} file(s) failed; commit {} stays unsynced",
                failed,
                total,
                commit_id
            );
        }

        let report = PushReport {
            commit_id,
            files,
            succeeded,
            failed,
            total,
            synced,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.record_attempt(&report);
        Ok(report)
    }

    async fn push_one(&self, record: FileVersionRecord) -> FileOutcome {
        let deletion = record.is_deleted();
        let mut upload = FileUpload {
            commit_id: record.commit_id,
            project_name: self.repo.project_name.clone(),
            path: record.path,
            content_hash: record.content_hash,
            timestamp: record.timestamp,
            commit_message: record.commit_message,
            author: record.author,
            content: None,
        };

        if !deletion {
            match tokio::fs::read(self.workspace.resolve(&upload.path)).await {
                Ok(bytes) => {
                    upload.content_hash = hash_bytes(&bytes);
                    upload.content = Some(bytes);
                }
                Err(e) => {
                    tracing::warn!("Cannot read {} for upload: {}", upload.path, e);
                    return FileOutcome {
                        path: upload.path,
                        content_hash: upload.content_hash,
                        deletion,
                        error: Some(format!("cannot read file: {}", e)),
                    };
                }
            }
        }

        let error = match self.remote.push_file(&upload).await {
            Ok(()) => {
                tracing::debug!("uploaded {}", upload.path);
                None
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", upload.path, e);
                Some(e.to_string())
            }
        };
        FileOutcome {
            path: upload.path,
            content_hash: upload.content_hash,
            deletion,
            error,
        }
    }

    fn record_attempt(&self, report: &PushReport) {
        let entry = PushLogEntry {
            commit_id: report.commit_id.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            succeeded: report.succeeded as u64,
            failed: report.failed as u64,
            total: report.total as u64,
            synced: report.synced,
            duration_ms: report.duration_ms,
        };
        if let Err(e) = PushLog::new(self.workspace.state_dir()).append(&entry) {
            tracing::warn!("Could not write push log: {}", e);
        }
    }
}
