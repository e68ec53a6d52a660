//! Commit engine
//!
//! Turns the staging buffer into one immutable group of file-version records.
//! A new commit is refused while any earlier commit is still unsynced.

use crate::error::{PmgError, Result};
use crate::hash::{DELETED, hash_file};
use crate::staging::StagingBuffer;
use crate::store::{FileVersionRecord, MetadataStore};
use crate::workspace::Workspace;

/// Longest accepted commit message, in characters.
pub const MAX_MESSAGE_LEN: usize = 50;

/// Result of a commit.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub commit_id: String,
    pub timestamp: i64,
    /// Records inserted, deletions included.
    pub files_committed: usize,
    pub deletions: usize,
    /// Staged paths that were gone at commit time.
    pub skipped: Vec<String>,
    /// Paths whose insert failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl CommitResult {
    /// A commit that inserted nothing; callers report it as a no-op.
    pub fn is_noop(&self) -> bool {
        self.files_committed == 0
    }
}

/// Fail with [`PmgError::UnsyncedCommitExists`] if any record is unsynced.
pub fn check_sync_gate(store: &MetadataStore) -> Result<()> {
    if store.count_unsynced()? == 0 {
        return Ok(());
    }
    let pending = store
        .latest_unsynced_commit()?
        .unwrap_or_else(|| "<unknown>".to_string());
    Err(PmgError::UnsyncedCommitExists(pending))
}

/// Trim a commit message and enforce the length limit.
pub fn validate_message(message: &str) -> Result<String> {
    let message = message.trim();
    let len = message.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(PmgError::CommitMessageTooLong { len, max: MAX_MESSAGE_LEN });
    }
    Ok(message.to_string())
}

pub struct CommitEngine<'a> {
    workspace: &'a Workspace,
    store: &'a MetadataStore,
    buffer: &'a StagingBuffer,
}

impl<'a> CommitEngine<'a> {
    pub fn new(workspace: &'a Workspace, store: &'a MetadataStore, buffer: &'a StagingBuffer) -> Self {
        Self { workspace, store, buffer }
    }

    /// Commit the staged changes stamped with the current wall-clock time.
    pub fn commit(&self, message: &str, author: &str) -> Result<CommitResult> {
        self.commit_at(message, author, chrono::Utc::now().timestamp())
    }

    /// Commit the staged changes with an explicit Unix-seconds timestamp.
    pub fn commit_at(&self, message: &str, author: &str, timestamp: i64) -> Result<CommitResult> {
        check_sync_gate(self.store)?;
        let message = validate_message(message)?;

        let staged = self.buffer.resolved()?;
        if staged.is_empty() {
            return Err(PmgError::NoStagedChanges);
        }

        let commit_id = uuid::Uuid::new_v4().to_string();
        let mut result = CommitResult {
            commit_id: commit_id.clone(),
            timestamp,
            files_committed: 0,
            deletions: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        };

        for change in staged {
            let content_hash = if change.is_deletion {
                DELETED.to_string()
            } else {
                // Hash again now; the file may have changed since it was staged.
                match hash_file(&self.workspace.resolve(&change.path)) {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", change.path, e);
                        result.skipped.push(change.path);
                        continue;
                    }
                }
            };

            let record = FileVersionRecord {
                path: change.path,
                content_hash,
                timestamp,
                commit_message: message.clone(),
                author: author.to_string(),
                commit_id: commit_id.clone(),
                synced: false,
            };
            match self.store.insert(&record) {
                Ok(()) => {
                    result.files_committed += 1;
                    if record.is_deleted() {
                        result.deletions += 1;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to record {}: {}", record.path, e);
                    result.failed.push((record.path, e.to_string()));
                }
            }
        }

        self.buffer.clear()?;
        tracing::info!(
            "Commit {} recorded {} file(s) ({} deletions)",
            commit_id,
            result.files_committed,
            result.deletions
        );
        Ok(result)
    }
}
