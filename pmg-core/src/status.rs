//! Working-tree status: what is staged and what is waiting to be pushed.

use crate::error::Result;
use crate::staging::{StagedChange, StagingBuffer};
use crate::store::{CommitSummary, MetadataStore};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Staged changes, one per path.
    pub staged: Vec<StagedChange>,
    pub unsynced_records: u64,
    /// Commit blocking the next commit, if any.
    pub pending_commit: Option<String>,
    pub latest_commit: Option<CommitSummary>,
}

impl StatusReport {
    pub fn can_commit(&self) -> bool {
        self.unsynced_records == 0 && !self.staged.is_empty()
    }
}

pub fn status(workspace: &Workspace, store: &MetadataStore) -> Result<StatusReport> {
    let staged = StagingBuffer::new(&workspace.staging_path()).resolved()?;
    Ok(StatusReport {
        staged,
        unsynced_records: store.count_unsynced()?,
        pending_commit: store.latest_unsynced_commit()?,
        latest_commit: store.commits(1)?.into_iter().next(),
    })
}
