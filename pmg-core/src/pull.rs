//! Pull: overlay the remote's full project snapshot onto the working tree.
//!
//! Pull is coarse-grained. It does not consult or change existing metadata
//! records, and local files with uncommitted edits at archive paths are
//! overwritten.

use crate::archive::{ExpandReport, expand_zip};
use crate::config::RepositoryIdentity;
use crate::error::{PmgError, Result};
use crate::remote::Remote;
use crate::store::MetadataStore;
use crate::workspace::Workspace;
use std::fs;

const SNAPSHOT_FILE: &str = "snapshot.zip";

#[derive(Debug, Clone)]
pub struct PullReport {
    pub repository: RepositoryIdentity,
    pub archive_bytes: u64,
    pub expanded: ExpandReport,
}

pub async fn pull(
    workspace: &Workspace,
    remote: &dyn Remote,
    repo: &RepositoryIdentity,
) -> Result<PullReport> {
    tracing::info!("Pulling {} from the server", repo);
    let archive = remote.pull_archive(repo).await?;
    if archive.is_empty() {
        return Err(PmgError::InvalidResponse("empty archive".to_string()));
    }

    let scratch = workspace.scratch_dir();
    if scratch.exists() {
        fs::remove_dir_all(&scratch)?;
    }
    fs::create_dir_all(&scratch)?;
    let archive_path = scratch.join(SNAPSHOT_FILE);
    fs::write(&archive_path, &archive)?;

    let expanded = expand_zip(&archive_path, workspace.root());
    // Scratch is discarded whether or not expansion succeeded.
    if let Err(e) = fs::remove_dir_all(&scratch) {
        tracing::warn!("Could not remove {:?}: {}", scratch, e);
    }
    let expanded = expanded?;

    // Opening creates the store on a fresh clone; existing records are untouched.
    MetadataStore::open(&workspace.db_path())?;

    tracing::info!(
        "Pull wrote {} file(s) ({} bytes)",
        expanded.files_written,
        expanded.bytes_written
    );
    Ok(PullReport {
        repository: repo.clone(),
        archive_bytes: archive.len() as u64,
        expanded,
    })
}
