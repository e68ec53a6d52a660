//! Error taxonomy for the change-tracking and sync engine.

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, PmgError>;

/// Errors that can occur while tracking, committing or synchronizing
#[derive(Debug, thiserror::Error)]
pub enum PmgError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Not a PMG working tree (no {0} directory). Run `pmg init` first.")]
    NotInitialized(String),

    #[error("Working tree is already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Previous commit {0} has not been synced. Run `pmg push` before making a new commit.")]
    UnsyncedCommitExists(String),

    #[error("Nothing staged. Run `pmg add` first.")]
    NoStagedChanges,

    #[error("No unsynced commits found")]
    NoUnsyncedCommit,

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Commit message is {len} characters, the limit is {max}")]
    CommitMessageTooLong { len: usize, max: usize },

    #[error("Transfer of {path} failed: {reason}")]
    FileTransfer { path: String, reason: String },

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Invalid response from remote: {0}")]
    InvalidResponse(String),

    #[error("Metadata store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl PmgError {
    /// No-op conditions that are reported to the user but are not failures.
    pub fn is_informational(&self) -> bool {
        matches!(self, PmgError::NoStagedChanges | PmgError::NoUnsyncedCommit)
    }
}

impl From<zip::result::ZipError> for PmgError {
    fn from(e: zip::result::ZipError) -> Self {
        PmgError::Archive(e.to_string())
    }
}

impl From<walkdir::Error> for PmgError {
    fn from(e: walkdir::Error) -> Self {
        match e.into_io_error() {
            Some(io) => PmgError::Io(io),
            None => PmgError::Io(std::io::Error::other("filesystem loop detected")),
        }
    }
}
