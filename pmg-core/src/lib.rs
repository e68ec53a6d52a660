//! PMG Core Library
//!
//! Local change tracking and synchronization for PMG working trees:
//! - Metadata store of per-commit file-version records (SQLite)
//! - Change detection with ignore rules and a staging buffer
//! - Commit engine with the sync gate (one unsynced commit at a time)
//! - Push with per-file accounting, snapshot pull, fetch divergence check
//! - Remote and prompt traits for the transport and the terminal

pub mod archive;
pub mod commit;
pub mod config;
pub mod detector;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod history;
pub mod ignore;
pub mod prompt;
pub mod pull;
pub mod push;
pub mod remote;
pub mod staging;
pub mod status;
pub mod store;
pub mod workspace;

pub use commit::{CommitEngine, CommitResult, MAX_MESSAGE_LEN, check_sync_gate};
pub use config::{ClientConfig, Identity, RepositoryIdentity, resolve_repository};
pub use detector::{AddReport, ChangeDetector};
pub use error::{PmgError, Result};
pub use fetch::{Divergence, FetchReport, FollowUp, FollowUpOutcome, Recommendation, fetch};
pub use hash::DELETED;
pub use history::{PushLog, PushLogEntry};
pub use ignore::IgnoreRules;
pub use prompt::{Prompt, ScriptedPrompt};
pub use pull::{PullReport, pull};
pub use push::{FileOutcome, PushEngine, PushReport};
pub use remote::{FileUpload, Remote, RemoteHead};
pub use staging::{StagedChange, StagingBuffer};
pub use status::{StatusReport, status};
pub use store::{CommitSummary, FileVersionRecord, MetadataStore};
pub use workspace::Workspace;
