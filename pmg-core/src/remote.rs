//! Remote store interface
//!
//! The engine only needs four things from a remote: accept one file record,
//! hand back a full project archive, report its latest commit, and check a
//! token. Transports implement [`Remote`].

use crate::config::RepositoryIdentity;
use crate::error::{PmgError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

/// One file record as sent to the push endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub commit_id: String,
    pub project_name: String,
    pub path: String,
    pub content_hash: String,
    pub timestamp: i64,
    pub commit_message: String,
    pub author: String,
    /// File bytes; `None` for deletion markers.
    pub content: Option<Vec<u8>>,
}

/// Latest commit known to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteHead {
    pub latest_commit_id: Option<String>,
    /// Unix seconds.
    pub timestamp: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Unix(i64),
    Text(String),
}

#[derive(Deserialize)]
struct WireHead {
    latest_commit_id: Option<String>,
    timestamp: Option<WireTimestamp>,
}

impl RemoteHead {
    /// A head with a commit at `timestamp`.
    pub fn at(commit_id: impl Into<String>, timestamp: i64) -> Self {
        Self { latest_commit_id: Some(commit_id.into()), timestamp: Some(timestamp) }
    }

    /// Whether the remote reported a commit at all.
    pub fn has_commit(&self) -> bool {
        self.latest_commit_id.is_some() && self.timestamp.is_some()
    }

    /// Parse the fetch endpoint's JSON body.
    ///
    /// `timestamp` may be integer seconds, RFC 3339, or a zone-less ISO 8601
    /// datetime taken as UTC. A body without the fields means no commits.
    pub fn parse(body: &str) -> Result<Self> {
        let wire: WireHead = serde_json::from_str(body)
            .map_err(|e| PmgError::InvalidResponse(format!("fetch response: {}", e)))?;
        let timestamp = match wire.timestamp {
            None => None,
            Some(WireTimestamp::Unix(secs)) => Some(secs),
            Some(WireTimestamp::Text(text)) => Some(parse_timestamp(&text)?),
        };
        let head = Self { latest_commit_id: wire.latest_commit_id, timestamp };
        if head.latest_commit_id.is_some() != head.timestamp.is_some() {
            return Err(PmgError::InvalidResponse(
                "latest_commit_id and timestamp must appear together".to_string(),
            ));
        }
        Ok(head)
    }
}

fn parse_timestamp(text: &str) -> Result<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().timestamp());
    }
    text.parse::<i64>()
        .map_err(|_| PmgError::InvalidResponse(format!("unparseable timestamp {:?}", text)))
}

/// Transport to the remote store.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Check that the configured token is accepted.
    async fn authenticate(&self) -> Result<()>;

    /// Send one file record. `Err` means this file was not accepted.
    async fn push_file(&self, upload: &FileUpload) -> Result<()>;

    /// Download the full project tree as a zip archive.
    async fn pull_archive(&self, repo: &RepositoryIdentity) -> Result<Vec<u8>>;

    /// Latest commit id and timestamp on the remote.
    async fn fetch_head(&self, repo: &RepositoryIdentity) -> Result<RemoteHead>;
}
