//! Client configuration and identities kept in the state directory.
//!
//! - `config.json`: server address and engine tunables
//! - `identity.json`: author, API token and project name written by `init`
//! - `repository.json`: the remote `username/project` this tree syncs with
//!
//! All three are JSON, saved atomically via a temporary file and rename.

use crate::detector::DEFAULT_MAX_FILE_SIZE;
use crate::error::{PmgError, Result};
use crate::prompt::Prompt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000/";

/// Environment variable overriding [`ClientConfig::server_url`].
pub const SERVER_URL_ENV: &str = "PMG_SERVER_URL";

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Engine and transport settings stored at `.pmg/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the remote server.
    pub server_url: String,
    /// Files larger than this many bytes are never staged.
    pub max_file_size: u64,
    /// Concurrent uploads during push.
    pub push_concurrency: usize,
    /// Per-request timeout for remote calls.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            push_concurrency: 4,
            request_timeout_secs: 60,
        }
    }
}

impl ClientConfig {
    /// Load from a state directory, falling back to defaults, then apply env overrides.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let mut config: Self = load_json(&Self::file_path(state_dir))?.unwrap_or_default();
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                config.server_url = url.trim().to_string();
            }
        }
        if config.push_concurrency == 0 {
            config.push_concurrency = 1;
        }
        Ok(config)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        save_json(self, &Self::file_path(state_dir))
    }

    fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join("config.json")
    }
}

/// Who commits, and with which API token. Written once by `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub author: String,
    pub token: String,
    pub project_name: String,
}

impl Identity {
    pub fn load(state_dir: &Path) -> Result<Option<Self>> {
        load_json(&Self::file_path(state_dir))
    }

    /// Load the identity, failing with [`PmgError::ConfigurationMissing`] when absent or blank.
    pub fn require(state_dir: &Path) -> Result<Self> {
        let identity = Self::load(state_dir)?.ok_or_else(|| {
            PmgError::ConfigurationMissing("no identity found, run `pmg init`".to_string())
        })?;
        if identity.author.trim().is_empty() {
            return Err(PmgError::ConfigurationMissing("author is empty".to_string()));
        }
        Ok(identity)
    }

    /// The API token, failing when none was configured.
    pub fn token(&self) -> Result<&str> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(PmgError::ConfigurationMissing("API token is empty".to_string()));
        }
        Ok(token)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        save_json(self, &Self::file_path(state_dir))
    }

    fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join("identity.json")
    }
}

/// Addressing key of the remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    pub username: String,
    pub project_name: String,
}

impl RepositoryIdentity {
    pub fn new(username: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self { username: username.into(), project_name: project_name.into() }
    }

    pub fn load(state_dir: &Path) -> Result<Option<Self>> {
        load_json(&Self::file_path(state_dir))
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        save_json(self, &Self::file_path(state_dir))
    }

    fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join("repository.json")
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.username, self.project_name)
    }
}

/// Return the cached repository identity, asking for it on first use.
///
/// The project name defaults to the one recorded by `init`.
pub fn resolve_repository(
    state_dir: &Path,
    default_project: Option<&str>,
    prompt: &mut dyn Prompt,
) -> Result<RepositoryIdentity> {
    if let Some(repo) = RepositoryIdentity::load(state_dir)? {
        tracing::debug!("Using repository {}", repo);
        return Ok(repo);
    }

    let username = prompt.ask("Username on the server:")?;
    if username.is_empty() {
        return Err(PmgError::ConfigurationMissing("username is required".to_string()));
    }
    let project_name = match default_project.filter(|p| !p.trim().is_empty()) {
        Some(default) => {
            let answer = prompt.ask(&format!("Project name [{}]:", default))?;
            if answer.is_empty() { default.trim().to_string() } else { answer }
        }
        None => prompt.ask("Project name:")?,
    };
    if project_name.is_empty() {
        return Err(PmgError::ConfigurationMissing("project name is required".to_string()));
    }

    let repo = RepositoryIdentity::new(username, project_name);
    if let Err(e) = repo.save(state_dir) {
        tracing::warn!("Could not save repository config: {}", e);
    } else {
        tracing::info!("Repository config saved: {}", repo);
    }
    Ok(repo)
}
