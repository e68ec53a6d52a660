//! HTTP transport to the PMG server.
//!
//! Endpoints:
//! - `POST api/push/file` (multipart, one file record per request)
//! - `POST api/pull/{user}/{project}` (zip archive of the project)
//! - `GET api/fetch/{user}/{project}` (latest commit id and timestamp)
//! - `GET api/authenticate`

use anyhow::Context;
use async_trait::async_trait;
use pmg_core::{FileUpload, PmgError, Remote, RemoteHead, RepositoryIdentity, Result};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

pub struct HttpRemote {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for `base_url` (e.g. `http://localhost:3000/`).
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn unavailable(url: &str, e: reqwest::Error) -> PmgError {
    PmgError::RemoteUnavailable(format!("{}: {}", url, e))
}

async fn status_error(url: &str, resp: reqwest::Response) -> PmgError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    PmgError::RemoteUnavailable(format!("{} returned {}: {}", url, status, body.trim()))
}

#[async_trait]
impl Remote for HttpRemote {
    async fn authenticate(&self) -> Result<()> {
        let url = self.url("api/authenticate");
        tracing::debug!("GET {}", url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| unavailable(&url, e))?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PmgError::ConfigurationMissing(
                "API token was rejected by the server".to_string(),
            )),
            _ => Err(status_error(&url, resp).await),
        }
    }

    async fn push_file(&self, upload: &FileUpload) -> Result<()> {
        let url = self.url("api/push/file");
        let mut form = Form::new()
            .text("commit_id", upload.commit_id.clone())
            .text("project_name", upload.project_name.clone())
            .text("path", upload.path.clone())
            .text("hash", upload.content_hash.clone())
            .text("last_updated", upload.timestamp.to_string())
            .text("commit_message", upload.commit_message.clone())
            .text("author", upload.author.clone());
        if let Some(bytes) = &upload.content {
            let file_name = upload.path.rsplit('/').next().unwrap_or(&upload.path).to_string();
            form = form.part("file", Part::bytes(bytes.clone()).file_name(file_name));
        }

        tracing::debug!("POST {} ({})", url, upload.path);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PmgError::FileTransfer {
                path: upload.path.clone(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("Server rejected {}: {}", upload.path, status);
            return Err(PmgError::FileTransfer {
                path: upload.path.clone(),
                reason: format!("server returned {}: {}", status, body.trim()),
            });
        }
        Ok(())
    }

    async fn pull_archive(&self, repo: &RepositoryIdentity) -> Result<Vec<u8>> {
        let url = self.url(&format!("api/pull/{}/{}", repo.username, repo.project_name));
        tracing::debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| unavailable(&url, e))?;
        if !resp.status().is_success() {
            return Err(status_error(&url, resp).await);
        }
        let bytes = resp.bytes().await.map_err(|e| unavailable(&url, e))?;
        tracing::debug!("Received {} byte archive from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn fetch_head(&self, repo: &RepositoryIdentity) -> Result<RemoteHead> {
        let url = self.url(&format!("api/fetch/{}/{}", repo.username, repo.project_name));
        tracing::debug!("GET {}", url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| unavailable(&url, e))?;
        // 404 means the owner or project does not exist; an empty project answers 200.
        if resp.status() == StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(PmgError::ConfigurationMissing(format!(
                "repository {} not found on the server ({}); check .pmg/repository.json",
                repo,
                body.trim()
            )));
        }
        if !resp.status().is_success() {
            return Err(status_error(&url, resp).await);
        }
        let body = resp.text().await.map_err(|e| unavailable(&url, e))?;
        RemoteHead::parse(&body)
    }
}
