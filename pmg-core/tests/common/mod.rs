//! Shared fixtures for the sync-cycle tests: an in-memory remote and a
//! working-tree builder.

#![allow(dead_code)]

use async_trait::async_trait;
use pmg_core::{
    FileUpload, MetadataStore, PmgError, Remote, RemoteHead, RepositoryIdentity, Result,
    StagingBuffer, Workspace,
};
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Remote that keeps everything in memory.
#[derive(Default)]
pub struct MockRemote {
    uploads: Mutex<Vec<FileUpload>>,
    failing: Mutex<HashSet<String>>,
    head: Mutex<RemoteHead>,
    archive: Mutex<Vec<u8>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads of `path` until [`MockRemote::heal`] is called.
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn set_head(&self, head: RemoteHead) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_archive(&self, entries: &[(&str, &str)]) {
        *self.archive.lock().unwrap() = build_zip(entries);
    }

    pub fn uploads(&self) -> Vec<FileUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.uploads().into_iter().map(|u| u.path).collect();
        paths.sort();
        paths
    }

    pub fn clear_uploads(&self) {
        self.uploads.lock().unwrap().clear();
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    async fn push_file(&self, upload: &FileUpload) -> Result<()> {
        if self.failing.lock().unwrap().contains(&upload.path) {
            return Err(PmgError::FileTransfer {
                path: upload.path.clone(),
                reason: "server returned 500".to_string(),
            });
        }
        self.uploads.lock().unwrap().push(upload.clone());
        Ok(())
    }

    async fn pull_archive(&self, _repo: &RepositoryIdentity) -> Result<Vec<u8>> {
        Ok(self.archive.lock().unwrap().clone())
    }

    async fn fetch_head(&self, _repo: &RepositoryIdentity) -> Result<RemoteHead> {
        Ok(self.head.lock().unwrap().clone())
    }
}

pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A temporary initialized working tree with its store and staging buffer.
pub struct Fixture {
    pub tmp: TempDir,
    pub ws: Workspace,
    pub store: MetadataStore,
    pub buffer: StagingBuffer,
    pub repo: RepositoryIdentity,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        fs::create_dir_all(ws.state_dir()).unwrap();
        let store = MetadataStore::open(&ws.db_path()).unwrap();
        let buffer = StagingBuffer::new(&ws.staging_path());
        Self { tmp, ws, store, buffer, repo: RepositoryIdentity::new("alice", "demo") }
    }

    pub fn root(&self) -> &Path {
        self.ws.root()
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.ws.resolve(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.ws.resolve(rel)).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.ws.resolve(rel)).unwrap()
    }
}
