//! SQLite-backed metadata store
//!
//! One append-only table of file-version records. A path's current tracked
//! hash is the hash of its most recently inserted row; the only update ever
//! made is flipping `is_synced` for every row of a commit at once.

use crate::error::Result;
use crate::hash::DELETED;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One row per file per commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersionRecord {
    pub path: String,
    /// Hex SHA-256 of the file bytes, or [`DELETED`].
    pub content_hash: String,
    /// Commit time, Unix seconds.
    pub timestamp: i64,
    pub commit_message: String,
    pub author: String,
    pub commit_id: String,
    pub synced: bool,
}

impl FileVersionRecord {
    pub fn is_deleted(&self) -> bool {
        self.content_hash == DELETED
    }
}

/// Aggregate view of one commit, newest first in [`MetadataStore::commits`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub commit_id: String,
    pub timestamp: i64,
    pub message: String,
    pub author: String,
    pub file_count: u64,
    pub synced: bool,
}

const RECORD_COLUMNS: &str =
    "path, hash, last_updated, commit_message, author, commit_id, is_synced";

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL,
            hash TEXT NOT NULL,
            last_updated INTEGER NOT NULL,
            commit_message TEXT NOT NULL,
            author TEXT NOT NULL,
            commit_id TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
        CREATE INDEX IF NOT EXISTS idx_files_commit ON files(commit_id);
        CREATE INDEX IF NOT EXISTS idx_files_synced ON files(is_synced);",
    )?;
    Ok(())
}

fn open_metadata_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init_schema(&conn)?;
    Ok(conn)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileVersionRecord> {
    Ok(FileVersionRecord {
        path: row.get(0)?,
        content_hash: row.get(1)?,
        timestamp: row.get(2)?,
        commit_message: row.get(3)?,
        author: row.get(4)?,
        commit_id: row.get(5)?,
        synced: row.get(6)?,
    })
}

/// Durable table of file-version records.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open the store at `db_path`, creating the file and schema if absent.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_metadata_db(db_path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Non-durable store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, record: &FileVersionRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO files (path, hash, last_updated, commit_message, author, commit_id, is_synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.path,
                record.content_hash,
                record.timestamp,
                record.commit_message,
                record.author,
                record.commit_id,
                record.synced,
            ],
        )?;
        Ok(())
    }

    /// Most recently inserted record for `path`.
    pub fn latest_record(&self, path: &str) -> Result<Option<FileVersionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files WHERE path = ?1 ORDER BY id DESC LIMIT 1");
        Ok(self
            .conn()
            .query_row(&sql, [path], row_to_record)
            .optional()?)
    }

    /// Newest record by commit timestamp, ties broken by insertion order.
    pub fn latest_record_overall(&self) -> Result<Option<FileVersionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files ORDER BY last_updated DESC, id DESC LIMIT 1");
        Ok(self.conn().query_row(&sql, [], row_to_record).optional()?)
    }

    pub fn count_unsynced(&self) -> Result<u64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM files WHERE is_synced = 0", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// Flip every record of `commit_id` to synced. Returns the number of rows changed.
    pub fn mark_commit_synced(&self, commit_id: &str) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE files SET is_synced = 1 WHERE commit_id = ?1 AND is_synced = 0",
            [commit_id],
        )?;
        Ok(changed)
    }

    pub fn all_distinct_paths(&self) -> Result<BTreeSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT DISTINCT path FROM files")?;
        let paths = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(paths)
    }

    /// Commit id of the newest unsynced record.
    pub fn latest_unsynced_commit(&self) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT commit_id FROM files WHERE is_synced = 0
                 ORDER BY last_updated DESC, id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// All records of a commit in insertion order.
    pub fn records_for_commit(&self, commit_id: &str) -> Result<Vec<FileVersionRecord>> {
        let conn = self.conn();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files WHERE commit_id = ?1 ORDER BY id");
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map([commit_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Commit summaries, newest first.
    pub fn commits(&self, limit: usize) -> Result<Vec<CommitSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT commit_id, MAX(last_updated), MAX(commit_message), MAX(author),
                    COUNT(*), MIN(is_synced)
             FROM files GROUP BY commit_id
             ORDER BY MAX(last_updated) DESC, MAX(id) DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let commits = stmt
            .query_map([limit], |row| {
                Ok(CommitSummary {
                    commit_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    message: row.get(2)?,
                    author: row.get(3)?,
                    file_count: row.get::<_, i64>(4)? as u64,
                    synced: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str, hash: &str, ts: i64, commit: &str) -> FileVersionRecord {
        FileVersionRecord {
            path: path.into(),
            content_hash: hash.into(),
            timestamp: ts,
            commit_message: "msg".into(),
            author: "alice".into(),
            commit_id: commit.into(),
            synced: false,
        }
    }

    #[test]
    fn test_latest_record_is_last_inserted() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.insert(&record("a.txt", "h1", 100, "c1")).unwrap();
        store.insert(&record("a.txt", "h2", 100, "c2")).unwrap();
        store.insert(&record("b.txt", "h3", 100, "c2")).unwrap();

        let latest = store.latest_record("a.txt").unwrap().unwrap();
        assert_eq!(latest.content_hash, "h2");
        assert!(store.latest_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_latest_record_overall_by_timestamp() {
        let store = MetadataStore::open_in_memory().unwrap();
        assert!(store.latest_record_overall().unwrap().is_none());
        store.insert(&record("new.txt", "h1", 200, "c2")).unwrap();
        store.insert(&record("old.txt", "h2", 100, "c1")).unwrap();

        let latest = store.latest_record_overall().unwrap().unwrap();
        assert_eq!(latest.commit_id, "c2");
    }

    #[test]
    fn test_mark_commit_synced_flips_whole_commit() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.insert(&record("a.txt", "h1", 100, "c1")).unwrap();
        store.insert(&record("b.txt", "h2", 100, "c1")).unwrap();
        store.insert(&record("c.txt", "h3", 200, "c2")).unwrap();
        assert_eq!(store.count_unsynced().unwrap(), 3);

        assert_eq!(store.mark_commit_synced("c1").unwrap(), 2);
        assert_eq!(store.count_unsynced().unwrap(), 1);
        assert!(store.records_for_commit("c1").unwrap().iter().all(|r| r.synced));
        assert_eq!(store.latest_unsynced_commit().unwrap().as_deref(), Some("c2"));
    }

    #[test]
    fn test_all_distinct_paths() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.insert(&record("a.txt", "h1", 100, "c1")).unwrap();
        store.insert(&record("a.txt", DELETED, 200, "c2")).unwrap();
        store.insert(&record("dir/b.txt", "h2", 200, "c2")).unwrap();

        let paths = store.all_distinct_paths().unwrap();
        assert_eq!(paths.into_iter().collect::<Vec<_>>(), vec!["a.txt", "dir/b.txt"]);
        assert!(store.latest_record("a.txt").unwrap().unwrap().is_deleted());
    }

    #[test]
    fn test_commits_summary() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.insert(&record("a.txt", "h1", 100, "c1")).unwrap();
        store.insert(&record("b.txt", "h2", 100, "c1")).unwrap();
        store.mark_commit_synced("c1").unwrap();
        store.insert(&record("a.txt", "h3", 200, "c2")).unwrap();

        let commits = store.commits(10).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].commit_id, "c2");
        assert!(!commits[0].synced);
        assert_eq!(commits[1].file_count, 2);
        assert!(commits[1].synced);
        assert_eq!(store.commits(1).unwrap().len(), 1);
    }

    #[test]
    fn test_store_persistence() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join(".pmg").join("vcs.db");
        {
            let store = MetadataStore::open(&db).unwrap();
            store.insert(&record("a.txt", "h1", 100, "c1")).unwrap();
        }
        let store = MetadataStore::open(&db).unwrap();
        assert_eq!(store.count_unsynced().unwrap(), 1);
        assert_eq!(store.latest_record("a.txt").unwrap().unwrap().content_hash, "h1");
    }
}
