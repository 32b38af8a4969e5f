//! SQLite-backed blob store.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::blob::BlobStore;
use beehive_core::{Error, Result};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS blobs (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);
";

/// Blob store persisted in a single SQLite table.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteBlobStore {
    /// Open or create the database file at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Persistence(e.to_string()))?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        info!("SqliteBlobStore initialized: path={}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .prepare_cached("SELECT value FROM blobs WHERE namespace = ?1 AND key = ?2")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![namespace, key], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&self, namespace: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO blobs (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![namespace, key, text, now])
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> (SqliteBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteBlobStore::open(dir.path().join("beehive.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_set_then_get() {
        let (store, _dir) = test_store();
        store.set("mutations", "current", &json!({"status": "ok"})).unwrap();
        let value = store.get("mutations", "current").unwrap().unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let (store, _dir) = test_store();
        store.set("deploy", "current", &json!({"status": "queued"})).unwrap();
        store.set("deploy", "current", &json!({"status": "success"})).unwrap();
        let value = store.get("deploy", "current").unwrap().unwrap();
        assert_eq!(value["status"], "success");
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beehive.db");
        {
            let store = SqliteBlobStore::open(&path).unwrap();
            store.set("mutations", "history", &json!([1, 2, 3])).unwrap();
        }
        let store = SqliteBlobStore::open(&path).unwrap();
        assert_eq!(store.get("mutations", "history").unwrap(), Some(json!([1, 2, 3])));
        assert!(store.get("mutations", "current").unwrap().is_none());
    }
}
