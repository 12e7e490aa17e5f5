use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::kv::{check_value_size, KeyValueStore, KvError, KvKey, StorageErrorCode};
use crate::model::UnixTimeMs;

/// SQLite-backed key-value store. Every write runs in its own transaction.
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqlite_error)?;
        // WAL keeps readers off the writer's half-finished pages.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .map_err(map_sqlite_error)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, KvError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(map_sqlite_error)?;
        debug!("kv schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteKv {
    async fn get(&self, key: &KvKey) -> Result<Option<Vec<u8>>, KvError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            params![key.raw()],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map_err(map_sqlite_error)
    }

    async fn set(&self, key: &KvKey, value: Vec<u8>) -> Result<(), KvError> {
        check_value_size(&value)?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(map_sqlite_error)?;
        tx.execute(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key.raw(), value, UnixTimeMs::now().as_millis() as i64],
        )
        .map_err(map_sqlite_error)?;
        tx.commit().map_err(map_sqlite_error)
    }

    async fn delete(&self, key: &KvKey) -> Result<bool, KvError> {
        let conn = self.conn.lock().await;
        let removed = conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key.raw()])
            .map_err(map_sqlite_error)?;
        Ok(removed > 0)
    }
}

fn map_sqlite_error(e: rusqlite::Error) -> KvError {
    use rusqlite::ErrorCode;

    let code = match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) => StorageErrorCode::Busy,
        Some(ErrorCode::DatabaseLocked) => StorageErrorCode::Locked,
        Some(ErrorCode::DiskFull) => StorageErrorCode::DiskFull,
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
            StorageErrorCode::Corrupted
        }
        Some(ErrorCode::ReadOnly) | Some(ErrorCode::PermissionDenied) => {
            StorageErrorCode::PermissionDenied
        }
        Some(ErrorCode::CannotOpen) => StorageErrorCode::ConnectionFailed,
        Some(ErrorCode::SystemIoFailure) => StorageErrorCode::IoError,
        _ => StorageErrorCode::Unknown,
    };
    KvError::storage(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::KeyNamespace;
    use tempfile::tempdir;

    fn key() -> KvKey {
        KvKey::new(KeyNamespace::Cache, "messages").unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_reads_none() {
        let kv = SqliteKv::open_in_memory().unwrap();
        assert_eq!(kv.get(&key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_value() {
        let kv = SqliteKv::open_in_memory().unwrap();

        kv.set(&key(), b"first".to_vec()).await.unwrap();
        kv.set(&key(), b"second".to_vec()).await.unwrap();

        assert_eq!(kv.get(&key()).await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.sqlite");

        {
            let kv = SqliteKv::open(&path).unwrap();
            kv.set(&key(), vec![7, 7, 7]).await.unwrap();
        }

        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.get(&key()).await.unwrap(), Some(vec![7, 7, 7]));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.set(&key(), vec![1]).await.unwrap();

        assert!(kv.delete(&key()).await.unwrap());
        assert!(!kv.delete(&key()).await.unwrap());
        assert_eq!(kv.get(&key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_in_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("kv.sqlite");

        let result = SqliteKv::open(&path);
        assert!(matches!(result, Err(KvError::Storage { .. })));
    }
}
