//! Flat string -> bytes map with per-key TTL, the only shared resource of
//! the pipeline. Namespaces are key prefixes (`seen:`, `signal:`, `index:`,
//! `digest:`); each component touches only its own prefix.

use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv open failed: {0}")]
    Open(String),
    #[error("kv read failed: {0}")]
    Read(String),
    #[error("kv write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    /// `ttl_secs = None` stores without expiry.
    async fn put(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// SQLite-backed KV. A single `kv` table holds every namespace; expired rows
/// are invisible to `get` and reclaimed by `purge_expired`.
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    pub fn open(path: &str) -> Result<Self, KvError> {
        let conn = Connection::open(path).map_err(|e| KvError::Open(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| KvError::Open(e.to_string()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory().map_err(|e| KvError::Open(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, KvError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                expires_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
            ",
        )
        .map_err(|e| KvError::Open(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Deletes rows past their expiry. Returns the number reclaimed.
    pub fn purge_expired(&self) -> Result<usize, KvError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![epoch_secs()],
        )
        .map_err(|e| KvError::Write(e.to_string()))
    }
}

fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let conn = self.conn.lock().unwrap();
        let row = conn.query_row(
            "SELECT value, expires_at FROM kv WHERE key = ?1",
            params![key],
            |r| Ok((r.get::<_, Vec<u8>>(0)?, r.get::<_, Option<i64>>(1)?)),
        );
        match row {
            Ok((_, Some(exp))) if exp <= epoch_secs() => Ok(None),
            Ok((value, _)) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(KvError::Read(e.to_string())),
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<(), KvError> {
        let expires_at = ttl_secs.map(|ttl| epoch_secs() + ttl as i64);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )
        .map_err(|e| KvError::Write(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| KvError::Write(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.put("signal:2026-01-20:x", b"{\"a\":1}", Some(3600))
            .await
            .unwrap();
        let got = kv.get("signal:2026-01-20:x").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"{\"a\":1}".as_slice()));
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let kv = SqliteKv::open_in_memory().unwrap();
        assert!(kv.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.put("k", b"old", Some(3600)).await.unwrap();
        kv.put("k", b"new", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some(b"new".as_slice()));
    }

    #[tokio::test]
    async fn zero_ttl_is_already_expired() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.put("ephemeral", b"x", Some(0)).await.unwrap();
        assert!(kv.get("ephemeral").await.unwrap().is_none());
        assert_eq!(kv.purge_expired().unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.put("k", b"v", None).await.unwrap();
        kv.delete("k").await.unwrap();
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_keeps_live_keys() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.put("live", b"v", Some(3600)).await.unwrap();
        kv.put("forever", b"v", None).await.unwrap();
        assert_eq!(kv.purge_expired().unwrap(), 0);
        assert!(kv.get("live").await.unwrap().is_some());
        assert!(kv.get("forever").await.unwrap().is_some());
    }
}
