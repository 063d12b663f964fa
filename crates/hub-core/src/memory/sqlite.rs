//! Store implementation using SQLite

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::time::Duration;
use tracing::{debug, info};

use super::store::KvStore;
use crate::Result;

/// SQLite-based key-value store
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        debug!("Opening store database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!("SqliteKvStore initialized successfully");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS zsets (
                key TEXT NOT NULL,
                member TEXT NOT NULL,
                score REAL NOT NULL,
                PRIMARY KEY (key, member)
            );
            CREATE INDEX IF NOT EXISTS idx_zsets_score ON zsets(key, score);
            CREATE TABLE IF NOT EXISTS sets (
                key TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (key, member)
            );
            CREATE TABLE IF NOT EXISTS hashes (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );",
        )?;
        Ok(())
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn put(&self, key: &str, value: &str, expires_at: Option<i64>) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at],
        )?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((_, Some(expires_at))) if expires_at <= Self::now_ms() => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value, None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = Self::now_ms() + ttl.as_millis() as i64;
        self.put(key, value, Some(expires_at))
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            params![key, Self::now_ms()],
        )?;
        // expired leftovers
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO zsets (key, member, score) VALUES (?1, ?2, ?3)",
            params![key, member, score],
        )?;
        Ok(())
    }

    async fn zrevrange(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT member FROM zsets WHERE key = ?1
             ORDER BY score DESC, member DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let members = stmt
            .query_map(params![key, count as i64, offset as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(members)
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT member FROM zsets WHERE key = ?1 AND score >= ?2 AND score <= ?3
             ORDER BY score ASC, member ASC",
        )?;
        let members = stmt
            .query_map(params![key, min, max], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(members)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM zsets WHERE key = ?1 AND member = ?2",
            params![key, member],
        )?;
        Ok(removed > 0)
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        let removed = self.conn.lock().execute(
            "DELETE FROM zsets WHERE key = ?1 AND score >= ?2 AND score <= ?3",
            params![key, min, max],
        )?;
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM zsets WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO sets (key, member) VALUES (?1, ?2)",
            params![key, member],
        )?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM sets WHERE key = ?1 AND member = ?2",
            params![key, member],
        )?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT member FROM sets WHERE key = ?1 ORDER BY member")?;
        let members = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(members)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO hashes (key, field, value) VALUES (?1, ?2, ?3)",
            params![key, field, value],
        )?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM hashes WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM hashes WHERE key = ?1 AND field = ?2",
            params![key, field],
        )?;
        Ok(removed > 0)
    }
}
