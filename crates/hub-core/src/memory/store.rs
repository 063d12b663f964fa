//! Key-value store primitives used by the memory tiers
//!
//! The tiers only need a small Redis-like surface: plain keys with optional
//! expiry, ordered sets, unordered sets and hashes.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::in_memory::InMemoryKvStore;
use super::sqlite::SqliteKvStore;
use crate::{Error, Result};

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set a key that disappears after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns whether the key existed
    async fn del(&self, key: &str) -> Result<bool>;

    /// Add or re-score a member of an ordered set
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Members by descending score, skipping `offset` and returning at most `count`
    async fn zrevrange(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>>;

    /// Members with `min <= score <= max`, ascending
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove members with `min <= score <= max`, returning how many were removed
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize>;

    async fn zcard(&self, key: &str) -> Result<usize>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    /// Members of a set, sorted
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Members present in every one of `keys`, sorted
    async fn sinter(&self, keys: &[String]) -> Result<Vec<String>> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };

        let mut common: HashSet<String> = self.smembers(first).await?.into_iter().collect();
        for key in rest {
            if common.is_empty() {
                break;
            }
            let members: HashSet<String> = self.smembers(key).await?.into_iter().collect();
            common.retain(|m| members.contains(m));
        }

        let mut common: Vec<String> = common.into_iter().collect();
        common.sort();
        Ok(common)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;
}

pub type SharedKvStore = Arc<dyn KvStore>;

/// Open a store from a URL
///
/// - `memory://` keeps everything in process
/// - `sqlite://<path>` persists to a SQLite file (`sqlite://:memory:` for a
///   private in-memory database)
pub fn open_store(url: &str) -> Result<SharedKvStore> {
    if url == "memory://" || url == "memory" {
        info!("Using in-memory store");
        return Ok(Arc::new(InMemoryKvStore::new()));
    }

    if let Some(path) = url.strip_prefix("sqlite://") {
        if path == ":memory:" {
            return Ok(Arc::new(SqliteKvStore::in_memory()?));
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        return Ok(Arc::new(SqliteKvStore::new(path)?));
    }

    Err(Error::Config(format!("Unsupported store URL: {}", url)))
}
