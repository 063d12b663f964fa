//! In-process store backed by `DashMap`
//!
//! Expired keys are dropped lazily on read.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::store::KvStore;
use crate::Result;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    strings: Arc<DashMap<String, StoredValue>>,
    zsets: Arc<DashMap<String, HashMap<String, f64>>>,
    sets: Arc<DashMap<String, HashSet<String>>>,
    hashes: Arc<DashMap<String, HashMap<String, String>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_members(&self, key: &str, descending: bool) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        if descending {
            members.reverse();
        }
        members
    }

    #[cfg(test)]
    pub(crate) fn string_count(&self) -> usize {
        self.strings.len()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = match self.strings.get(key) {
            None => return Ok(None),
            Some(v) if !v.is_expired() => return Ok(Some(v.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.strings.remove_if(key, |_, v| v.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.strings.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.strings.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self
            .strings
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrevrange(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>> {
        Ok(self
            .sorted_members(key, true)
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(m, _)| m)
            .collect())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        Ok(self
            .sorted_members(key, false)
            .into_iter()
            .filter(|(_, s)| *s >= min && *s <= max)
            .map(|(m, _)| m)
            .collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let removed = self
            .zsets
            .get_mut(key)
            .is_some_and(|mut z| z.remove(member).is_some());
        self.zsets.remove_if(key, |_, z| z.is_empty());
        Ok(removed)
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        let removed = match self.zsets.get_mut(key) {
            Some(mut zset) => {
                let before = zset.len();
                zset.retain(|_, s| *s < min || *s > max);
                before - zset.len()
            }
            None => return Ok(0),
        };
        self.zsets.remove_if(key, |_, z| z.is_empty());
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        Ok(self.zsets.get(key).map(|z| z.len()).unwrap_or(0))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed = self.sets.get_mut(key).is_some_and(|mut s| s.remove(member));
        self.sets.remove_if(key, |_, s| s.is_empty());
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut members: Vec<String> = self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let removed = self
            .hashes
            .get_mut(key)
            .is_some_and(|mut h| h.remove(field).is_some());
        self.hashes.remove_if(key, |_, h| h.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = InMemoryKvStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_ex_expires() {
        let store = InMemoryKvStore::new();
        store.set_ex("k", "v", Duration::from_millis(20)).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ordered_set() {
        let store = InMemoryKvStore::new();
        store.zadd("z", "low", 0.1).await.unwrap();
        store.zadd("z", "high", 0.9).await.unwrap();
        store.zadd("z", "mid", 0.5).await.unwrap();

        assert_eq!(store.zrevrange("z", 0, 2).await.unwrap(), vec!["high", "mid"]);
        assert_eq!(store.zrevrange("z", 1, 10).await.unwrap(), vec!["mid", "low"]);
        assert_eq!(store.zrangebyscore("z", 0.0, 0.5).await.unwrap(), vec!["low", "mid"]);

        store.zadd("z", "low", 1.0).await.unwrap();
        assert_eq!(store.zrevrange("z", 0, 1).await.unwrap(), vec!["low"]);

        assert_eq!(store.zremrangebyscore("z", 0.0, 0.6).await.unwrap(), 1);
        assert!(store.zrem("z", "high").await.unwrap());
        assert_eq!(store.zcard("z").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sets_and_hashes() {
        let store = InMemoryKvStore::new();
        store.sadd("s", "b").await.unwrap();
        store.sadd("s", "a").await.unwrap();
        store.sadd("s", "a").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["a", "b"]);
        assert!(store.srem("s", "a").await.unwrap());
        assert!(!store.srem("missing", "a").await.unwrap());

        store.hset("h", "f", "1").await.unwrap();
        assert_eq!(store.hget("h", "f").await.unwrap().as_deref(), Some("1"));
        assert!(store.hdel("h", "f").await.unwrap());
        assert!(store.hget("h", "f").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_emptied_collections_drop_their_keys() {
        let store = InMemoryKvStore::new();
        store.zadd("z", "a", 1.0).await.unwrap();
        store.zadd("z", "b", 2.0).await.unwrap();
        store.zadd("r", "c", 5.0).await.unwrap();
        store.sadd("s", "x").await.unwrap();
        store.hset("h", "f", "v").await.unwrap();

        assert!(store.zrem("z", "a").await.unwrap());
        assert!(store.zsets.contains_key("z"));
        assert!(store.zrem("z", "b").await.unwrap());
        assert_eq!(store.zremrangebyscore("r", 0.0, 10.0).await.unwrap(), 1);
        assert!(store.srem("s", "x").await.unwrap());
        assert!(store.hdel("h", "f").await.unwrap());

        assert!(store.zsets.is_empty());
        assert!(store.sets.is_empty());
        assert!(store.hashes.is_empty());
        assert_eq!(store.zcard("z").await.unwrap(), 0);
    }
}
