//! Short-term memory
//!
//! Entries expire after a TTL. A recency index scored by insertion time lets
//! search walk the newest entries first.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use super::store::SharedKvStore;
use super::tier::MemoryTier;
use super::types::{MemoryEntry, MemoryKind, SearchFilter};
use crate::Result;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// How many of the most recent entries a search inspects
pub const SEARCH_WINDOW: usize = 100;

const KEY_PREFIX: &str = "memory:short:";
const INDEX_KEY: &str = "memory:short:index";

pub struct ShortTermMemory {
    store: SharedKvStore,
    ttl: Duration,
}

impl ShortTermMemory {
    pub fn new(store: SharedKvStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    /// Delete entries that have outlived the TTL along with their index members
    pub async fn purge_expired(&self) -> Result<usize> {
        let cutoff = Utc::now().timestamp_millis() as f64 - self.ttl.as_millis() as f64;
        let expired = self
            .store
            .zrangebyscore(INDEX_KEY, f64::NEG_INFINITY, cutoff)
            .await?;
        for id in &expired {
            self.store.del(&Self::key(id)).await?;
            self.store.zrem(INDEX_KEY, id).await?;
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "Purged expired short-term entries");
        }
        Ok(expired.len())
    }
}

#[async_trait]
impl MemoryTier for ShortTermMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::ShortTerm
    }

    async fn store(&self, entry: &MemoryEntry) -> Result<()> {
        let mut entry = entry.clone();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1));
        entry.expires_at = Some(entry.timestamp + ttl);

        self.store
            .set_ex(&Self::key(&entry.id), &entry.to_json()?, self.ttl)
            .await?;
        self.store
            .zadd(INDEX_KEY, &entry.id, entry.timestamp.timestamp_millis() as f64)
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize, filter: &SearchFilter) -> Result<Vec<MemoryEntry>> {
        let candidates = self.store.zrevrange(INDEX_KEY, 0, SEARCH_WINDOW).await?;

        let mut results = Vec::new();
        for id in candidates {
            if results.len() >= limit {
                break;
            }
            // Missing means expired; the sweep cleans the index
            let Some(entry) = self.get(&id).await? else {
                continue;
            };
            if entry.matches_query(query) && filter.matches_project(&entry) && filter.matches_tags(&entry) {
                results.push(entry);
            }
        }
        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        match self.store.get(&Self::key(id)).await? {
            Some(raw) => Ok(Some(MemoryEntry::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.store.get(&Self::key(id)).await?.is_some())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.store.zrem(INDEX_KEY, id).await?;
        self.store.del(&Self::key(id)).await
    }

    async fn count(&self) -> Result<usize> {
        self.purge_expired().await?;
        self.store.zcard(INDEX_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::in_memory::InMemoryKvStore;
    use crate::memory::store::KvStore;
    use crate::memory::types::MemoryMetadata;
    use std::sync::Arc;

    fn entry(id: &str, content: &str, metadata: MemoryMetadata) -> MemoryEntry {
        MemoryEntry::new(id, MemoryKind::ShortTerm, content, metadata)
    }

    fn memory(ttl: Duration) -> ShortTermMemory {
        ShortTermMemory::new(Arc::new(InMemoryKvStore::new()), ttl)
    }

    #[tokio::test]
    async fn test_store_and_get_sets_expiry() {
        let memory = memory(DEFAULT_TTL);
        memory
            .store(&entry("s1", "recent request", MemoryMetadata::default()))
            .await
            .unwrap();

        let loaded = memory.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.content, "recent request");
        assert!(loaded.expires_at.unwrap() > loaded.timestamp);
        assert_eq!(memory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_newest_first_with_filter() {
        let memory = memory(DEFAULT_TTL);
        let mut older = entry("old", "fix the parser", MemoryMetadata::default().with_project("p1"));
        older.timestamp -= chrono::Duration::seconds(10);
        memory.store(&older).await.unwrap();
        memory
            .store(&entry("new", "parser crashed again", MemoryMetadata::default().with_project("p1")))
            .await
            .unwrap();
        memory
            .store(&entry("other", "parser in p2", MemoryMetadata::default().with_project("p2")))
            .await
            .unwrap();

        let found = memory
            .search("parser", 10, &SearchFilter::for_project("p1"))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let limited = memory.search("parser", 1, &SearchFilter::default()).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_disappear() {
        let memory = memory(Duration::from_millis(20));
        memory
            .store(&entry("s1", "soon gone", MemoryMetadata::default()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(memory.get("s1").await.unwrap().is_none());
        assert!(memory.search("", 10, &SearchFilter::default()).await.unwrap().is_empty());
        assert_eq!(memory.purge_expired().await.unwrap(), 1);
        assert_eq!(memory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let memory = memory(DEFAULT_TTL);
        memory
            .store(&entry("s1", "x", MemoryMetadata::default().with_tags(["a"])))
            .await
            .unwrap();
        assert!(memory.delete("s1").await.unwrap());
        assert!(!memory.delete("s1").await.unwrap());
        assert!(
            memory
                .search("", 10, &SearchFilter::default().with_tags(["a"]))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_purge_deletes_expired_records() {
        let store = Arc::new(InMemoryKvStore::new());
        let memory = ShortTermMemory::new(store.clone(), Duration::from_millis(20));
        memory
            .store(&entry("s1", "soon gone", MemoryMetadata::default()))
            .await
            .unwrap();
        memory
            .store(&entry("s2", "also gone", MemoryMetadata::default()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(memory.purge_expired().await.unwrap(), 2);
        assert_eq!(store.string_count(), 0);
        assert_eq!(store.zcard(INDEX_KEY).await.unwrap(), 0);
    }
}
