//! Long-term memory
//!
//! Entries never expire. A relevance-ranked index plus tag and project sets
//! narrow the candidates before content matching. Reading an entry reinforces
//! it.

use async_trait::async_trait;
use chrono::Utc;

use super::store::SharedKvStore;
use super::tier::MemoryTier;
use super::types::{MemoryEntry, MemoryKind, SearchFilter, sort_by_relevance};
use crate::Result;

/// Relevance added on every read
pub const ACCESS_BOOST: f64 = 0.01;

/// Queries shorter than this skip content matching
pub const MIN_QUERY_LEN: usize = 3;

/// Top-ranked entries inspected when no index narrows the search
pub const CANDIDATE_WINDOW: usize = 100;

const KEY_PREFIX: &str = "memory:long:";
const RELEVANCE_KEY: &str = "memory:long:relevance";

pub struct LongTermMemory {
    store: SharedKvStore,
}

impl LongTermMemory {
    pub fn new(store: SharedKvStore) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    fn tag_key(tag: &str) -> String {
        format!("memory:long:tag:{}", tag)
    }

    fn project_key(project_id: &str) -> String {
        format!("memory:long:project:{}", project_id)
    }

    async fn load(&self, id: &str) -> Result<Option<MemoryEntry>> {
        match self.store.get(&Self::key(id)).await? {
            Some(raw) => Ok(Some(MemoryEntry::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entry: &MemoryEntry) -> Result<()> {
        self.store.set(&Self::key(&entry.id), &entry.to_json()?).await?;
        self.store
            .zadd(RELEVANCE_KEY, &entry.id, entry.metadata.relevance)
            .await
    }

    async fn index(&self, entry: &MemoryEntry) -> Result<()> {
        for tag in &entry.metadata.tags {
            self.store.sadd(&Self::tag_key(tag), &entry.id).await?;
        }
        if let Some(project_id) = &entry.metadata.project_id {
            self.store.sadd(&Self::project_key(project_id), &entry.id).await?;
        }
        Ok(())
    }

    async fn unindex(&self, entry: &MemoryEntry) -> Result<()> {
        self.store.zrem(RELEVANCE_KEY, &entry.id).await?;
        for tag in &entry.metadata.tags {
            self.store.srem(&Self::tag_key(tag), &entry.id).await?;
        }
        if let Some(project_id) = &entry.metadata.project_id {
            self.store.srem(&Self::project_key(project_id), &entry.id).await?;
        }
        Ok(())
    }

    /// Tag intersection, else project membership, else top by relevance
    async fn candidates(&self, filter: &SearchFilter) -> Result<Vec<String>> {
        if !filter.tags.is_empty() {
            let keys: Vec<String> = filter.tags.iter().map(|t| Self::tag_key(t)).collect();
            return self.store.sinter(&keys).await;
        }
        if let Some(project_id) = &filter.project_id {
            return self.store.smembers(&Self::project_key(project_id)).await;
        }
        self.store.zrevrange(RELEVANCE_KEY, 0, CANDIDATE_WINDOW).await
    }
}

#[async_trait]
impl MemoryTier for LongTermMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::LongTerm
    }

    async fn store(&self, entry: &MemoryEntry) -> Result<()> {
        // Re-storing an id must not leave stale index members behind
        if let Some(previous) = self.load(&entry.id).await? {
            self.unindex(&previous).await?;
        }
        self.save(entry).await?;
        self.index(entry).await
    }

    async fn search(&self, query: &str, limit: usize, filter: &SearchFilter) -> Result<Vec<MemoryEntry>> {
        let match_content = query.chars().count() >= MIN_QUERY_LEN;

        let mut results = Vec::new();
        for id in self.candidates(filter).await? {
            let Some(entry) = self.load(&id).await? else {
                continue;
            };
            if match_content && !entry.matches_query(query) {
                continue;
            }
            if filter.matches(&entry) {
                results.push(entry);
            }
        }

        sort_by_relevance(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        let Some(mut entry) = self.load(id).await? else {
            return Ok(None);
        };

        entry.metadata.access_count += 1;
        entry.metadata.last_accessed = Utc::now();
        entry.metadata.relevance = (entry.metadata.relevance + ACCESS_BOOST).min(1.0);
        self.save(&entry).await?;

        Ok(Some(entry))
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.load(id).await?.is_some())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(entry) = self.load(id).await? else {
            return Ok(false);
        };
        self.unindex(&entry).await?;
        self.store.del(&Self::key(id)).await
    }

    async fn count(&self) -> Result<usize> {
        self.store.zcard(RELEVANCE_KEY).await
    }
}
