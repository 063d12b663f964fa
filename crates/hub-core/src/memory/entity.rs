//! Entity memory
//!
//! Facts about named things (classes, services, people). Indexed by entity
//! type and project, with a lookup table from entity id to memory id.

use async_trait::async_trait;
use chrono::Utc;

use super::long_term::{ACCESS_BOOST, CANDIDATE_WINDOW, MIN_QUERY_LEN};
use super::store::SharedKvStore;
use super::tier::MemoryTier;
use super::types::{MemoryEntry, MemoryKind, SearchFilter, sort_by_relevance};
use crate::Result;

const KEY_PREFIX: &str = "memory:entity:";
const LOOKUP_KEY: &str = "memory:entity:lookup";
const RELEVANCE_KEY: &str = "memory:entity:relevance";

pub struct EntityMemory {
    store: SharedKvStore,
}

impl EntityMemory {
    pub fn new(store: SharedKvStore) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    fn type_key(entity_type: &str) -> String {
        format!("memory:entity:type:{}", entity_type)
    }

    fn project_key(project_id: &str) -> String {
        format!("memory:entity:project:{}", project_id)
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
        let meta = &entry.metadata;
        if let Some(entity_type) = &meta.entity_type {
            self.store.sadd(&Self::type_key(entity_type), &entry.id).await?;
        }
        if let Some(project_id) = &meta.project_id {
            self.store.sadd(&Self::project_key(project_id), &entry.id).await?;
        }
        if let Some(entity_id) = &meta.entity_id {
            self.store.hset(LOOKUP_KEY, entity_id, &entry.id).await?;
        }
        Ok(())
    }

    async fn unindex(&self, entry: &MemoryEntry) -> Result<()> {
        let meta = &entry.metadata;
        self.store.zrem(RELEVANCE_KEY, &entry.id).await?;
        if let Some(entity_type) = &meta.entity_type {
            self.store.srem(&Self::type_key(entity_type), &entry.id).await?;
        }
        if let Some(project_id) = &meta.project_id {
            self.store.srem(&Self::project_key(project_id), &entry.id).await?;
        }
        if let Some(entity_id) = &meta.entity_id {
            // Only drop the lookup if it still points at this entry
            if self.store.hget(LOOKUP_KEY, entity_id).await?.as_deref() == Some(entry.id.as_str()) {
                self.store.hdel(LOOKUP_KEY, entity_id).await?;
            }
        }
        Ok(())
    }

    async fn candidates(&self, filter: &SearchFilter) -> Result<Vec<String>> {
        match (&filter.entity_type, &filter.project_id) {
            (Some(entity_type), Some(project_id)) => {
                let keys = vec![Self::type_key(entity_type), Self::project_key(project_id)];
                self.store.sinter(&keys).await
            }
            (Some(entity_type), None) => self.store.smembers(&Self::type_key(entity_type)).await,
            (None, Some(project_id)) => self.store.smembers(&Self::project_key(project_id)).await,
            (None, None) => self.store.zrevrange(RELEVANCE_KEY, 0, CANDIDATE_WINDOW).await,
        }
    }

    /// Fetch the entry recorded for an entity id
    pub async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<MemoryEntry>> {
        match self.store.hget(LOOKUP_KEY, entity_id).await? {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MemoryTier for EntityMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::Entity
    }

    async fn store(&self, entry: &MemoryEntry) -> Result<()> {
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
