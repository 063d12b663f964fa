//! Tiered memory façade
//!
//! Routes writes to one tier by kind and fans reads out across tiers. Store
//! failures on the read paths are logged and degrade to empty results.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::entity::EntityMemory;
use super::long_term::LongTermMemory;
use super::short_term::ShortTermMemory;
use super::store::SharedKvStore;
use super::tier::MemoryTier;
use super::types::{MemoryEntry, MemoryKind, NewMemory, SearchFilter, sort_by_relevance};
use crate::agents::clamp_unit;
use crate::ids::SharedIdGenerator;
use crate::{Error, Result};

/// Entry counts per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryCounts {
    pub short_term: usize,
    pub long_term: usize,
    pub entity: usize,
}

pub struct TieredMemory {
    short_term: ShortTermMemory,
    long_term: LongTermMemory,
    entity: EntityMemory,
    ids: SharedIdGenerator,
}

impl TieredMemory {
    pub fn new(store: SharedKvStore, short_term_ttl: Duration, ids: SharedIdGenerator) -> Self {
        Self {
            short_term: ShortTermMemory::new(store.clone(), short_term_ttl),
            long_term: LongTermMemory::new(store.clone()),
            entity: EntityMemory::new(store),
            ids,
        }
    }

    fn tier(&self, kind: MemoryKind) -> &dyn MemoryTier {
        match kind {
            MemoryKind::ShortTerm => &self.short_term,
            MemoryKind::LongTerm => &self.long_term,
            MemoryKind::Entity => &self.entity,
        }
    }

    /// Store a new entry in the tier named by its kind
    ///
    /// A caller-supplied id may be re-stored in its own tier but is rejected
    /// while another tier holds it.
    pub async fn store(&self, input: NewMemory) -> Result<MemoryEntry> {
        if let Some(id) = &input.id {
            self.ensure_unclaimed(id, input.kind).await?;
        }

        let now = Utc::now();
        let mut metadata = input.metadata;
        metadata.relevance = clamp_unit(metadata.relevance);
        metadata.last_accessed = now;

        let entry = MemoryEntry {
            id: input.id.unwrap_or_else(|| self.ids.next_id()),
            kind: input.kind,
            content: input.content,
            metadata,
            timestamp: now,
            expires_at: None,
        };

        self.tier(entry.kind).store(&entry).await.map_err(|e| {
            warn!(memory_id = %entry.id, kind = %entry.kind, error = %e, "Failed to store memory");
            Error::MemoryUnavailable(e.to_string())
        })?;

        debug!(memory_id = %entry.id, kind = %entry.kind, "Stored memory");
        Ok(entry)
    }

    async fn ensure_unclaimed(&self, id: &str, kind: MemoryKind) -> Result<()> {
        for other in MemoryKind::ALL.into_iter().filter(|k| *k != kind) {
            let held = self.tier(other).contains(id).await.map_err(|e| {
                warn!(memory_id = id, kind = %other, error = %e, "Memory lookup failed");
                Error::MemoryUnavailable(e.to_string())
            })?;
            if held {
                return Err(Error::DuplicateMemory {
                    id: id.to_string(),
                    kind: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Search the selected tiers concurrently, best entries first
    pub async fn search(&self, query: &str, limit: usize, filter: &SearchFilter) -> Vec<MemoryEntry> {
        let tiers: Vec<&dyn MemoryTier> = MemoryKind::ALL
            .into_iter()
            .filter(|k| filter.includes(*k))
            .map(|k| self.tier(k))
            .collect();

        let outcomes = join_all(tiers.iter().map(|t| t.search(query, limit, filter))).await;

        let mut merged = Vec::new();
        for (tier, outcome) in tiers.iter().zip(outcomes) {
            match outcome {
                Ok(entries) => merged.extend(entries),
                Err(e) => warn!(kind = %tier.kind(), error = %e, "Memory search failed"),
            }
        }

        sort_by_relevance(&mut merged);
        merged.truncate(limit);
        merged
    }

    /// Look an entry up in every tier, short-term first
    pub async fn get(&self, id: &str) -> Option<MemoryEntry> {
        for kind in MemoryKind::ALL {
            match self.tier(kind).get(id).await {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => {}
                Err(e) => warn!(memory_id = id, %kind, error = %e, "Memory lookup failed"),
            }
        }
        None
    }

    pub async fn get_by_entity_id(&self, entity_id: &str) -> Option<MemoryEntry> {
        match self.entity.get_by_entity_id(entity_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(entity_id, error = %e, "Entity lookup failed");
                None
            }
        }
    }

    /// Remove an entry from whichever tier holds it
    pub async fn delete(&self, id: &str) -> bool {
        let mut deleted = false;
        for kind in MemoryKind::ALL {
            match self.tier(kind).delete(id).await {
                Ok(removed) => deleted |= removed,
                Err(e) => warn!(memory_id = id, %kind, error = %e, "Memory delete failed"),
            }
        }
        deleted
    }

    pub async fn counts(&self) -> MemoryCounts {
        let count = |kind: MemoryKind| async move {
            self.tier(kind).count().await.unwrap_or_else(|e| {
                warn!(%kind, error = %e, "Memory count failed");
                0
            })
        };
        MemoryCounts {
            short_term: count(MemoryKind::ShortTerm).await,
            long_term: count(MemoryKind::LongTerm).await,
            entity: count(MemoryKind::Entity).await,
        }
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }
}
