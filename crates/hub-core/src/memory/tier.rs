use async_trait::async_trait;

use super::types::{MemoryEntry, MemoryKind, SearchFilter};
use crate::Result;

/// Operations every memory tier supports
#[async_trait]
pub trait MemoryTier: Send + Sync {
    fn kind(&self) -> MemoryKind;

    async fn store(&self, entry: &MemoryEntry) -> Result<()>;

    async fn search(&self, query: &str, limit: usize, filter: &SearchFilter) -> Result<Vec<MemoryEntry>>;

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>>;

    /// Whether the tier holds `id`, without counting as an access
    async fn contains(&self, id: &str) -> Result<bool>;

    /// Returns whether an entry was removed
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;
}
