//! Tiered memory
//!
//! Three tiers over one key-value store:
//! - short-term: TTL-bound, newest first
//! - long-term: permanent, ranked by relevance, indexed by tag and project
//! - entity: facts about named things, indexed by entity type and id
//!
//! `TieredMemory` is the entry point the rest of the hub uses.

pub mod entity;
pub mod in_memory;
pub mod long_term;
pub mod manager;
pub mod short_term;
pub mod sqlite;
pub mod store;
pub mod tier;
pub mod types;

// Re-exports
pub use entity::EntityMemory;
pub use in_memory::InMemoryKvStore;
pub use long_term::LongTermMemory;
pub use manager::{MemoryCounts, TieredMemory};
pub use short_term::ShortTermMemory;
pub use sqlite::SqliteKvStore;
pub use store::{KvStore, SharedKvStore, open_store};
pub use tier::MemoryTier;
pub use types::{MemoryEntry, MemoryKind, MemoryMetadata, NewMemory, SearchFilter};
