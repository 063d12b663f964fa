//! Id generation
//!
//! Every component that mints ids takes an `IdGenerator` so tests can
//! substitute a deterministic sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of unique identifiers
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Shared handle to an id generator
pub type SharedIdGenerator = Arc<dyn IdGenerator>;

/// Time-ordered UUID v7 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

/// Deterministic `<prefix>-<n>` ids, starting at 1
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

/// Default generator used when none is injected
pub fn default_generator() -> SharedIdGenerator {
    Arc::new(UuidGenerator)
}
