//! Learning from remediation attempts
//!
//! ```text
//! FixAttempt ──► LearningEngine ──► attempt log (ring buffer, 10k)
//!                     │         └─► metrics (per type, velocity)
//!                     ▼
//!               FixPattern (failure type + normalized error hash)
//!                     │
//!                     └─► long-term memory (tag "fix-pattern")
//! ```

pub mod attempt;
pub mod engine;
pub mod metrics;
pub mod pattern;

// Re-exports
pub use attempt::FixAttempt;
pub use engine::{LearningEngine, LearningSnapshot, SimilarPattern};
pub use metrics::{FailureTypeStats, LearningMetrics};
pub use pattern::{AppliedFix, ChangeType, FixPattern, laplace_confidence, normalize_error, pattern_id};
