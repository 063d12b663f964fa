//! Learning engine
//!
//! Records remediation attempts, turns successful fixes into reusable
//! patterns and suggests them for similar errors.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::attempt::FixAttempt;
use super::metrics::{LearningMetrics, VELOCITY_WINDOW, learning_velocity};
use super::pattern::{FixPattern, normalize_error, pattern_id, token_similarity};
use crate::events::{EventBus, HubEvent};
use crate::ids::{SharedIdGenerator, default_generator};
use crate::memory::{MemoryKind, MemoryMetadata, NewMemory, SearchFilter, TieredMemory};
use crate::ring::RingBuffer;
use crate::Result;

/// Attempts kept in process memory
pub const MAX_ATTEMPTS: usize = 10_000;

/// Attempts included in an export
pub const EXPORT_ATTEMPTS: usize = 1_000;

/// Patterns prepended by `build_enhanced_prompt`
pub const PROMPT_PATTERNS: usize = 3;

pub const DEFAULT_MIN_PATTERN_CONFIDENCE: f64 = 0.3;

/// Tag carried by every pattern written to long-term memory
pub const PATTERN_TAG: &str = "fix-pattern";

const ERROR_EXCERPT_LEN: usize = 120;

/// Long-term entries fetched per similarity lookup
const REMEMBERED_PATTERN_LIMIT: usize = 100;

/// A stored pattern ranked against an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPattern {
    pub pattern: FixPattern,
    pub similarity: f64,
    /// `similarity * confidence`
    pub score: f64,
}

/// Everything needed to restore an engine elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    pub patterns: Vec<FixPattern>,
    pub attempts: Vec<FixAttempt>,
    pub metrics: LearningMetrics,
    pub exported_at: DateTime<Utc>,
}

impl LearningSnapshot {
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

struct LearningState {
    attempts: RingBuffer<FixAttempt>,
    patterns: HashMap<String, FixPattern>,
    metrics: LearningMetrics,
}

impl LearningState {
    fn refresh_derived(&mut self) {
        let recent: Vec<&FixAttempt> = self.attempts.recent(VELOCITY_WINDOW).collect();
        self.metrics.learning_velocity = learning_velocity(&recent);
        self.metrics.patterns_learned = self.patterns.len();
    }
}

pub struct LearningEngine {
    state: RwLock<LearningState>,
    memory: Option<Arc<TieredMemory>>,
    events: EventBus,
    ids: SharedIdGenerator,
    min_pattern_confidence: f64,
}

impl LearningEngine {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: RwLock::new(LearningState {
                attempts: RingBuffer::new(MAX_ATTEMPTS),
                patterns: HashMap::new(),
                metrics: LearningMetrics::default(),
            }),
            memory: None,
            events,
            ids: default_generator(),
            min_pattern_confidence: DEFAULT_MIN_PATTERN_CONFIDENCE,
        }
    }

    /// Persist patterns to, and look them up in, long-term memory
    pub fn with_memory(mut self, memory: Arc<TieredMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_id_generator(mut self, ids: SharedIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_min_pattern_confidence(mut self, min: f64) -> Self {
        self.min_pattern_confidence = min.clamp(0.0, 1.0);
        self
    }

    /// Log an attempt and learn from it
    ///
    /// A successful attempt with fixes creates or reinforces the pattern for
    /// its error signature, which is returned. A failed attempt that names
    /// the pattern it followed counts against that pattern.
    pub async fn record_fix_attempt(&self, mut attempt: FixAttempt) -> Option<FixPattern> {
        if attempt.id.is_empty() {
            attempt.id = self.ids.next_id();
        }

        let (learned, reinforced) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.metrics.record(&attempt);

            let outcome = if attempt.success && !attempt.fixes.is_empty() {
                let id = pattern_id(&attempt.failure_type, &attempt.error_message);
                match state.patterns.get_mut(&id) {
                    Some(existing) => {
                        existing.record_success();
                        (Some(existing.clone()), true)
                    }
                    None => {
                        let pattern =
                            FixPattern::learned(&attempt.failure_type, &attempt.error_message, attempt.fixes.clone());
                        state.patterns.insert(pattern.id.clone(), pattern.clone());
                        (Some(pattern), false)
                    }
                }
            } else {
                (None, false)
            };

            state.attempts.push(attempt.clone());
            state.refresh_derived();
            outcome
        };

        debug!(
            attempt_id = %attempt.id,
            failure_type = %attempt.failure_type,
            success = attempt.success,
            "Recorded fix attempt"
        );
        self.events.publish(HubEvent::FixAttemptRecorded {
            attempt_id: attempt.id.clone(),
            failure_type: attempt.failure_type.clone(),
            success: attempt.success,
        });

        if !attempt.success {
            if let Some(pattern_id) = &attempt.pattern_id {
                self.record_pattern_failure(pattern_id).await;
            }
        }

        if let Some(pattern) = &learned {
            info!(
                pattern_id = %pattern.id,
                confidence = pattern.confidence,
                reinforced,
                "Learned fix pattern"
            );
            self.events.publish(HubEvent::PatternLearned {
                pattern_id: pattern.id.clone(),
                failure_type: pattern.failure_type.clone(),
                confidence: pattern.confidence,
                reinforced,
            });
            self.persist(pattern).await;
        }

        learned
    }

    /// Count a failed reuse against a pattern
    pub async fn record_pattern_failure(&self, id: &str) -> Option<FixPattern> {
        let updated = {
            let mut state = self.state.write();
            let pattern = state.patterns.get_mut(id)?;
            pattern.record_failure();
            pattern.clone()
        };
        debug!(pattern_id = id, confidence = updated.confidence, "Recorded pattern failure");
        self.persist(&updated).await;
        Some(updated)
    }

    /// Patterns for this failure type ranked by similarity times confidence
    pub async fn find_similar_patterns(&self, failure_type: &str, error_text: &str, limit: usize) -> Vec<SimilarPattern> {
        let normalized = normalize_error(error_text);

        let mut ranked: Vec<SimilarPattern> = {
            let state = self.state.read();
            state
                .patterns
                .values()
                .filter(|p| p.failure_type == failure_type)
                .filter_map(|p| self.rank(p, &normalized))
                .collect()
        };

        for pattern in self.remembered_patterns(failure_type).await {
            if ranked.iter().any(|r| r.pattern.id == pattern.id) {
                continue;
            }
            if let Some(similar) = self.rank(&pattern, &normalized) {
                ranked.push(similar);
            }
        }

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);
        ranked
    }

    fn rank(&self, pattern: &FixPattern, normalized: &str) -> Option<SimilarPattern> {
        if pattern.confidence < self.min_pattern_confidence {
            return None;
        }
        let similarity = token_similarity(normalized, &pattern.error_pattern);
        (similarity > 0.0).then(|| SimilarPattern {
            score: similarity * pattern.confidence,
            similarity,
            pattern: pattern.clone(),
        })
    }

    async fn remembered_patterns(&self, failure_type: &str) -> Vec<FixPattern> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        let filter = SearchFilter::default()
            .with_kinds(vec![MemoryKind::LongTerm])
            .with_tags([PATTERN_TAG, failure_type]);

        memory
            .search("", REMEMBERED_PATTERN_LIMIT, &filter)
            .await
            .into_iter()
            .filter_map(|entry| match serde_json::from_str::<FixPattern>(&entry.content) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(memory_id = %entry.id, error = %e, "Skipping unreadable fix pattern");
                    None
                }
            })
            .collect()
    }

    async fn persist(&self, pattern: &FixPattern) {
        let Some(memory) = &self.memory else {
            return;
        };
        let content = match serde_json::to_string(pattern) {
            Ok(content) => content,
            Err(e) => {
                warn!(pattern_id = %pattern.id, error = %e, "Failed to serialize fix pattern");
                return;
            }
        };
        let input = NewMemory {
            id: Some(format!("fix-pattern:{}", pattern.id)),
            kind: MemoryKind::LongTerm,
            content,
            metadata: MemoryMetadata::default()
                .with_source("learning-engine")
                .with_relevance(pattern.confidence)
                .with_tags([PATTERN_TAG, pattern.failure_type.as_str()]),
        };
        if let Err(e) = memory.store(input).await {
            warn!(pattern_id = %pattern.id, error = %e, "Failed to persist fix pattern");
        }
    }

    /// Prepend the best matching patterns to `prompt`; unchanged if none match
    pub async fn build_enhanced_prompt(&self, prompt: &str, failure_type: &str, error_text: &str) -> String {
        let similar = self.find_similar_patterns(failure_type, error_text, PROMPT_PATTERNS).await;
        if similar.is_empty() {
            return prompt.to_string();
        }

        let mut enhanced = String::from("## Previously successful fixes for similar errors\n\n");
        for (i, s) in similar.iter().enumerate() {
            let excerpt: String = s.pattern.error_pattern.chars().take(ERROR_EXCERPT_LEN).collect();
            enhanced.push_str(&format!(
                "{}. Error: {}\n   Fix: {}\n   Confidence: {:.0}%\n\n",
                i + 1,
                excerpt,
                s.pattern.fix_summary(),
                s.pattern.confidence * 100.0
            ));
        }
        enhanced.push_str("---\n\n");
        enhanced.push_str(prompt);
        enhanced
    }

    pub fn metrics(&self) -> LearningMetrics {
        self.state.read().metrics.clone()
    }

    pub fn get_pattern(&self, id: &str) -> Option<FixPattern> {
        self.state.read().patterns.get(id).cloned()
    }

    /// Every local pattern, most confident first
    pub fn patterns(&self) -> Vec<FixPattern> {
        let mut patterns: Vec<FixPattern> = self.state.read().patterns.values().cloned().collect();
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.id.cmp(&b.id)));
        patterns
    }

    pub fn attempt_count(&self) -> usize {
        self.state.read().attempts.len()
    }

    pub fn export(&self) -> LearningSnapshot {
        let state = self.state.read();
        let mut patterns: Vec<FixPattern> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.id.cmp(&b.id));
        LearningSnapshot {
            patterns,
            attempts: state.attempts.recent(EXPORT_ATTEMPTS).cloned().collect(),
            metrics: state.metrics.clone(),
            exported_at: Utc::now(),
        }
    }

    /// Merge a snapshot into this engine; imported patterns win on conflict
    pub fn import(&self, snapshot: LearningSnapshot) {
        let mut state = self.state.write();
        let pattern_count = snapshot.patterns.len();
        let attempt_count = snapshot.attempts.len();

        for pattern in snapshot.patterns {
            state.patterns.insert(pattern.id.clone(), pattern);
        }
        state.attempts.extend(snapshot.attempts);
        state.metrics = snapshot.metrics;
        state.refresh_derived();

        info!(patterns = pattern_count, attempts = attempt_count, "Imported learning snapshot");
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use crate::learning::pattern::{AppliedFix, ChangeType};
    use crate::memory::InMemoryKvStore;
    use crate::memory::short_term::DEFAULT_TTL;
    use tempfile::TempDir;

    fn fixes() -> Vec<AppliedFix> {
        vec![AppliedFix {
            file: "src/db.rs".into(),
            description: "Wrap pool in Arc".into(),
            change_type: ChangeType::Modify,
        }]
    }

    fn success(error: &str) -> FixAttempt {
        FixAttempt::new("compile", error, true).with_fixes(fixes())
    }

    fn engine() -> LearningEngine {
        LearningEngine::new(EventBus::default()).with_id_generator(Arc::new(SequentialIdGenerator::new("attempt")))
    }

    fn memory() -> Arc<TieredMemory> {
        Arc::new(TieredMemory::new(
            Arc::new(InMemoryKvStore::new()),
            DEFAULT_TTL,
            Arc::new(SequentialIdGenerator::new("mem")),
        ))
    }

    #[tokio::test]
    async fn test_success_learns_then_reinforces() {
        let engine = engine();
        let first = engine
            .record_fix_attempt(success("borrowed value does not live long enough at line 12"))
            .await
            .unwrap();
        assert!((first.confidence - 2.0 / 3.0).abs() < 1e-12);

        let second = engine
            .record_fix_attempt(success("borrowed value does not live long enough at line 40"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.success_count, 2);
        assert_eq!(engine.metrics().patterns_learned, 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_learn() {
        let engine = engine();
        assert!(
            engine
                .record_fix_attempt(FixAttempt::new("compile", "boom", false).with_fixes(fixes()))
                .await
                .is_none()
        );
        assert!(engine.record_fix_attempt(FixAttempt::new("compile", "boom", true)).await.is_none());
        assert_eq!(engine.metrics().total_attempts, 2);
        assert!(engine.patterns().is_empty());
    }

    #[tokio::test]
    async fn test_pattern_failure_lowers_confidence() {
        let engine = engine();
        let pattern = engine.record_fix_attempt(success("type mismatch")).await.unwrap();

        engine
            .record_fix_attempt(FixAttempt::new("compile", "type mismatch", false).with_pattern(&pattern.id))
            .await;
        let updated = engine.get_pattern(&pattern.id).unwrap();
        assert_eq!(updated.failure_count, 1);
        assert_eq!(updated.confidence, 0.5);

        assert!(engine.record_pattern_failure("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_attempt_log_is_capped() {
        let engine = engine();
        for _ in 0..(MAX_ATTEMPTS + 5) {
            engine.record_fix_attempt(FixAttempt::new("lint", "unused", false)).await;
        }
        assert_eq!(engine.attempt_count(), MAX_ATTEMPTS);
        assert_eq!(engine.metrics().total_attempts as usize, MAX_ATTEMPTS + 5);
    }

    #[tokio::test]
    async fn test_velocity_tracks_recent_attempts() {
        let engine = engine();
        for i in 0..20 {
            engine.record_fix_attempt(FixAttempt::new("test", "flaky", i >= 10)).await;
        }
        assert!((engine.metrics().learning_velocity - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_find_similar_patterns() {
        let engine = engine();
        engine
            .record_fix_attempt(success("cannot borrow `pool` as mutable"))
            .await;
        engine
            .record_fix_attempt(
                FixAttempt::new("test", "cannot borrow `pool` as mutable", true).with_fixes(fixes()),
            )
            .await;

        let similar = engine
            .find_similar_patterns("compile", "cannot borrow `conn` as mutable", 5)
            .await;
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].pattern.failure_type, "compile");
        assert!(similar[0].similarity > 0.5);

        assert!(engine.find_similar_patterns("compile", "zzz qqq", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_min_confidence_filters_patterns() {
        let engine = engine().with_min_pattern_confidence(0.9);
        engine.record_fix_attempt(success("segfault in ffi")).await;
        assert!(engine.find_similar_patterns("compile", "segfault in ffi", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_patterns_shared_through_memory() {
        let memory = memory();
        let origin = engine().with_memory(memory.clone());
        origin.record_fix_attempt(success("undefined symbol foo_init")).await;

        let fresh = engine().with_memory(memory);
        let similar = fresh
            .find_similar_patterns("compile", "undefined symbol foo_init", 3)
            .await;
        assert_eq!(similar.len(), 1);
        assert!(fresh.patterns().is_empty());
    }

    #[tokio::test]
    async fn test_build_enhanced_prompt() {
        let engine = engine();
        assert_eq!(
            engine.build_enhanced_prompt("Fix it", "compile", "linker error").await,
            "Fix it"
        );

        engine.record_fix_attempt(success("linker error: missing -lssl")).await;
        let prompt = engine
            .build_enhanced_prompt("Fix it", "compile", "linker error: missing -lcrypto")
            .await;
        assert!(prompt.starts_with("## Previously successful fixes"));
        assert!(prompt.contains("Wrap pool in Arc"));
        assert!(prompt.contains("Confidence: 67%"));
        assert!(prompt.ends_with("Fix it"));
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("learning/snapshot.json");

        let engine = engine();
        engine.record_fix_attempt(success("missing trait bound Send")).await;
        engine.record_fix_attempt(FixAttempt::new("compile", "other", false)).await;
        engine.export().write_to(&path).unwrap();

        let restored = LearningEngine::new(EventBus::default());
        restored.import(LearningSnapshot::read_from(&path).unwrap());

        assert_eq!(restored.patterns(), engine.patterns());
        assert_eq!(restored.attempt_count(), 2);
        assert_eq!(restored.metrics().total_attempts, 2);
        assert_eq!(restored.metrics().patterns_learned, 1);
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let engine = LearningEngine::new(bus);
        engine.record_fix_attempt(success("E0382 use of moved value")).await;

        assert!(matches!(rx.try_recv().unwrap(), HubEvent::FixAttemptRecorded { success: true, .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            HubEvent::PatternLearned { reinforced: false, .. }
        ));
    }
}
