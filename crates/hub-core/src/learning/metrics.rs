//! Learning metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::attempt::FixAttempt;

/// Attempts considered when measuring learning velocity
pub const VELOCITY_WINDOW: usize = 100;

/// Below this many attempts velocity is reported as 0
pub const VELOCITY_MIN_ATTEMPTS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureTypeStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
}

impl FailureTypeStats {
    fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.success_rate = self.successes as f64 / self.attempts as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub success_rate: f64,
    pub by_failure_type: BTreeMap<String, FailureTypeStats>,
    /// Mean attempt number over successful attempts
    pub average_attempts_to_success: f64,
    /// Success rate of the newer half of the window minus the older half
    pub learning_velocity: f64,
    pub patterns_learned: usize,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    attempts_to_success_sum: u64,
}

impl Default for LearningMetrics {
    fn default() -> Self {
        Self {
            total_attempts: 0,
            successful_attempts: 0,
            success_rate: 0.0,
            by_failure_type: BTreeMap::new(),
            average_attempts_to_success: 0.0,
            learning_velocity: 0.0,
            patterns_learned: 0,
            updated_at: Utc::now(),
            attempts_to_success_sum: 0,
        }
    }
}

impl LearningMetrics {
    /// Fold one attempt into the counters
    pub fn record(&mut self, attempt: &FixAttempt) {
        self.total_attempts += 1;
        if attempt.success {
            self.successful_attempts += 1;
            self.attempts_to_success_sum += u64::from(attempt.attempt_number);
            self.average_attempts_to_success =
                self.attempts_to_success_sum as f64 / self.successful_attempts as f64;
        }
        self.success_rate = self.successful_attempts as f64 / self.total_attempts as f64;

        self.by_failure_type
            .entry(attempt.failure_type.clone())
            .or_default()
            .record(attempt.success);
        self.updated_at = Utc::now();
    }
}

fn success_rate<'a>(attempts: impl ExactSizeIterator<Item = &'a FixAttempt>) -> f64 {
    let total = attempts.len();
    if total == 0 {
        return 0.0;
    }
    let successes = attempts.filter(|a| a.success).count();
    successes as f64 / total as f64
}

/// Second-half minus first-half success rate over `recent`, oldest first
///
/// `recent` should already be cut to the velocity window.
pub fn learning_velocity(recent: &[&FixAttempt]) -> f64 {
    if recent.len() < VELOCITY_MIN_ATTEMPTS {
        return 0.0;
    }
    let (older, newer) = recent.split_at(recent.len() / 2);
    success_rate(newer.iter().copied()) - success_rate(older.iter().copied())
}
