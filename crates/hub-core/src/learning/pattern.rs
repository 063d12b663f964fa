//! Fix patterns
//!
//! A fix pattern is keyed by its failure type plus a hash of the normalized
//! error text, so errors differing only in line numbers, counters or casing
//! collapse onto one pattern.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum normalized error length that takes part in hashing
pub const NORMALIZED_PREFIX_LEN: usize = 200;

/// Hex characters of the hash kept in a pattern id
const HASH_PREFIX_LEN: usize = 16;

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(line|ln|col|column)\s*:?\s*\d+").expect("location regex is valid")
});
static POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+(:\d+)?").expect("position regex is valid"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit regex is valid"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Kind of change a fix applied to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFix {
    pub file: String,
    pub description: String,
    pub change_type: ChangeType,
}

/// A generalized error signature and the fix that resolved it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixPattern {
    pub id: String,
    pub failure_type: String,
    pub error_pattern: String,
    pub applied_fix: Vec<AppliedFix>,
    pub confidence: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl FixPattern {
    /// A pattern learned from its first successful fix
    pub fn learned(failure_type: &str, error_message: &str, applied_fix: Vec<AppliedFix>) -> Self {
        let now = Utc::now();
        let error_pattern = normalize_error(error_message);
        Self {
            id: pattern_id_for_normalized(failure_type, &error_pattern),
            failure_type: failure_type.to_string(),
            error_pattern,
            applied_fix,
            confidence: laplace_confidence(1, 0),
            success_count: 1,
            failure_count: 0,
            last_used: now,
            created_at: now,
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.last_used = Utc::now();
        self.confidence = laplace_confidence(self.success_count, self.failure_count);
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_used = Utc::now();
        self.confidence = laplace_confidence(self.success_count, self.failure_count);
    }

    /// One-line summary of the fix
    pub fn fix_summary(&self) -> String {
        if self.applied_fix.is_empty() {
            return "no recorded changes".to_string();
        }
        self.applied_fix
            .iter()
            .map(|f| format!("{} {}: {}", f.change_type.as_str(), f.file, f.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Strip the volatile parts of an error message
///
/// Line/column markers and digit runs become `N`, whitespace collapses, the
/// text is lower-cased and cut to a bounded prefix.
pub fn normalize_error(error: &str) -> String {
    let lowered = error.to_lowercase();
    let located = LOCATION.replace_all(&lowered, "$1 N");
    let positioned = POSITION.replace_all(&located, ":N");
    let digitless = DIGITS.replace_all(&positioned, "N");
    let collapsed = WHITESPACE.replace_all(digitless.trim(), " ");
    collapsed.chars().take(NORMALIZED_PREFIX_LEN).collect()
}

/// Stable id for a failure type and raw error message
pub fn pattern_id(failure_type: &str, error: &str) -> String {
    pattern_id_for_normalized(failure_type, &normalize_error(error))
}

fn pattern_id_for_normalized(failure_type: &str, normalized: &str) -> String {
    let digest = hex::encode(Sha256::digest(normalized.as_bytes()));
    format!("{}-{}", failure_type, &digest[..HASH_PREFIX_LEN])
}

/// `(successes + 1) / (successes + failures + 2)`
pub fn laplace_confidence(successes: u64, failures: u64) -> f64 {
    (successes as f64 + 1.0) / ((successes + failures) as f64 + 2.0)
}

fn tokens(text: &str) -> HashSet<&str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect()
}

/// Jaccard overlap of the word tokens of two normalized errors
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (tokens(a), tokens(b));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let total = a.union(&b).count() as f64;
    shared / total
}
