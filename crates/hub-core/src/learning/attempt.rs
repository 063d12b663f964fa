use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::AppliedFix;

fn first_attempt() -> u32 {
    1
}

/// One remediation attempt reported to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    /// Assigned by the engine when empty
    #[serde(default)]
    pub id: String,
    pub failure_type: String,
    pub error_message: String,
    #[serde(default)]
    pub fixes: Vec<AppliedFix>,
    pub success: bool,
    /// 1 for the first try at this failure, 2 for the retry, ...
    #[serde(default = "first_attempt")]
    pub attempt_number: u32,
    /// Pattern the fix was taken from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl FixAttempt {
    pub fn new(failure_type: impl Into<String>, error_message: impl Into<String>, success: bool) -> Self {
        Self {
            id: String::new(),
            failure_type: failure_type.into(),
            error_message: error_message.into(),
            fixes: Vec::new(),
            success,
            attempt_number: 1,
            pattern_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_fixes(mut self, fixes: Vec<AppliedFix>) -> Self {
        self.fixes = fixes;
        self
    }

    pub fn with_attempt_number(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number.max(1);
        self
    }

    pub fn with_pattern(mut self, pattern_id: impl Into<String>) -> Self {
        self.pattern_id = Some(pattern_id.into());
        self
    }
}
