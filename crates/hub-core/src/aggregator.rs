//! Result Aggregator
//!
//! Fuses the answers of several sub-agents into one response.
//! - concatenate: every answer, labelled by agent
//! - best-score: the single most confident answer
//! - consensus: answers at or above mean confidence
//! - weighted: answers ranked by confidence and speed, kept until 80% of the
//!   total weight is covered

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::agents::{AgentType, SubAgentResult};
use crate::ids::{SharedIdGenerator, default_generator};
use crate::types::{Response, ResponseMetadata};

/// Content returned when no sub-agent produced a result
pub const EMPTY_RESPONSE_CONTENT: &str = "No results available from any sub-agent.";

/// Separator between agent sections
pub const SECTION_DELIMITER: &str = "\n\n---\n\n";

/// Share of total weight the weighted strategy accumulates before stopping
pub const WEIGHT_COVERAGE: f64 = 0.8;

/// Confidence spread among validators that counts as disagreement
pub const CONFLICT_THRESHOLD: f64 = 0.3;

/// Default execution-time ceiling for the weighted strategy
pub const DEFAULT_MAX_EXECUTION_TIME_MS: u64 = 30_000;

/// Strategy for aggregating results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationStrategy {
    Concatenate,
    BestScore,
    Consensus,
    #[default]
    Weighted,
}

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Concatenate => "concatenate",
            Self::BestScore => "best-score",
            Self::Consensus => "consensus",
            Self::Weighted => "weighted",
        };
        f.write_str(s)
    }
}

impl FromStr for AggregationStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concatenate" => Ok(Self::Concatenate),
            "best-score" | "best_score" => Ok(Self::BestScore),
            "consensus" => Ok(Self::Consensus),
            "weighted" => Ok(Self::Weighted),
            other => Err(crate::Error::Config(format!("Unknown aggregation strategy: {}", other))),
        }
    }
}

/// Validators that disagree beyond the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub spread: f64,
    pub agent_ids: Vec<String>,
}

/// Result aggregator for combining sub-agent results
pub struct ResultAggregator {
    ids: SharedIdGenerator,
    max_execution_time_ms: u64,
}

impl ResultAggregator {
    pub fn new(ids: SharedIdGenerator, max_execution_time_ms: u64) -> Self {
        Self {
            ids,
            max_execution_time_ms: max_execution_time_ms.max(1),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_generator(), DEFAULT_MAX_EXECUTION_TIME_MS)
    }

    /// Combine `results` into one response for `request_id`
    pub fn aggregate(
        &self,
        request_id: &str,
        results: Vec<SubAgentResult>,
        strategy: AggregationStrategy,
    ) -> Response {
        let content = if results.is_empty() {
            EMPTY_RESPONSE_CONTENT.to_string()
        } else {
            match strategy {
                AggregationStrategy::Concatenate => concatenate(&results),
                AggregationStrategy::BestScore => best_score(&results),
                AggregationStrategy::Consensus => consensus(&results),
                AggregationStrategy::Weighted => self.weighted(&results),
            }
        };

        let metadata = ResponseMetadata {
            total_tokens_used: results.iter().map(|r| r.tokens_used).sum(),
            total_execution_time_ms: results.iter().map(|r| r.execution_time_ms).max().unwrap_or(0),
            agents_invoked: results.len(),
            memory_retrievals: 0,
            cached: false,
        };

        debug!(
            request_id,
            %strategy,
            agents = results.len(),
            "Aggregated sub-agent results"
        );

        Response {
            id: self.ids.next_id(),
            request_id: request_id.to_string(),
            content,
            sub_agent_results: results,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// `0.7 * confidence + 0.3 * (1 - time / max_time)`
    pub fn weight(&self, result: &SubAgentResult) -> f64 {
        let time_ratio = (result.execution_time_ms as f64 / self.max_execution_time_ms as f64).min(1.0);
        0.7 * result.confidence + 0.3 * (1.0 - time_ratio)
    }

    fn weighted(&self, results: &[SubAgentResult]) -> String {
        let mut ranked: Vec<(f64, &SubAgentResult)> = results.iter().map(|r| (self.weight(r), r)).collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let total: f64 = ranked.iter().map(|(w, _)| w).sum();
        let threshold = total * WEIGHT_COVERAGE;

        let mut selected = Vec::new();
        let mut cumulative = 0.0;
        for (weight, result) in ranked {
            selected.push(result);
            cumulative += weight;
            if cumulative >= threshold {
                break;
            }
        }
        join_sections(&selected)
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn concatenate(results: &[SubAgentResult]) -> String {
    results
        .iter()
        .map(labelled)
        .collect::<Vec<_>>()
        .join(SECTION_DELIMITER)
}

fn best_score(results: &[SubAgentResult]) -> String {
    results
        .iter()
        .reduce(|best, r| if r.confidence > best.confidence { r } else { best })
        .map(|r| r.content.clone())
        .unwrap_or_default()
}

fn consensus(results: &[SubAgentResult]) -> String {
    let mean = results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;
    let survivors: Vec<&SubAgentResult> = results
        .iter()
        .filter(|r| r.confidence + f64::EPSILON >= mean)
        .collect();
    join_sections(&survivors)
}

/// A single section is returned as-is; several are labelled and delimited
fn join_sections(sections: &[&SubAgentResult]) -> String {
    match sections {
        [] => String::new(),
        [only] => only.content.clone(),
        many => many
            .iter()
            .map(|r| labelled(r))
            .collect::<Vec<_>>()
            .join(SECTION_DELIMITER),
    }
}

fn labelled(result: &SubAgentResult) -> String {
    format!("## {}\n{}", result.agent_name, result.content)
}

/// Flag validators whose confidences spread by more than the threshold
pub fn detect_conflicts(results: &[SubAgentResult]) -> Option<ConflictReport> {
    let validators: Vec<&SubAgentResult> = results
        .iter()
        .filter(|r| r.agent_type == AgentType::Validator)
        .collect();
    if validators.len() < 2 {
        return None;
    }

    let max = validators.iter().map(|r| r.confidence).fold(f64::MIN, f64::max);
    let min = validators.iter().map(|r| r.confidence).fold(f64::MAX, f64::min);
    let spread = max - min;

    (spread > CONFLICT_THRESHOLD).then(|| ConflictReport {
        spread,
        agent_ids: validators.iter().map(|r| r.agent_id.clone()).collect(),
    })
}
