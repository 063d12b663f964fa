//! Request Router
//!
//! Classifies a request's intent by keyword counting and picks the agents
//! that should handle it. Routing is a pure function of the request and an
//! agent snapshot; it never touches the registry directly.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::agents::{AgentStatus, AgentType, SubAgent};
use crate::types::Request;

/// Upper bound on agents per selection group
pub const MAX_AGENTS_PER_GROUP: usize = 2;

/// Fixed framing overhead added to every token estimate
pub const TOKEN_OVERHEAD: u64 = 500;

/// Intent name used when no keyword matches
pub const GENERAL_INTENT: &str = "general";

/// Catalog entry: an intent, the phrases that signal it, and what it needs
#[derive(Debug, Clone, Copy)]
pub struct IntentDefinition {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub agent_type: AgentType,
    pub capabilities: &'static [&'static str],
}

/// Intent catalog. Order breaks score ties.
pub const INTENT_CATALOG: &[IntentDefinition] = &[
    IntentDefinition {
        name: "security",
        keywords: &[
            "security", "vulnerab", "exploit", "injection", "xss", "csrf", "cve", "credential",
            "secret", "sanitiz",
        ],
        agent_type: AgentType::Validator,
        capabilities: &["security-scan", "code-analysis"],
    },
    IntentDefinition {
        name: "code-review",
        keywords: &["review", "code quality", "lint", "best practice", "code smell", "pull request"],
        agent_type: AgentType::Validator,
        capabilities: &["code-review", "code-analysis"],
    },
    IntentDefinition {
        name: "documentation",
        keywords: &["document", "docs", "readme", "explain", "docstring", "tutorial"],
        agent_type: AgentType::Knowledge,
        capabilities: &["documentation", "knowledge-retrieval"],
    },
    IntentDefinition {
        name: "build",
        keywords: &["build", "compile", "bundle", "deploy", "dependency", "dependencies"],
        agent_type: AgentType::Task,
        capabilities: &["build", "task-execution"],
    },
    IntentDefinition {
        name: "test",
        keywords: &["test", "coverage", "assert", "mock", "flaky"],
        agent_type: AgentType::Task,
        capabilities: &["testing", "task-execution"],
    },
    IntentDefinition {
        name: "refactor",
        keywords: &["refactor", "restructure", "clean up", "simplify", "rename", "extract"],
        agent_type: AgentType::Task,
        capabilities: &["refactoring", "code-analysis"],
    },
];

/// Agent type and required capabilities for an intent name
pub fn intent_requirements(intent: &str) -> (AgentType, &'static [&'static str]) {
    INTENT_CATALOG
        .iter()
        .find(|d| d.name == intent)
        .map(|d| (d.agent_type, d.capabilities))
        .unwrap_or((AgentType::Dynamic, &[]))
}

/// Result of intent classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub primary: String,
    pub confidence: f64,
    /// Remaining matched intents, highest score first
    pub secondary: Vec<String>,
}

/// Score every catalog intent against the prompt
pub fn classify_intent(prompt: &str) -> IntentClassification {
    let lower = prompt.to_lowercase();

    let mut scored: Vec<(&'static str, usize)> = INTENT_CATALOG
        .iter()
        .map(|d| {
            let score = d.keywords.iter().map(|k| lower.matches(k).count()).sum();
            (d.name, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    if scored.is_empty() {
        return IntentClassification {
            primary: GENERAL_INTENT.to_string(),
            confidence: 0.5,
            secondary: vec![],
        };
    }

    // Stable sort keeps catalog order among equal scores
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let total: usize = scored.iter().map(|(_, s)| s).sum();
    let (primary, top) = scored[0];

    IntentClassification {
        primary: primary.to_string(),
        confidence: top as f64 / total as f64,
        secondary: scored[1..].iter().map(|(name, _)| name.to_string()).collect(),
    }
}

/// Which agents handle a request, and what memory to pull for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub primary_agent_ids: Vec<String>,
    pub secondary_agent_ids: Vec<String>,
    pub memory_queries: Vec<String>,
    pub estimated_tokens: u64,
    pub reasoning: String,
    pub intent: IntentClassification,
}

impl RoutingDecision {
    /// Primary then secondary agent ids
    pub fn all_agent_ids(&self) -> impl Iterator<Item = &String> {
        self.primary_agent_ids.iter().chain(self.secondary_agent_ids.iter())
    }
}

/// Stateless request router
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestRouter;

impl RequestRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route a request against a snapshot of the registered agents
    pub fn route(&self, request: &Request, agents: &[SubAgent]) -> RoutingDecision {
        let intent = classify_intent(&request.prompt);
        let (primary_type, required) = intent_requirements(&intent.primary);

        let options = request.options.clone().unwrap_or_default();
        let excluded: HashSet<&str> = options.exclude_agents.iter().map(String::as_str).collect();
        let preferred: HashSet<&str> = options.preferred_agents.iter().map(String::as_str).collect();

        let eligible = agents
            .iter()
            .filter(|a| !excluded.contains(a.id.as_str()) && a.status != AgentStatus::Disconnected);
        let (mut ordered, others): (Vec<&SubAgent>, Vec<&SubAgent>) =
            eligible.partition(|a| preferred.contains(a.id.as_str()));
        ordered.extend(others);

        let mut primary: Vec<&SubAgent> = ordered
            .iter()
            .copied()
            .filter(|a| a.agent_type == primary_type)
            .take(MAX_AGENTS_PER_GROUP)
            .collect();
        let used_fallback = primary.is_empty() && !required.is_empty();
        if primary.is_empty() {
            primary = ordered
                .iter()
                .copied()
                .filter(|a| a.has_any_capability(required.iter().copied()))
                .take(MAX_AGENTS_PER_GROUP)
                .collect();
        }

        let secondary_types: HashSet<AgentType> = intent
            .secondary
            .iter()
            .map(|name| intent_requirements(name).0)
            .collect();
        let secondary: Vec<&SubAgent> = ordered
            .iter()
            .copied()
            .filter(|a| secondary_types.contains(&a.agent_type))
            .filter(|a| !primary.iter().any(|p| p.id == a.id))
            .take(MAX_AGENTS_PER_GROUP)
            .collect();

        let memory_queries = memory_queries(request, required);
        let estimated_tokens = estimate_tokens(request);

        let reasoning = format!(
            "Intent '{}' (confidence {:.2}); selected {} primary{} and {} secondary agent(s)",
            intent.primary,
            intent.confidence,
            primary.len(),
            if used_fallback { " via capability fallback" } else { "" },
            secondary.len(),
        );

        debug!(
            request_id = %request.id,
            intent = %intent.primary,
            primary = primary.len(),
            secondary = secondary.len(),
            estimated_tokens,
            "Routed request"
        );

        RoutingDecision {
            primary_agent_ids: primary.iter().map(|a| a.id.clone()).collect(),
            secondary_agent_ids: secondary.iter().map(|a| a.id.clone()).collect(),
            memory_queries,
            estimated_tokens,
            reasoning,
            intent,
        }
    }
}

fn memory_queries(request: &Request, required: &[&str]) -> Vec<String> {
    let mut queries = vec![request.prompt.clone()];
    queries.extend(required.iter().map(|c| format!("{} patterns", c)));

    if let Some(context) = &request.context {
        if let Some(project) = &context.project_path {
            queries.push(format!("project:{}", project));
        }
        if let Some(file) = &context.current_file {
            queries.push(format!("file:{}", file));
        }
    }
    queries
}

/// `ceil(prompt/4) + ceil(context_json/4) + overhead`
pub fn estimate_tokens(request: &Request) -> u64 {
    let prompt_len = request.prompt.chars().count() as u64;
    let context_len = request
        .context
        .as_ref()
        .and_then(|c| serde_json::to_string(c).ok())
        .map(|s| s.chars().count() as u64)
        .unwrap_or(0);
    prompt_len.div_ceil(4) + context_len.div_ceil(4) + TOKEN_OVERHEAD
}
