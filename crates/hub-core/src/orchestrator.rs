//! Orchestrator
//!
//! Drives one request end to end:
//!
//! ```text
//! Request ─► route ─► memory lookup ─► prompt ─► dispatch (all agents) ─► aggregate ─► Response
//!                                                                              │
//!                                                          spawned memory write-back
//! ```

use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::agents::{AgentConfig, AgentRegistry, AgentType, SubAgent, SubAgentResult};
use crate::aggregator::{AggregationStrategy, DEFAULT_MAX_EXECUTION_TIME_MS, ResultAggregator, detect_conflicts};
use crate::config::Config;
use crate::events::{EventBus, HubEvent};
use crate::ids::{SharedIdGenerator, default_generator};
use crate::learning::LearningEngine;
use crate::memory::{MemoryEntry, MemoryKind, MemoryMetadata, NewMemory, SearchFilter, TieredMemory};
use crate::router::{RequestRouter, RoutingDecision};
use crate::types::{Request, Response};
use crate::{Error, Result};

/// Tool every sub-agent is expected to expose
pub const PROCESS_TOOL: &str = "process";

/// Memories pulled per routing query
pub const MEMORIES_PER_QUERY: usize = 3;

/// Mean confidence above which an exchange is kept in long-term memory
pub const LONG_TERM_CONFIDENCE: f64 = 0.85;

/// Confidence given to plain-text agent output
pub const DEFAULT_RESULT_CONFIDENCE: f64 = 0.8;

/// Context metadata keys that switch on fix-pattern hints
const FAILURE_TYPE_KEY: &str = "failure_type";
const ERROR_MESSAGE_KEY: &str = "error_message";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub token_tracking_enabled: bool,
    pub strategy: AggregationStrategy,
    /// Ceiling used by the weighted strategy
    pub max_execution_time_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            token_tracking_enabled: true,
            strategy: AggregationStrategy::default(),
            max_execution_time_ms: DEFAULT_MAX_EXECUTION_TIME_MS,
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            token_tracking_enabled: config.tokens.tracking_enabled,
            strategy: AggregationStrategy::default(),
            max_execution_time_ms: config.agents.timeout_ms,
        }
    }
}

/// Structured agent output
#[derive(Debug, Deserialize)]
struct AgentOutput {
    content: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "tokensUsed")]
    tokens_used: Option<u64>,
    #[serde(default, alias = "toolsUsed")]
    tools_used: Vec<String>,
}

/// Turn raw tool output into a result
///
/// A JSON object with a `content` field is unpacked; anything else is taken
/// as plain text with default confidence and an estimated token count.
pub fn interpret_output(agent: &SubAgent, raw: &str, execution_time_ms: u64) -> SubAgentResult {
    let parsed = serde_json::from_str::<AgentOutput>(raw.trim()).ok();
    let result = match parsed {
        Some(output) => {
            let tokens = output
                .tokens_used
                .unwrap_or_else(|| (output.content.chars().count() as u64).div_ceil(4));
            SubAgentResult::new(agent, output.content, output.confidence.unwrap_or(DEFAULT_RESULT_CONFIDENCE))
                .with_tokens(tokens)
                .with_tools(output.tools_used)
        }
        None => SubAgentResult::new(agent, raw, DEFAULT_RESULT_CONFIDENCE)
            .with_tokens((raw.chars().count() as u64).div_ceil(4)),
    };
    result.with_execution_time(execution_time_ms)
}

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    memory: Arc<TieredMemory>,
    learning: Arc<LearningEngine>,
    router: RequestRouter,
    aggregator: ResultAggregator,
    events: EventBus,
    settings: OrchestratorSettings,
    initialized: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        memory: Arc<TieredMemory>,
        learning: Arc<LearningEngine>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self::with_id_generator(registry, memory, learning, settings, default_generator())
    }

    pub fn with_id_generator(
        registry: Arc<AgentRegistry>,
        memory: Arc<TieredMemory>,
        learning: Arc<LearningEngine>,
        settings: OrchestratorSettings,
        ids: SharedIdGenerator,
    ) -> Self {
        let events = registry.events().clone();
        Self {
            aggregator: ResultAggregator::new(ids, settings.max_execution_time_ms),
            registry,
            memory,
            learning,
            router: RequestRouter::new(),
            events,
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    /// Register the given agents and accept requests
    ///
    /// Agents that cannot be registered are logged and skipped. Returns how
    /// many were registered.
    pub async fn initialize(&self, agents: Vec<AgentConfig>) -> usize {
        let mut registered = 0;
        for config in agents {
            let id = config.id.clone();
            match self.registry.register_agent(config).await {
                Ok(agent) => {
                    registered += 1;
                    debug!(agent_id = %agent.id, status = %agent.status, "Agent registered at startup");
                }
                Err(e) => error!(agent_id = %id, error = %e, "Failed to register agent"),
            }
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(registered, "Orchestrator initialized");
        registered
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Route, dispatch and aggregate one request
    pub async fn process_request(&self, request: Request) -> Result<Response> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let agents = self.registry.get_all_agents().await;
        let decision = self.router.route(&request, &agents);
        info!(
            request_id = %request.id,
            intent = %decision.intent.primary,
            reasoning = %decision.reasoning,
            "Processing request"
        );

        let memories = self.retrieve_memories(&decision).await;
        let prompt = self.build_prompt(&request, &memories).await;
        let results = self.dispatch(&request, &decision, &agents, &prompt).await;

        for result in results.iter().filter(|r| r.agent_type == AgentType::Validator) {
            self.events.publish(HubEvent::ValidatorResult {
                request_id: request.id.clone(),
                agent_id: result.agent_id.clone(),
                confidence: result.confidence,
            });
        }
        if let Some(conflict) = detect_conflicts(&results) {
            warn!(
                request_id = %request.id,
                spread = conflict.spread,
                agents = ?conflict.agent_ids,
                "Validators disagree"
            );
            self.events.publish(HubEvent::ConflictDetected {
                request_id: request.id.clone(),
                spread: conflict.spread,
                agent_ids: conflict.agent_ids,
            });
        }

        let mut response = self.aggregator.aggregate(&request.id, results, self.settings.strategy);
        response.metadata.memory_retrievals = memories.len();
        if !self.settings.token_tracking_enabled {
            response.metadata.total_tokens_used = 0;
        }

        self.spawn_write_back(&request, &decision, &response);

        info!(
            request_id = %request.id,
            response_id = %response.id,
            agents_invoked = response.metadata.agents_invoked,
            "Request completed"
        );
        Ok(response)
    }

    /// Run every routing query against memory, deduplicated by id
    async fn retrieve_memories(&self, decision: &RoutingDecision) -> Vec<MemoryEntry> {
        let filter = SearchFilter::default();
        let batches = join_all(
            decision
                .memory_queries
                .iter()
                .map(|q| self.memory.search(q, MEMORIES_PER_QUERY, &filter)),
        )
        .await;

        let mut seen = HashSet::new();
        batches
            .into_iter()
            .flatten()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect()
    }

    async fn build_prompt(&self, request: &Request, memories: &[MemoryEntry]) -> String {
        let mut prompt = request.prompt.clone();

        let failure = request.context.as_ref().and_then(|c| {
            let failure_type = c.metadata.get(FAILURE_TYPE_KEY)?.as_str()?;
            let error_message = c.metadata.get(ERROR_MESSAGE_KEY)?.as_str()?;
            Some((failure_type.to_string(), error_message.to_string()))
        });
        if let Some((failure_type, error_message)) = failure {
            prompt = self
                .learning
                .build_enhanced_prompt(&prompt, &failure_type, &error_message)
                .await;
        }

        if memories.is_empty() {
            return prompt;
        }

        let mut enhanced = String::from("## Relevant context from memory\n\n");
        for memory in memories {
            enhanced.push_str(&format!("- [{}] {}\n", memory.kind, memory.content));
        }
        enhanced.push_str("\n---\n\n");
        enhanced.push_str(&prompt);
        enhanced
    }

    /// Call every selected agent; failed calls become absent results
    async fn dispatch(
        &self,
        request: &Request,
        decision: &RoutingDecision,
        agents: &[SubAgent],
        prompt: &str,
    ) -> Vec<SubAgentResult> {
        let mut args = json!({
            "prompt": prompt,
            "context": request.context,
        });
        if let Some(model) = request.options.as_ref().and_then(|o| o.model.as_ref()) {
            if let Ok(model) = serde_json::to_value(model) {
                args["model"] = model;
            }
        }

        let mut seen = HashSet::new();
        let selected: Vec<&SubAgent> = decision
            .all_agent_ids()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| agents.iter().find(|a| &a.id == id))
            .collect();

        let parallel = request.options.as_ref().is_none_or(|o| o.parallel);
        let outcomes = if parallel {
            join_all(selected.iter().map(|agent| self.invoke(agent, args.clone()))).await
        } else {
            let mut outcomes = Vec::with_capacity(selected.len());
            for agent in &selected {
                outcomes.push(self.invoke(agent, args.clone()).await);
            }
            outcomes
        };

        outcomes.into_iter().flatten().collect()
    }

    async fn invoke(&self, agent: &SubAgent, args: JsonValue) -> Option<SubAgentResult> {
        let started = Instant::now();
        match self.registry.call_tool(&agent.id, PROCESS_TOOL, args).await {
            Ok(output) if output.is_error => {
                warn!(agent_id = %agent.id, "Agent reported an error result");
                None
            }
            Ok(output) => {
                let elapsed = started.elapsed().as_millis() as u64;
                Some(interpret_output(agent, &output.content, elapsed))
            }
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "Excluding agent from results");
                None
            }
        }
    }

    /// Remember the exchange without holding up the response
    fn spawn_write_back(&self, request: &Request, decision: &RoutingDecision, response: &Response) {
        let memory = self.memory.clone();
        let results = &response.sub_agent_results;
        let mean_confidence = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64
        };

        let content = format!("Request: {}\nResponse: {}", request.prompt, response.content);
        let mut metadata = MemoryMetadata::default()
            .with_source("orchestrator")
            .with_tags(["request", decision.intent.primary.as_str()]);
        if let Some(project) = request.project_path() {
            metadata = metadata.with_project(project);
        }
        let request_id = request.id.clone();

        tokio::spawn(async move {
            let short = NewMemory::new(MemoryKind::ShortTerm, content.clone()).with_metadata(metadata.clone());
            if let Err(e) = memory.store(short).await {
                warn!(request_id = %request_id, error = %e, "Short-term write-back failed");
            }

            if mean_confidence > LONG_TERM_CONFIDENCE {
                let long = NewMemory::new(MemoryKind::LongTerm, content)
                    .with_metadata(metadata.with_relevance(mean_confidence));
                if let Err(e) = memory.store(long).await {
                    warn!(request_id = %request_id, error = %e, "Long-term write-back failed");
                }
            }
        });
    }

    /// Disconnect every agent and stop accepting requests
    pub async fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.registry.disconnect_all().await;
        info!("Orchestrator shut down");
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn memory(&self) -> &Arc<TieredMemory> {
        &self.memory
    }

    pub fn learning(&self) -> &Arc<LearningEngine> {
        &self.learning
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
