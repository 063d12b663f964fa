//! Configuration management
//!
//! Settings are loaded with the following precedence:
//! 1. Environment variables
//! 2. `agent-hub.toml`
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is replaced by the environment value.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::agents::{AgentConfig, DEFAULT_MAX_CONCURRENT};
use crate::{Error, Result};

/// File looked up by `Config::load`
pub const CONFIG_FILE: &str = "agent-hub.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tokens: TokenConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub learning: LearningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `memory://` or `sqlite://<path>`
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// When off, responses report zero tokens used
    #[serde(default = "default_true")]
    pub tracking_enabled: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { tracking_enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Per-agent timeout. Advisory; also the weighted aggregation ceiling.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Advisory connection limit
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Agents registered at startup
    #[serde(default)]
    pub definitions: Vec<AgentConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            definitions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_short_term_ttl_secs")]
    pub short_term_ttl_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_secs: default_short_term_ttl_secs(),
        }
    }
}

impl MemoryConfig {
    pub fn short_term_ttl(&self) -> Duration {
        Duration::from_secs(self.short_term_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_min_pattern_confidence")]
    pub min_pattern_confidence: f64,

    /// Snapshot imported at startup and exported at shutdown
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_pattern_confidence: default_min_pattern_confidence(),
            snapshot_path: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_store_url() -> String {
    "sqlite://data/agent-hub.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_short_term_ttl_secs() -> u64 {
    3600
}

fn default_min_pattern_confidence() -> f64 {
    0.3
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off")
}

impl Config {
    /// Replace `${VAR_NAME}` with the environment value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse TOML text, expanding `${VAR}` references first
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `./agent-hub.toml` if present, otherwise defaults plus environment
    pub fn load() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }
        Ok(Self::from_env())
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("HUB_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Some(url) = lookup("STORE_URL") {
            self.store.url = url;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(flag) = lookup("TOKEN_TRACKING_ENABLED") {
            self.tokens.tracking_enabled = parse_flag(&flag);
        }

        if let Some(timeout) = lookup("AGENT_TIMEOUT_MS").and_then(|t| t.parse().ok()) {
            self.agents.timeout_ms = timeout;
        }
        if let Some(max) = lookup("MAX_CONCURRENT_AGENTS").and_then(|m| m.parse().ok()) {
            self.agents.max_concurrent = max;
        }

        if let Some(ttl) = lookup("SHORT_TERM_TTL_SECS").and_then(|t| t.parse().ok()) {
            self.memory.short_term_ttl_secs = ttl;
        }

        if let Some(path) = lookup("LEARNING_SNAPSHOT_PATH") {
            self.learning.snapshot_path = Some(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentType, ConnectionKind};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr(), "0.0.0.0:3000");
        assert_eq!(config.store.url, "sqlite://data/agent-hub.db");
        assert_eq!(config.logging.level, "info");
        assert!(config.tokens.tracking_enabled);
        assert_eq!(config.agents.timeout_ms, 30_000);
        assert_eq!(config.agents.max_concurrent, 10);
        assert_eq!(config.memory.short_term_ttl(), Duration::from_secs(3600));
        assert_eq!(config.learning.min_pattern_confidence, 0.3);
        assert!(config.learning.snapshot_path.is_none());
    }

    #[test]
    fn test_parse_toml_with_agents() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 8080

            [store]
            url = "memory://"

            [tokens]
            tracking_enabled = false

            [[agents.definitions]]
            id = "sec"
            name = "Security Validator"
            type = "validator"
            capabilities = ["code-analysis", "security-scan"]
            connection = { kind = "process", command = "sec-agent", args = ["--stdio"] }

            [[agents.definitions]]
            id = "docs"
            name = "Docs"
            type = "knowledge"
            connection = { kind = "network", url = "http://localhost:9000/mcp" }

            [[agents.definitions]]
            id = "scratch"
            name = "Scratch"
            type = "dynamic"
            connection = { kind = "virtual" }
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.url, "memory://");
        assert!(!config.tokens.tracking_enabled);

        let agents = &config.agents.definitions;
        assert_eq!(agents.len(), 3);
        assert_eq!(agents[0].agent_type, AgentType::Validator);
        assert!(agents[0].capabilities.contains("security-scan"));
        assert!(matches!(&agents[0].connection, ConnectionKind::Process { args, .. } if args == &["--stdio"]));
        assert!(matches!(&agents[1].connection, ConnectionKind::Network { url } if url.ends_with("/mcp")));
        assert_eq!(agents[2].connection, ConnectionKind::Virtual);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(Config::from_toml_str("[server\nport ="), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("HUB_PORT", "9999"),
            ("STORE_URL", "memory://"),
            ("TOKEN_TRACKING_ENABLED", "false"),
            ("AGENT_TIMEOUT_MS", "5000"),
            ("MAX_CONCURRENT_AGENTS", "not-a-number"),
            ("LEARNING_SNAPSHOT_PATH", "data/learning.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::from_toml_str("[server]\nport = 8080\n").unwrap();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.store.url, "memory://");
        assert!(!config.tokens.tracking_enabled);
        assert_eq!(config.agents.timeout_ms, 5000);
        assert_eq!(config.agents.max_concurrent, 10);
        assert_eq!(config.learning.snapshot_path.as_deref(), Some("data/learning.json"));
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("AGENT_HUB_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${AGENT_HUB_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${AGENT_HUB_NONEXISTENT}_suffix");
        assert_eq!(result, "prefix__suffix");

        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("${}_content"), "_content");

        unsafe {
            std::env::remove_var("AGENT_HUB_TEST_VAR");
        }
    }

    #[test]
    fn test_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[memory]\nshort_term_ttl_secs = 60\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert!(config.memory.short_term_ttl_secs > 0);
        assert!(Config::from_toml_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag("off"));
    }
}
