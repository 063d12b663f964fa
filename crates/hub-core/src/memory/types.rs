//! Memory data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::agents::clamp_unit;
use crate::{Error, Result};

/// Relevance given to entries stored without one
pub const DEFAULT_RELEVANCE: f64 = 0.5;

/// Which tier an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
    Entity,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 3] = [Self::ShortTerm, Self::LongTerm, Self::Entity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short-term",
            Self::LongTerm => "long-term",
            Self::Entity => "entity",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "short-term" | "short_term" | "short" => Ok(Self::ShortTerm),
            "long-term" | "long_term" | "long" => Ok(Self::LongTerm),
            "entity" => Ok(Self::Entity),
            other => Err(Error::Other(format!("Unknown memory kind: {}", other))),
        }
    }
}

fn default_relevance() -> f64 {
    DEFAULT_RELEVANCE
}

fn default_source() -> String {
    "unknown".to_string()
}

/// Metadata attached to a memory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_relevance")]
    pub relevance: f64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default = "Utc::now")]
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            source: default_source(),
            relevance: DEFAULT_RELEVANCE,
            access_count: 0,
            last_accessed: Utc::now(),
            tags: BTreeSet::new(),
            project_id: None,
            entity_type: None,
            entity_id: None,
        }
    }
}

impl MemoryMetadata {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = clamp_unit(relevance);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// A stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub metadata: MemoryMetadata,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    pub fn new(id: impl Into<String>, kind: MemoryKind, content: impl Into<String>, metadata: MemoryMetadata) -> Self {
        Self {
            id: id.into(),
            kind,
            content: content.into(),
            metadata,
            timestamp: Utc::now(),
            expires_at: None,
        }
    }

    pub(crate) fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Case-insensitive substring match; an empty query matches everything
    pub fn matches_query(&self, query: &str) -> bool {
        query.is_empty() || self.content.to_lowercase().contains(&query.to_lowercase())
    }
}

/// What a caller supplies to store a memory
///
/// Missing metadata falls back to `relevance = 0.5` and `access_count = 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: MemoryKind,
    pub content: String,
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

impl NewMemory {
    pub fn new(kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            content: content.into(),
            metadata: MemoryMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: MemoryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Optional narrowing of a memory search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Tiers to search; all when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<MemoryKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Every listed tag must be present
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl SearchFilter {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn includes(&self, kind: MemoryKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }

    pub fn matches_project(&self, entry: &MemoryEntry) -> bool {
        self.project_id
            .as_ref()
            .is_none_or(|p| entry.metadata.project_id.as_ref() == Some(p))
    }

    pub fn matches_tags(&self, entry: &MemoryEntry) -> bool {
        self.tags.iter().all(|t| entry.metadata.tags.contains(t))
    }

    pub fn matches_entity_type(&self, entry: &MemoryEntry) -> bool {
        self.entity_type
            .as_ref()
            .is_none_or(|t| entry.metadata.entity_type.as_ref() == Some(t))
    }

    /// Project, tag and entity-type checks together
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        self.matches_project(entry) && self.matches_tags(entry) && self.matches_entity_type(entry)
    }
}

/// Sort by relevance, highest first; ties keep their order
pub(crate) fn sort_by_relevance(entries: &mut [MemoryEntry]) {
    entries.sort_by(|a, b| b.metadata.relevance.total_cmp(&a.metadata.relevance));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults_from_json() {
        let input: NewMemory = serde_json::from_str(r#"{"kind":"long-term","content":"x"}"#).unwrap();
        assert_eq!(input.metadata.relevance, DEFAULT_RELEVANCE);
        assert_eq!(input.metadata.access_count, 0);
        assert!(input.metadata.tags.is_empty());
    }

    #[test]
    fn test_entry_json_uses_snake_case_fields() {
        let entry = MemoryEntry::new(
            "m1",
            MemoryKind::Entity,
            "UserService",
            MemoryMetadata::default().with_entity("class", "svc-1"),
        );
        let json = entry.to_json().unwrap();
        assert!(json.contains("\"entity_type\":\"class\""));
        assert!(json.contains("\"kind\":\"entity\""));
        assert_eq!(MemoryEntry::from_json(&json).unwrap(), entry);
    }

    #[test]
    fn test_filter_matching() {
        let entry = MemoryEntry::new(
            "m1",
            MemoryKind::LongTerm,
            "Use a connection pool",
            MemoryMetadata::default().with_project("p1").with_tags(["db", "perf"]),
        );

        assert!(SearchFilter::default().matches(&entry));
        assert!(SearchFilter::for_project("p1").with_tags(["db"]).matches(&entry));
        assert!(!SearchFilter::for_project("p2").matches(&entry));
        assert!(!SearchFilter::default().with_tags(["db", "cache"]).matches(&entry));
        assert!(entry.matches_query("CONNECTION"));
        assert!(!entry.matches_query("thread"));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("short-term".parse::<MemoryKind>().unwrap(), MemoryKind::ShortTerm);
        assert_eq!("entity".parse::<MemoryKind>().unwrap(), MemoryKind::Entity);
        assert!("episodic".parse::<MemoryKind>().is_err());
    }

    #[test]
    fn test_filter_includes() {
        let filter = SearchFilter::default().with_kinds(vec![MemoryKind::LongTerm]);
        assert!(filter.includes(MemoryKind::LongTerm));
        assert!(!filter.includes(MemoryKind::ShortTerm));
        assert!(SearchFilter::default().includes(MemoryKind::Entity));
    }
}
