use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of activity categories shown in the client-side replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Reasoning,
    Delegation,
    Embedding,
    Search,
    Database,
    Mcp,
    Inventory,
    Order,
    ToolCall,
    Result,
    Error,
}

impl ActivityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Delegation => "delegation",
            Self::Embedding => "embedding",
            Self::Search => "search",
            Self::Database => "database",
            Self::Mcp => "mcp",
            Self::Inventory => "inventory",
            Self::Order => "order",
            Self::ToolCall => "tool_call",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a turn's execution log. Append-only within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: u64,
    pub turn_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
}

/// Event under construction. The recorder assigns `id`, `turn_id`, and
/// `timestamp` at record time.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub kind: ActivityKind,
    pub title: String,
    pub details: Option<String>,
    pub sql_text: Option<String>,
    pub latency_ms: Option<u64>,
    pub worker_name: Option<String>,
    pub source_location: Option<String>,
}

impl EventDraft {
    #[must_use]
    pub fn new(kind: ActivityKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            details: None,
            sql_text: None,
            latency_ms: None,
            worker_name: None,
            source_location: None,
        }
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql_text = Some(sql.into());
        self
    }

    #[must_use]
    pub fn latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    #[must_use]
    pub fn worker(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = Some(worker_name.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source_location: impl Into<String>) -> Self {
        self.source_location = Some(source_location.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityKind::ToolCall).unwrap();
        assert_eq!(json, "\"tool_call\"");
        let back: ActivityKind = serde_json::from_str("\"mcp\"").unwrap();
        assert_eq!(back, ActivityKind::Mcp);
    }

    #[test]
    fn draft_builder_sets_optional_fields() {
        let draft = EventDraft::new(ActivityKind::Search, "hybrid search")
            .sql("SELECT 1")
            .latency_ms(12)
            .worker("search");
        assert_eq!(draft.sql_text.as_deref(), Some("SELECT 1"));
        assert_eq!(draft.latency_ms, Some(12));
        assert_eq!(draft.worker_name.as_deref(), Some("search"));
        assert!(draft.details.is_none());
    }

    #[test]
    fn event_omits_empty_optionals_in_json() {
        let event = ActivityEvent {
            id: 1,
            turn_id: "t".into(),
            timestamp: Utc::now(),
            kind: ActivityKind::Database,
            title: "query".into(),
            details: None,
            sql_text: None,
            latency_ms: None,
            worker_name: None,
            source_location: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("sql_text"));
        assert!(!json.contains("latency_ms"));
    }
}
