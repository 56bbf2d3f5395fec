//! Agent projection types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// The agent is currently running.
    Active,
    /// The agent has finished.
    Completed,
}

impl AgentStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Parses a stored status string, defaulting unknown values to active.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("completed") {
            Self::Completed
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projection of an agent record.
///
/// Only completed agents with a non-null summary are eligible source material
/// for briefings; active agents appear only in the prompt-context roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Unique identifier.
    pub id: String,
    /// The session that owns this agent.
    pub session_id: String,
    /// Agent name (unique within a session).
    pub name: String,
    /// Optional role/type tag (e.g. "frontend", "reviewer").
    pub agent_type: Option<String>,
    /// Parent agent id, when spawned by another agent.
    pub parent_id: Option<String>,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Free-text completion summary, set when the agent finishes.
    pub summary: Option<String>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

impl AgentSummary {
    /// Creates an active agent projection with a generated ID.
    #[must_use]
    pub fn new(session_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            name: name.into(),
            agent_type: None,
            parent_id: None,
            status: AgentStatus::Active,
            summary: None,
            created_at: crate::current_timestamp(),
        }
    }

    /// Whether this agent can contribute a history section.
    #[must_use]
    pub fn has_usable_summary(&self) -> bool {
        self.status == AgentStatus::Completed
            && self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(AgentStatus::parse("completed"), AgentStatus::Completed);
        assert_eq!(AgentStatus::parse("active"), AgentStatus::Active);
        assert_eq!(AgentStatus::parse("unknown"), AgentStatus::Active);
    }

    #[test]
    fn test_usable_summary() {
        let mut agent = AgentSummary::new("s1", "backend");
        assert!(!agent.has_usable_summary());

        agent.status = AgentStatus::Completed;
        assert!(!agent.has_usable_summary());

        agent.summary = Some("  ".to_string());
        assert!(!agent.has_usable_summary());

        agent.summary = Some("Implemented the cache layer".to_string());
        assert!(agent.has_usable_summary());
    }
}
