//! Session note (context entry) projection.

use serde::{Deserialize, Serialize};

/// Entry types that are always worth surfacing across scope boundaries.
///
/// Cross-session and tagged-note queries filter to these unless an addressee
/// tag matches directly.
pub const HIGH_VALUE_ENTRY_TYPES: &[&str] = &["decision", "blocker", "handoff", "warning"];

/// The addressee tag that targets every agent in the session.
pub const WILDCARD_ADDRESSEE: &str = "all";

/// A session-scoped free-text note.
///
/// Immutable after creation; read-heavy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Unique identifier.
    pub id: String,
    /// The session that owns this note.
    pub session_id: String,
    /// Entry type tag (e.g. "decision", "blocker", "note").
    pub entry_type: String,
    /// Free-text content.
    pub content: String,
    /// Addressee tags: agent names, agent roles, or [`WILDCARD_ADDRESSEE`].
    pub addressed_to: Vec<String>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

impl ContextEntry {
    /// Creates a note with a generated ID.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        entry_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            entry_type: entry_type.into(),
            content: content.into(),
            addressed_to: Vec::new(),
            created_at: crate::current_timestamp(),
        }
    }

    /// Whether this entry is of a high-value type.
    #[must_use]
    pub fn is_high_value(&self) -> bool {
        HIGH_VALUE_ENTRY_TYPES
            .iter()
            .any(|t| self.entry_type.eq_ignore_ascii_case(t))
    }

    /// Whether this entry targets the given agent name or role.
    ///
    /// Matches an explicit name tag, a role tag, or the wildcard.
    #[must_use]
    pub fn addresses(&self, agent_name: &str, agent_type: Option<&str>) -> bool {
        self.addressed_to.iter().any(|tag| {
            tag.eq_ignore_ascii_case(WILDCARD_ADDRESSEE)
                || tag.eq_ignore_ascii_case(agent_name)
                || agent_type.is_some_and(|role| tag.eq_ignore_ascii_case(role))
        })
    }
}
