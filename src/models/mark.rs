//! Mark types and identifiers.
//!
//! A mark is a durable observation recorded by an agent or a manual API call:
//! a warning, a decision, a discovery. Marks are never updated after creation
//! except to set their embedding, their promotion reference, or their status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a mark.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkId(String);

impl MarkId {
    /// Creates a new mark ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered mark ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MarkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MarkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a mark.
///
/// Resolved marks are excluded from retrieval but still feed promotion
/// mining. Promotion is tracked separately via [`Mark::promoted_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkStatus {
    /// The observation is current.
    Active,
    /// The observation has been addressed and no longer needs surfacing.
    Resolved,
}

impl MarkStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }

    /// Parses a stored status string, defaulting unknown values to active.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("resolved") {
            Self::Resolved
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for MarkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable observation recorded during a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mark {
    /// Unique identifier.
    pub id: MarkId,
    /// The session that owns this mark.
    pub session_id: String,
    /// The agent that authored the mark, if any.
    pub agent_name: Option<String>,
    /// The project this mark belongs to.
    pub project: String,
    /// Free-form type tag (e.g. "warning", "decision", "discovery").
    pub mark_type: String,
    /// Short title.
    pub title: String,
    /// Optional longer narrative.
    pub narrative: Option<String>,
    /// Concept labels used by promotion mining.
    pub concepts: Vec<String>,
    /// File paths read while the observation was made.
    pub files_read: Vec<String>,
    /// File paths modified while the observation was made.
    pub files_modified: Vec<String>,
    /// Optional fixed-dimension embedding vector.
    pub embedding: Option<Vec<f32>>,
    /// Reference to the durable rule this mark was promoted into.
    ///
    /// Promotion is one-way: a mark with a non-null reference is permanently
    /// excluded from every retrieval path.
    pub promoted_to: Option<String>,
    /// Lifecycle status.
    pub status: MarkStatus,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

impl Mark {
    /// Creates a minimal active mark with a generated ID.
    ///
    /// Intended for fixture builders and the external capture path; retrieval
    /// code never constructs marks.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        project: impl Into<String>,
        mark_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: MarkId::generate(),
            session_id: session_id.into(),
            agent_name: None,
            project: project.into(),
            mark_type: mark_type.into(),
            title: title.into(),
            narrative: None,
            concepts: Vec::new(),
            files_read: Vec::new(),
            files_modified: Vec::new(),
            embedding: None,
            promoted_to: None,
            status: MarkStatus::Active,
            created_at: crate::current_timestamp(),
        }
    }

    /// Whether any retrieval strategy may return this mark.
    ///
    /// Enforced redundantly in query predicates; this is the single in-memory
    /// statement of the invariant.
    #[must_use]
    pub fn is_retrievable(&self) -> bool {
        self.promoted_to.is_none() && self.status == MarkStatus::Active
    }

    /// Whether promotion mining may count this mark.
    ///
    /// Resolved marks still feed mining; promoted marks never do.
    #[must_use]
    pub fn is_minable(&self) -> bool {
        self.promoted_to.is_none() && !self.concepts.is_empty()
    }
}
