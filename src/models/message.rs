//! Inter-agent message projection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for its addressee to start or resume.
    Pending,
    /// Already surfaced in a briefing.
    Delivered,
}

impl MessageStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
        }
    }

    /// Parses a stored status string, defaulting unknown values to pending.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("delivered") {
            Self::Delivered
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projection of a message record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Unique identifier.
    pub id: String,
    /// The project this message belongs to.
    pub project: String,
    /// Addressee agent name.
    pub to_agent: String,
    /// Sender agent name, if any.
    pub from_agent: Option<String>,
    /// Message body.
    pub content: String,
    /// Delivery status.
    pub status: MessageStatus,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

impl MessageSummary {
    /// Creates a pending message with a generated ID.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        to_agent: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            project: project.into(),
            to_agent: to_agent.into(),
            from_agent: None,
            content: content.into(),
            status: MessageStatus::Pending,
            created_at: crate::current_timestamp(),
        }
    }
}
