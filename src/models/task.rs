//! Task projection types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Captured but not yet committed to (backlog).
    Idea,
    /// Scheduled but not yet actionable (backlog).
    Planned,
    /// Ready to pick up.
    Pending,
    /// Actively being worked.
    InProgress,
    /// Finished (terminal).
    Completed,
}

impl TaskStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Planned => "planned",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parses a stored status string, defaulting unknown values to pending.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "idea" => Self::Idea,
            "planned" => Self::Planned,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }

    /// Display-order priority for task sections.
    ///
    /// In-progress work leads, then pending, then planned; within a status
    /// the oldest-created task comes first.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::InProgress => 0,
            Self::Pending => 1,
            Self::Planned => 2,
            Self::Idea => 3,
            Self::Completed => 4,
        }
    }

    /// Whether this status belongs to the backlog (reported only as a count).
    #[must_use]
    pub const fn is_backlog(self) -> bool {
        matches!(self, Self::Idea | Self::Planned)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projection of a task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Unique identifier.
    pub id: String,
    /// The session this task was raised in.
    pub session_id: String,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Agent name the task is assigned to, if any.
    pub assignee: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

impl TaskSummary {
    /// Creates a pending task with a generated ID.
    #[must_use]
    pub fn new(session_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            assignee: None,
            tags: Vec::new(),
            created_at: crate::current_timestamp(),
        }
    }
}
