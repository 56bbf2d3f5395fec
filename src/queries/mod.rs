//! Source query catalog.
//!
//! Each query retrieves one kind of candidate context fragment from the
//! projection store. Every query is independently fault-isolated: an internal
//! failure is caught, logged with the query label, counted, and converted to
//! an empty result — it never propagates and never blocks sibling queries.
//!
//! Ordering is most-recent-first unless the catalog states a priority order
//! (task queries order by the fixed status-priority table, then
//! oldest-created first). Queries that join across scope boundaries exclude
//! the requesting entity's own session/agent to avoid self-matches.

use crate::config::ContextConfig;
use crate::models::{
    AgentSummary, ContextEntry, HIGH_VALUE_ENTRY_TYPES, MessageSummary, TaskStatus, TaskSummary,
};
use crate::observability::SOURCE_FAILURE_COUNTER;
use crate::storage::SqliteStore;
use crate::{Error, Result};
use std::sync::Arc;

/// Same-role history is capped tighter than other sections; it is the most
/// speculative source.
const SAME_ROLE_LIMIT: usize = 3;

/// Window of recent session notes scanned for addressee-tag matches.
const TAGGED_SCAN_WINDOW: usize = 100;

/// Entry types carrying decisions and coordination state.
const DECISION_ENTRY_TYPES: &[&str] = &["decision", "blocker", "handoff"];

/// Scoping identifiers for a briefing request.
#[derive(Debug, Clone)]
pub struct Scope {
    /// The requesting session.
    pub session_id: String,
    /// The requesting agent's name.
    pub agent_name: String,
    /// The requesting agent's role/type, if known.
    pub agent_type: Option<String>,
    /// The requesting agent's parent id, if spawned by another agent.
    pub parent_agent_id: Option<String>,
}

impl Scope {
    /// Creates a scope for the given session and agent.
    #[must_use]
    pub fn new(session_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            agent_type: None,
            parent_agent_id: None,
        }
    }

    /// Sets the agent role.
    #[must_use]
    pub fn with_agent_type(mut self, agent_type: Option<String>) -> Self {
        self.agent_type = agent_type;
        self
    }

    /// Sets the parent agent id.
    #[must_use]
    pub fn with_parent(mut self, parent_agent_id: Option<String>) -> Self {
        self.parent_agent_id = parent_agent_id;
        self
    }
}

/// Open-task listing plus the backlog count reported alongside it.
#[derive(Debug, Clone, Default)]
pub struct OpenTasks {
    /// Open (pending or in-progress) tasks, priority-ordered.
    pub tasks: Vec<TaskSummary>,
    /// Number of backlog (idea + planned) tasks, reported only as a count.
    pub backlog: usize,
}

/// The fixed catalog of fault-isolated source queries.
pub struct SourceQueries {
    store: Arc<SqliteStore>,
    config: ContextConfig,
}

impl SourceQueries {
    /// Creates the catalog over a store.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, config: ContextConfig) -> Self {
        Self { store, config }
    }

    /// Converts a query failure into an empty result, logging the label.
    fn guard<T>(label: &'static str, run: impl FnOnce() -> Result<Vec<T>>) -> Vec<T> {
        match run() {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(query = label, error = %e, "source query failed; omitting section");
                metrics::counter!(SOURCE_FAILURE_COUNTER, "query" => label).increment(1);
                Vec::new()
            },
        }
    }

    /// Count-valued variant of [`Self::guard`].
    fn guard_count(label: &'static str, run: impl FnOnce() -> Result<usize>) -> usize {
        match run() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(query = label, error = %e, "source query failed; returning zero");
                metrics::counter!(SOURCE_FAILURE_COUNTER, "query" => label).increment(1);
                0
            },
        }
    }

    /// Resolves the project a scope's session belongs to.
    fn project_of(&self, session_id: &str, label: &str) -> Result<String> {
        self.store
            .project_of_session(session_id)?
            .ok_or_else(|| Error::op(label, format!("unknown session '{session_id}'")))
    }

    /// Completed sibling agents (same session, same parent) with summaries.
    #[must_use]
    pub fn sibling_agents(&self, scope: &Scope) -> Vec<AgentSummary> {
        Self::guard("sibling_agents", || {
            self.store.sibling_agents(
                &scope.session_id,
                scope.parent_agent_id.as_deref(),
                &scope.agent_name,
                self.config.default_limit,
            )
        })
    }

    /// Completed same-role agents from any session, excluding the current
    /// session's same-parent siblings.
    #[must_use]
    pub fn same_role_agents(&self, scope: &Scope) -> Vec<AgentSummary> {
        let Some(role) = scope.agent_type.as_deref() else {
            return Vec::new();
        };
        Self::guard("same_role_agents", || {
            self.store.same_role_agents(
                role,
                &scope.session_id,
                scope.parent_agent_id.as_deref(),
                SAME_ROLE_LIMIT,
            )
        })
    }

    /// High-value notes from other sessions of the same project.
    #[must_use]
    pub fn cross_session_notes(&self, scope: &Scope) -> Vec<ContextEntry> {
        Self::guard("cross_session_notes", || {
            let project = self.project_of(&scope.session_id, "cross_session_notes")?;
            self.store.cross_session_entries(
                &project,
                &scope.session_id,
                HIGH_VALUE_ENTRY_TYPES,
                self.config.default_limit,
            )
        })
    }

    /// Session notes addressed to this agent (name, role, or the wildcard),
    /// plus high-value types regardless of addressee.
    ///
    /// Tag matching happens on the decoded sets over a bounded recent window
    /// rather than through string-assembled JSON SQL.
    #[must_use]
    pub fn tagged_notes(&self, scope: &Scope) -> Vec<ContextEntry> {
        Self::guard("tagged_notes", || {
            let window = self
                .store
                .recent_entries(&scope.session_id, TAGGED_SCAN_WINDOW)?;
            Ok(window
                .into_iter()
                .filter(|entry| {
                    entry.addresses(&scope.agent_name, scope.agent_type.as_deref())
                        || entry.is_high_value()
                })
                .take(self.config.default_limit)
                .collect())
        })
    }

    /// Most recent session notes; the assembler's fallback section.
    #[must_use]
    pub fn recent_notes(&self, session_id: &str) -> Vec<ContextEntry> {
        Self::guard("recent_notes", || {
            self.store.recent_entries(session_id, self.config.default_limit)
        })
    }

    /// Tasks assigned to this agent, priority-ordered, excluding completed
    /// and idea statuses (unbounded).
    #[must_use]
    pub fn assigned_tasks(&self, scope: &Scope) -> Vec<TaskSummary> {
        Self::guard("assigned_tasks", || {
            self.store.tasks_for_assignee(
                &scope.session_id,
                &scope.agent_name,
                &[TaskStatus::Completed, TaskStatus::Idea],
            )
        })
    }

    /// Recent decision/blocker/handoff notes for one session.
    #[must_use]
    pub fn decisions(&self, session_id: &str) -> Vec<ContextEntry> {
        Self::guard("decisions", || {
            self.store
                .entries_by_types(session_id, DECISION_ENTRY_TYPES, self.config.default_limit)
        })
    }

    /// Completed agents with a summary for one session.
    #[must_use]
    pub fn completed_agents(&self, session_id: &str) -> Vec<AgentSummary> {
        Self::guard("completed_agents", || {
            self.store.completed_agents(session_id, self.config.default_limit)
        })
    }

    /// All active agents in one session (unbounded).
    #[must_use]
    pub fn active_agents(&self, session_id: &str) -> Vec<AgentSummary> {
        Self::guard("active_agents", || self.store.active_agents(session_id))
    }

    /// Open tasks plus the backlog count for one session.
    #[must_use]
    pub fn open_tasks(&self, session_id: &str) -> OpenTasks {
        let tasks = Self::guard("open_tasks", || {
            self.store.open_tasks(session_id, self.config.open_task_limit)
        });
        let backlog =
            Self::guard_count("backlog_count", || self.store.backlog_count(session_id));
        OpenTasks { tasks, backlog }
    }

    /// All non-completed tasks assigned to one agent (unbounded).
    #[must_use]
    pub fn incomplete_tasks(&self, session_id: &str, agent_name: &str) -> Vec<TaskSummary> {
        Self::guard("incomplete_tasks", || {
            self.store
                .tasks_for_assignee(session_id, agent_name, &[TaskStatus::Completed])
        })
    }

    /// Pending messages addressed to this agent within the project.
    #[must_use]
    pub fn pending_messages(&self, scope: &Scope) -> Vec<MessageSummary> {
        Self::guard("pending_messages", || {
            let project = self.project_of(&scope.session_id, "pending_messages")?;
            self.store
                .pending_messages(&project, &scope.agent_name, self.config.message_limit)
        })
    }

    /// Count of pending messages for the session's project.
    #[must_use]
    pub fn pending_message_count(&self, session_id: &str) -> usize {
        Self::guard_count("pending_message_count", || {
            let project = self.project_of(session_id, "pending_message_count")?;
            self.store.pending_message_count(&project)
        })
    }
}
