//! Context assembly.
//!
//! Both briefing entry points live here. Each invokes its source queries and
//! cascade strategies in strict priority order, renders the non-empty results
//! as named sections, and concatenates them under the character budget.
//! Execution order equals presentation order on purpose: the budget cutoff
//! must starve low-priority sections, never high-priority ones.
//!
//! Neither entry point can fail. Every underlying source is fault-isolated,
//! so the worst case is an empty string (agent start) or the fixed sentinel
//! (prompt submission).

mod render;
mod throttle;

pub use throttle::NotifyThrottle;

use crate::cascade::{MarkRetriever, dedup_marks};
use crate::config::DebriefConfig;
use crate::embedding::EmbeddingGateway;
use crate::models::{Mark, TaskSummary};
use crate::observability::SECTIONS_DROPPED_COUNTER;
use crate::queries::{Scope, SourceQueries};
use crate::storage::SqliteStore;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Header for the agent-start briefing.
const SMART_HEADER: &str = "# Session Briefing";

/// Header for the prompt-submission briefing.
const PROMPT_HEADER: &str = "# Project Status";

/// Returned by the prompt-submission briefing when nothing qualifies.
const EMPTY_SENTINEL: &str = "No session context recorded yet.";

/// Path-shaped tokens in task text; requires a directory separator so plain
/// prose ("v1.2", "e.g.") never qualifies.
static FILE_PATH_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b[\w.-]+(?:/[\w.-]+)+\.[A-Za-z0-9]{1,8}\b").ok());

/// Assembles budgeted briefings from source queries and mark retrieval.
pub struct ContextAssembler {
    store: Arc<SqliteStore>,
    queries: SourceQueries,
    retriever: MarkRetriever,
    gateway: Arc<EmbeddingGateway>,
    config: DebriefConfig,
}

impl ContextAssembler {
    /// Creates an assembler, wiring up the embedding gateway from config.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, config: DebriefConfig) -> Self {
        let gateway = Arc::new(EmbeddingGateway::new(
            Arc::clone(&store),
            config.embedding.clone(),
        ));
        Self::with_gateway(store, gateway, config)
    }

    /// Creates an assembler over an explicit gateway (test doubles, shared
    /// gateways).
    #[must_use]
    pub fn with_gateway(
        store: Arc<SqliteStore>,
        gateway: Arc<EmbeddingGateway>,
        config: DebriefConfig,
    ) -> Self {
        let queries = SourceQueries::new(Arc::clone(&store), config.context.clone());
        let retriever = MarkRetriever::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            config.context.clone(),
        );
        Self {
            store,
            queries,
            retriever,
            gateway,
            config,
        }
    }

    /// Builds the agent-start briefing.
    ///
    /// Returns an empty string when no section qualifies; never fails.
    #[must_use]
    pub fn build_smart_context(
        &self,
        session_id: &str,
        agent_name: &str,
        agent_type: Option<&str>,
        parent_agent_id: Option<&str>,
    ) -> String {
        let scope = Scope::new(session_id, agent_name)
            .with_agent_type(agent_type.map(str::to_string))
            .with_parent(parent_agent_id.map(str::to_string));

        let assigned = self.queries.assigned_tasks(&scope);
        let task_files = extract_file_paths(&assigned);
        let task_text = assigned
            .iter()
            .map(|task| format!("{} {}", task.title, task.description))
            .collect::<Vec<_>>()
            .join("\n");

        let mut sections = Vec::new();
        push_section(
            &mut sections,
            render::section("Your Assigned Tasks", render::task_lines(&assigned)),
        );
        push_section(
            &mut sections,
            render::section(
                "Pending Messages",
                render::message_lines(&self.queries.pending_messages(&scope)),
            ),
        );
        push_section(
            &mut sections,
            render::section(
                "Completed Sibling Agents",
                render::agent_lines(&self.queries.sibling_agents(&scope)),
            ),
        );
        push_section(
            &mut sections,
            render::section(
                "Past Agents With Your Role",
                render::agent_lines(&self.queries.same_role_agents(&scope)),
            ),
        );
        push_section(
            &mut sections,
            render::section(
                "Notes For You",
                render::note_lines(&self.queries.tagged_notes(&scope)),
            ),
        );
        push_section(
            &mut sections,
            render::section(
                "From Other Sessions",
                render::note_lines(&self.queries.cross_session_notes(&scope)),
            ),
        );

        let team_marks = self.retriever.sibling_marks(
            session_id,
            agent_name,
            parent_agent_id,
            self.retriever.default_limit(),
        );
        push_section(
            &mut sections,
            render::section("Team Marks", render::mark_lines(&team_marks)),
        );

        if let Some(project) = self.project_of(session_id) {
            let past = self.retriever.past_marks(
                &project,
                session_id,
                &task_files,
                &task_text,
                self.retriever.default_limit(),
            );
            let past = drop_already_shown(&team_marks, past);
            push_section(
                &mut sections,
                render::section("Relevant Past Marks", render::mark_lines(&past)),
            );
        }

        // The fallback section only exists so a session with notes but no
        // structured context still gets a briefing.
        if sections.is_empty() {
            push_section(
                &mut sections,
                render::section(
                    "Recent Session Notes",
                    render::note_lines(&self.queries.recent_notes(session_id)),
                ),
            );
        }

        if sections.is_empty() {
            return String::new();
        }
        self.assemble(SMART_HEADER, sections)
    }

    /// Builds the prompt-submission briefing.
    ///
    /// Returns the fixed sentinel when no section qualifies; never fails and
    /// never returns an empty string.
    #[must_use]
    pub fn build_prompt_context(&self, session_id: &str) -> String {
        let mut sections = Vec::new();

        push_section(
            &mut sections,
            render::section(
                "Active Agents",
                render::roster_lines(&self.queries.active_agents(session_id)),
            ),
        );

        let open = self.queries.open_tasks(session_id);
        let mut task_lines = render::task_lines(&open.tasks);
        if open.backlog > 0 {
            task_lines.push(format!("({} more in the backlog)", open.backlog));
        }
        push_section(&mut sections, render::section("Open Tasks", task_lines));

        push_section(
            &mut sections,
            render::section(
                "Recent Decisions",
                render::note_lines(&self.queries.decisions(session_id)),
            ),
        );
        push_section(
            &mut sections,
            render::section(
                "Completed Agents",
                render::agent_lines(&self.queries.completed_agents(session_id)),
            ),
        );

        let pending = self.queries.pending_message_count(session_id);
        if pending > 0 {
            push_section(
                &mut sections,
                render::section(
                    "Pending Messages",
                    vec![format!("{pending} message(s) waiting for delivery")],
                ),
            );
        }

        if let Some(project) = self.project_of(session_id) {
            let marks = self.retriever.project_marks(
                &project,
                session_id,
                self.retriever.default_limit(),
            );
            push_section(
                &mut sections,
                render::section("Past Marks", render::mark_lines(&marks)),
            );
        }

        if sections.is_empty() {
            return EMPTY_SENTINEL.to_string();
        }
        self.assemble(PROMPT_HEADER, sections)
    }

    /// Warns about incomplete tasks when an agent finishes.
    ///
    /// Returns `None` when the agent has no incomplete tasks, or when a
    /// warning for this agent already fired within the throttle window.
    #[must_use]
    pub fn check_incomplete_tasks(
        &self,
        session_id: &str,
        agent_id: &str,
        agent_name: &str,
        throttle: &NotifyThrottle,
    ) -> Option<String> {
        let incomplete = self.queries.incomplete_tasks(session_id, agent_name);
        if incomplete.is_empty() {
            return None;
        }
        if !throttle.should_notify(&format!("{session_id}:{agent_id}")) {
            return None;
        }

        let lines = render::task_lines(&incomplete);
        Some(format!(
            "Agent '{agent_name}' has {} incomplete task(s):\n{}",
            incomplete.len(),
            lines.join("\n")
        ))
    }

    /// Whether embedding-backed retrieval is available.
    #[must_use]
    pub fn is_embedding_enabled(&self) -> bool {
        self.gateway.is_enabled()
    }

    /// Fills missing mark embeddings; see [`EmbeddingGateway::backfill_embeddings`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan or a write fails.
    pub fn backfill_embeddings(&self) -> Result<usize> {
        self.gateway.backfill_embeddings()
    }

    /// Builds the similarity index when warranted; see
    /// [`EmbeddingGateway::ensure_similarity_index`].
    pub fn ensure_similarity_index(&self) {
        self.gateway.ensure_similarity_index();
    }

    /// Resolves a session's project, degrading lookup failures to `None` so
    /// only the project-scoped sections go missing.
    fn project_of(&self, session_id: &str) -> Option<String> {
        match self.store.project_of_session(session_id) {
            Ok(project) => project,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "project lookup failed");
                None
            },
        }
    }

    /// Concatenates sections under the character budget.
    ///
    /// The first section is always included, even when it alone exceeds the
    /// budget; afterwards a section is appended only if the running total
    /// stays under the ceiling, and the first overflow drops everything that
    /// remains.
    fn assemble(&self, header: &str, sections: Vec<String>) -> String {
        let budget = self.config.context.char_budget;
        let mut out = String::from(header);
        let mut total = out.chars().count();
        let mut included = 0_usize;

        for section in sections {
            let cost = section.chars().count() + 1;
            if included > 0 && total + cost >= budget {
                tracing::debug!(included, "budget reached; dropping remaining sections");
                metrics::counter!(SECTIONS_DROPPED_COUNTER).increment(1);
                break;
            }
            out.push('\n');
            out.push_str(&section);
            total += cost;
            included += 1;
        }
        out
    }
}

fn push_section(sections: &mut Vec<String>, section: Option<String>) {
    if let Some(section) = section {
        sections.push(section);
    }
}

/// Removes past marks that already appeared in the team section.
fn drop_already_shown(shown: &[Mark], past: Vec<Mark>) -> Vec<Mark> {
    let mut combined: Vec<Mark> = shown.to_vec();
    let shown_count = combined.len();
    combined.extend(past);
    dedup_marks(combined).into_iter().skip(shown_count).collect()
}

/// Extracts distinct path-shaped tokens from assigned-task text, in first-seen
/// order.
fn extract_file_paths(tasks: &[TaskSummary]) -> Vec<String> {
    let Some(re) = FILE_PATH_RE.as_ref() else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for task in tasks {
        for text in [&task.title, &task.description] {
            for found in re.find_iter(text) {
                let path = found.as_str().to_string();
                if !out.contains(&path) {
                    out.push(path);
                }
            }
        }
    }
    out
}
