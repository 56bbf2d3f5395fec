//! `SQLite`-backed projection store.
//!
//! The store owns read projections over marks, context entries, agents,
//! tasks, messages, and sessions, plus the only writes this crate is
//! authorized to make: filling a mark's null embedding and recording
//! promotion state. Schema/migration lifecycle belongs to the external
//! store owner; the tables are created on open so embedded deployments and
//! tests work against a fresh file.

use super::connection::{acquire_lock, configure_connection};
use super::sql::{
    blob_to_embedding, embedding_to_blob, escape_like_wildcards, json_to_strings, strings_to_json,
};
use crate::models::{
    AgentStatus, AgentSummary, ContextEntry, Mark, MarkId, MarkStatus, MessageStatus,
    MessageSummary, TaskStatus, TaskSummary,
};
use crate::{Error, Result};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::Mutex;

/// Column list shared by every mark SELECT.
const MARK_COLUMNS: &str = "id, session_id, agent_name, project, mark_type, title, narrative, \
     concepts, files_read, files_modified, embedding, promoted_to, status, created_at";

/// Predicate shared by every retrieval path: promoted or resolved marks never
/// resurface. Enforced here rather than by locking (the invariant is
/// multi-row but monotone).
const RETRIEVABLE: &str = "promoted_to IS NULL AND status = 'active'";

/// `SQLite` projection store.
///
/// Uses a `Mutex<Connection>`; WAL mode and a busy timeout keep contention
/// acceptable for the read-heavy briefing workload.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and initializes) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::op("open_store", e))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (tests, ephemeral sessions).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::op("open_store", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::op("init_schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Registers a session and its owning project.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_session(&self, session_id: &str, project: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO sessions (id, project, created_at) VALUES (?1, ?2, ?3)",
            params![session_id, project, crate::current_timestamp()],
        )
        .map_err(|e| Error::op("insert_session", e))?;
        Ok(())
    }

    /// Looks up the project a session belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn project_of_session(&self, session_id: &str) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT project FROM sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(Error::op("project_of_session", other)),
        })
    }

    // ------------------------------------------------------------------
    // Inserts (fixtures and external writers)
    // ------------------------------------------------------------------

    /// Inserts a mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_mark(&self, mark: &Mark) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO marks (id, session_id, agent_name, project, mark_type, title, narrative, \
             concepts, files_read, files_modified, embedding, promoted_to, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                mark.id.as_str(),
                mark.session_id,
                mark.agent_name,
                mark.project,
                mark.mark_type,
                mark.title,
                mark.narrative,
                strings_to_json(&mark.concepts),
                strings_to_json(&mark.files_read),
                strings_to_json(&mark.files_modified),
                mark.embedding.as_deref().map(embedding_to_blob),
                mark.promoted_to,
                mark.status.as_str(),
                mark.created_at,
            ],
        )
        .map_err(|e| Error::op("insert_mark", e))?;
        Ok(())
    }

    /// Inserts an agent projection.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_agent(&self, agent: &AgentSummary) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO agents (id, session_id, name, agent_type, parent_id, status, summary, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                agent.id,
                agent.session_id,
                agent.name,
                agent.agent_type,
                agent.parent_id,
                agent.status.as_str(),
                agent.summary,
                agent.created_at,
            ],
        )
        .map_err(|e| Error::op("insert_agent", e))?;
        Ok(())
    }

    /// Inserts a context entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_entry(&self, entry: &ContextEntry) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO context_entries (id, session_id, entry_type, content, addressed_to, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.session_id,
                entry.entry_type,
                entry.content,
                strings_to_json(&entry.addressed_to),
                entry.created_at,
            ],
        )
        .map_err(|e| Error::op("insert_entry", e))?;
        Ok(())
    }

    /// Inserts a task projection.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_task(&self, task: &TaskSummary) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO tasks (id, session_id, title, description, status, assignee, tags, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id,
                task.session_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.assignee,
                strings_to_json(&task.tags),
                task.created_at,
            ],
        )
        .map_err(|e| Error::op("insert_task", e))?;
        Ok(())
    }

    /// Inserts a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_message(&self, message: &MessageSummary) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO messages (id, project, to_agent, from_agent, content, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.project,
                message.to_agent,
                message.from_agent,
                message.content,
                message.status.as_str(),
                message.created_at,
            ],
        )
        .map_err(|e| Error::op("insert_message", e))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mark writes (the core's only write authority)
    // ------------------------------------------------------------------

    /// Fills a mark's embedding, only if it is currently null.
    ///
    /// The null-only predicate makes backfill idempotent and safe to
    /// interleave with live writes without locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_mark_embedding(&self, id: &MarkId, vector: &[f32]) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let changed = conn
            .execute(
                "UPDATE marks SET embedding = ?1 WHERE id = ?2 AND embedding IS NULL",
                params![embedding_to_blob(vector), id.as_str()],
            )
            .map_err(|e| Error::op("set_mark_embedding", e))?;
        Ok(changed > 0)
    }

    /// Records a mark's promotion reference (external curation write path).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_mark_promoted(&self, id: &MarkId, promoted_to: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE marks SET promoted_to = ?1 WHERE id = ?2",
            params![promoted_to, id.as_str()],
        )
        .map_err(|e| Error::op("set_mark_promoted", e))?;
        Ok(())
    }

    /// Updates a mark's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_mark_status(&self, id: &MarkId, status: MarkStatus) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE marks SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )
        .map_err(|e| Error::op("set_mark_status", e))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Agent queries
    // ------------------------------------------------------------------

    /// Completed sibling agents: same session, same parent, summary present,
    /// excluding the requesting agent itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn sibling_agents(
        &self,
        session_id: &str,
        parent_id: Option<&str>,
        exclude_name: &str,
        limit: usize,
    ) -> Result<Vec<AgentSummary>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, name, agent_type, parent_id, status, summary, created_at \
                 FROM agents \
                 WHERE session_id = ?1 \
                   AND (parent_id IS ?2) \
                   AND name != ?3 \
                   AND status = 'completed' AND summary IS NOT NULL \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?4",
            )
            .map_err(|e| Error::op("sibling_agents", e))?;
        let rows = stmt
            .query_map(
                params![session_id, parent_id, exclude_name, limit],
                agent_from_row,
            )
            .map_err(|e| Error::op("sibling_agents", e))?;
        collect_rows(rows, "sibling_agents")
    }

    /// Completed agents with the same role from any session, excluding the
    /// requesting agent's own same-parent siblings (covered by
    /// [`Self::sibling_agents`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn same_role_agents(
        &self,
        agent_type: &str,
        session_id: &str,
        parent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentSummary>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, name, agent_type, parent_id, status, summary, created_at \
                 FROM agents \
                 WHERE agent_type = ?1 \
                   AND status = 'completed' AND summary IS NOT NULL \
                   AND NOT (session_id = ?2 AND parent_id IS ?3) \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?4",
            )
            .map_err(|e| Error::op("same_role_agents", e))?;
        let rows = stmt
            .query_map(
                params![agent_type, session_id, parent_id, limit],
                agent_from_row,
            )
            .map_err(|e| Error::op("same_role_agents", e))?;
        collect_rows(rows, "same_role_agents")
    }

    /// Completed agents with a summary for one session.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn completed_agents(&self, session_id: &str, limit: usize) -> Result<Vec<AgentSummary>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, name, agent_type, parent_id, status, summary, created_at \
                 FROM agents \
                 WHERE session_id = ?1 AND status = 'completed' AND summary IS NOT NULL \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(|e| Error::op("completed_agents", e))?;
        let rows = stmt
            .query_map(params![session_id, limit], agent_from_row)
            .map_err(|e| Error::op("completed_agents", e))?;
        collect_rows(rows, "completed_agents")
    }

    /// All currently active agents in a session (unbounded).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn active_agents(&self, session_id: &str) -> Result<Vec<AgentSummary>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, name, agent_type, parent_id, status, summary, created_at \
                 FROM agents WHERE session_id = ?1 AND status = 'active' \
                 ORDER BY created_at DESC, rowid DESC",
            )
            .map_err(|e| Error::op("active_agents", e))?;
        let rows = stmt
            .query_map(params![session_id], agent_from_row)
            .map_err(|e| Error::op("active_agents", e))?;
        collect_rows(rows, "active_agents")
    }

    // ------------------------------------------------------------------
    // Context entry queries
    // ------------------------------------------------------------------

    /// Most recent entries in one session.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_entries(&self, session_id: &str, limit: usize) -> Result<Vec<ContextEntry>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, entry_type, content, addressed_to, created_at \
                 FROM context_entries WHERE session_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(|e| Error::op("recent_entries", e))?;
        let rows = stmt
            .query_map(params![session_id, limit], entry_row)
            .map_err(|e| Error::op("recent_entries", e))?;
        finish_entries(rows, "recent_entries")
    }

    /// Entries of the given types in one session, most-recent-first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn entries_by_types(
        &self,
        session_id: &str,
        types: &[&str],
        limit: usize,
    ) -> Result<Vec<ContextEntry>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = numbered_placeholders(2, types.len());
        let sql = format!(
            "SELECT id, session_id, entry_type, content, addressed_to, created_at \
             FROM context_entries WHERE session_id = ?1 AND entry_type IN ({placeholders}) \
             ORDER BY created_at DESC, rowid DESC LIMIT {limit}"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("entries_by_types", e))?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&session_id];
        for t in types {
            values.push(t);
        }
        let rows = stmt
            .query_map(values.as_slice(), entry_row)
            .map_err(|e| Error::op("entries_by_types", e))?;
        finish_entries(rows, "entries_by_types")
    }

    /// High-value entries from other sessions of the same project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn cross_session_entries(
        &self,
        project: &str,
        exclude_session: &str,
        types: &[&str],
        limit: usize,
    ) -> Result<Vec<ContextEntry>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = numbered_placeholders(3, types.len());
        let sql = format!(
            "SELECT e.id, e.session_id, e.entry_type, e.content, e.addressed_to, e.created_at \
             FROM context_entries e JOIN sessions s ON s.id = e.session_id \
             WHERE s.project = ?1 AND e.session_id != ?2 AND e.entry_type IN ({placeholders}) \
             ORDER BY e.created_at DESC, e.rowid DESC LIMIT {limit}"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::op("cross_session_entries", e))?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project, &exclude_session];
        for t in types {
            values.push(t);
        }
        let rows = stmt
            .query_map(values.as_slice(), entry_row)
            .map_err(|e| Error::op("cross_session_entries", e))?;
        finish_entries(rows, "cross_session_entries")
    }

    // ------------------------------------------------------------------
    // Task queries
    // ------------------------------------------------------------------

    /// Tasks assigned to one agent, priority-ordered, excluding the given
    /// statuses (unbounded).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tasks_for_assignee(
        &self,
        session_id: &str,
        assignee: &str,
        exclude: &[TaskStatus],
    ) -> Result<Vec<TaskSummary>> {
        let excluded: Vec<&str> = exclude.iter().map(|s| s.as_str()).collect();
        let placeholders = numbered_placeholders(3, excluded.len());
        let not_in = if excluded.is_empty() {
            String::new()
        } else {
            format!("AND status NOT IN ({placeholders})")
        };
        let sql = format!(
            "SELECT id, session_id, title, description, status, assignee, tags, created_at \
             FROM tasks WHERE session_id = ?1 AND assignee = ?2 {not_in} \
             ORDER BY {TASK_PRIORITY_ORDER}"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("tasks_for_assignee", e))?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&session_id, &assignee];
        for s in &excluded {
            values.push(s);
        }
        let rows = stmt
            .query_map(values.as_slice(), task_row)
            .map_err(|e| Error::op("tasks_for_assignee", e))?;
        finish_tasks(rows, "tasks_for_assignee")
    }

    /// Open (pending or in-progress) tasks in one session, priority-ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn open_tasks(&self, session_id: &str, limit: usize) -> Result<Vec<TaskSummary>> {
        let sql = format!(
            "SELECT id, session_id, title, description, status, assignee, tags, created_at \
             FROM tasks WHERE session_id = ?1 AND status IN ('pending', 'in_progress') \
             ORDER BY {TASK_PRIORITY_ORDER} LIMIT ?2"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("open_tasks", e))?;
        let rows = stmt
            .query_map(params![session_id, limit], task_row)
            .map_err(|e| Error::op("open_tasks", e))?;
        finish_tasks(rows, "open_tasks")
    }

    /// Count of backlog (idea + planned) tasks in one session.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn backlog_count(&self, session_id: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE session_id = ?1 AND status IN ('idea', 'planned')",
            params![session_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| usize::try_from(n).unwrap_or(0))
        .map_err(|e| Error::op("backlog_count", e))
    }

    // ------------------------------------------------------------------
    // Message queries
    // ------------------------------------------------------------------

    /// Pending messages addressed to one agent in a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_messages(
        &self,
        project: &str,
        to_agent: &str,
        limit: usize,
    ) -> Result<Vec<MessageSummary>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, project, to_agent, from_agent, content, status, created_at \
                 FROM messages WHERE project = ?1 AND to_agent = ?2 AND status = 'pending' \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3",
            )
            .map_err(|e| Error::op("pending_messages", e))?;
        let rows = stmt
            .query_map(params![project, to_agent, limit], message_from_row)
            .map_err(|e| Error::op("pending_messages", e))?;
        collect_rows(rows, "pending_messages")
    }

    /// Count of pending messages for a project, any addressee.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_message_count(&self, project: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE project = ?1 AND status = 'pending'",
            params![project],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| usize::try_from(n).unwrap_or(0))
        .map_err(|e| Error::op("pending_message_count", e))
    }

    // ------------------------------------------------------------------
    // Mark queries
    // ------------------------------------------------------------------

    /// Retrievable marks authored by other agents of the same session.
    ///
    /// When a parent id is supplied, only marks from agents sharing that
    /// parent qualify.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn session_marks(
        &self,
        session_id: &str,
        exclude_agent: &str,
        parent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Mark>> {
        let sql = if parent_id.is_some() {
            format!(
                "SELECT {MARK_COLUMNS_QUALIFIED} FROM marks m \
                 JOIN agents a ON a.session_id = m.session_id AND a.name = m.agent_name \
                 WHERE m.session_id = ?1 AND m.agent_name IS NOT NULL AND m.agent_name != ?2 \
                   AND a.parent_id IS ?3 \
                   AND m.{RETRIEVABLE_QUALIFIED} \
                 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?4"
            )
        } else {
            format!(
                "SELECT {MARK_COLUMNS} FROM marks m \
                 WHERE m.session_id = ?1 AND m.agent_name IS NOT NULL AND m.agent_name != ?2 \
                   AND ?3 IS NULL \
                   AND {RETRIEVABLE} \
                 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?4"
            )
        };
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("session_marks", e))?;
        let rows = stmt
            .query_map(
                params![session_id, exclude_agent, parent_id, limit],
                mark_row,
            )
            .map_err(|e| Error::op("session_marks", e))?;
        finish_marks(rows, "session_marks")
    }

    /// Retrievable marks from other sessions of the same project,
    /// most-recent-first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn project_marks(
        &self,
        project: &str,
        exclude_session: &str,
        limit: usize,
    ) -> Result<Vec<Mark>> {
        let sql = format!(
            "SELECT {MARK_COLUMNS} FROM marks \
             WHERE project = ?1 AND session_id != ?2 AND {RETRIEVABLE} \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("project_marks", e))?;
        let rows = stmt
            .query_map(params![project, exclude_session, limit], mark_row)
            .map_err(|e| Error::op("project_marks", e))?;
        finish_marks(rows, "project_marks")
    }

    /// Retrievable marks whose read/modified file sets intersect `files`.
    ///
    /// The stored sets are JSON text; a parameterized LIKE prefilter narrows
    /// candidates, and the exact intersection is verified on the decoded
    /// sets. An empty file set returns an empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn file_overlap_marks(
        &self,
        project: &str,
        exclude_session: &str,
        files: &[String],
        limit: usize,
    ) -> Result<Vec<Mark>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses = Vec::with_capacity(files.len() * 2);
        let mut patterns = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            let n = 3 + i;
            clauses.push(format!("files_read LIKE ?{n} ESCAPE '\\'"));
            clauses.push(format!("files_modified LIKE ?{n} ESCAPE '\\'"));
            patterns.push(format!("%\"{}\"%", escape_like_wildcards(file)));
        }
        let overlap = clauses.join(" OR ");
        let sql = format!(
            "SELECT {MARK_COLUMNS} FROM marks \
             WHERE project = ?1 AND session_id != ?2 AND {RETRIEVABLE} AND ({overlap}) \
             ORDER BY created_at DESC, rowid DESC LIMIT {limit}"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("file_overlap_marks", e))?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project, &exclude_session];
        for p in &patterns {
            values.push(p);
        }
        let rows = stmt
            .query_map(values.as_slice(), mark_row)
            .map_err(|e| Error::op("file_overlap_marks", e))?;
        let marks = finish_marks(rows, "file_overlap_marks")?;

        // The LIKE prefilter can match a path that is a JSON substring of a
        // longer one; confirm the exact set intersection.
        Ok(marks
            .into_iter()
            .filter(|m| {
                files.iter().any(|f| {
                    m.files_read.iter().any(|r| r == f) || m.files_modified.iter().any(|w| w == f)
                })
            })
            .collect())
    }

    /// Retrievable embedded marks of a project, excluding one session.
    ///
    /// Used by the vector-similarity strategy; `cap` bounds the scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn embedded_project_marks(
        &self,
        project: &str,
        exclude_session: &str,
        cap: usize,
    ) -> Result<Vec<Mark>> {
        let sql = format!(
            "SELECT {MARK_COLUMNS} FROM marks \
             WHERE project = ?1 AND session_id != ?2 AND {RETRIEVABLE} \
               AND embedding IS NOT NULL \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::op("embedded_project_marks", e))?;
        let rows = stmt
            .query_map(params![project, exclude_session, cap], mark_row)
            .map_err(|e| Error::op("embedded_project_marks", e))?;
        finish_marks(rows, "embedded_project_marks")
    }

    /// Marks with no embedding yet, most-recent-first (backfill input).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn marks_missing_embedding(&self) -> Result<Vec<Mark>> {
        let sql = format!(
            "SELECT {MARK_COLUMNS} FROM marks WHERE embedding IS NULL \
             ORDER BY created_at DESC, rowid DESC"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::op("marks_missing_embedding", e))?;
        let rows = stmt
            .query_map([], mark_row)
            .map_err(|e| Error::op("marks_missing_embedding", e))?;
        finish_marks(rows, "marks_missing_embedding")
    }

    /// Number of marks that currently carry an embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_embedded_marks(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT COUNT(*) FROM marks WHERE embedding IS NOT NULL",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| usize::try_from(n).unwrap_or(0))
        .map_err(|e| Error::op("count_embedded_marks", e))
    }

    /// All embedded (id, vector) pairs, for similarity-index construction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn embedded_vectors(&self) -> Result<Vec<(MarkId, Vec<f32>)>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT id, embedding FROM marks WHERE embedding IS NOT NULL")
            .map_err(|e| Error::op("embedded_vectors", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| Error::op("embedded_vectors", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row.map_err(|e| Error::op("embedded_vectors", e))?;
            out.push((MarkId::new(id), blob_to_embedding(&blob)?));
        }
        Ok(out)
    }

    /// Marks eligible for promotion mining in one project: not promoted,
    /// any status, most-recent-first. Concept emptiness is filtered by the
    /// miner on the decoded sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn minable_marks(&self, project: &str) -> Result<Vec<Mark>> {
        let sql = format!(
            "SELECT {MARK_COLUMNS} FROM marks \
             WHERE project = ?1 AND promoted_to IS NULL \
             ORDER BY created_at DESC, rowid DESC"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::op("minable_marks", e))?;
        let rows = stmt
            .query_map(params![project], mark_row)
            .map_err(|e| Error::op("minable_marks", e))?;
        finish_marks(rows, "minable_marks")
    }
}

/// Mark columns qualified with the `m.` alias for joined queries.
const MARK_COLUMNS_QUALIFIED: &str = "m.id, m.session_id, m.agent_name, m.project, m.mark_type, \
     m.title, m.narrative, m.concepts, m.files_read, m.files_modified, m.embedding, \
     m.promoted_to, m.status, m.created_at";

/// [`RETRIEVABLE`] without a table alias baked in (caller prefixes `m.`).
const RETRIEVABLE_QUALIFIED: &str = "promoted_to IS NULL AND m.status = 'active'";

/// Task ordering: fixed status-priority table, then oldest-created first.
const TASK_PRIORITY_ORDER: &str = "CASE status \
     WHEN 'in_progress' THEN 0 WHEN 'pending' THEN 1 WHEN 'planned' THEN 2 \
     WHEN 'idea' THEN 3 ELSE 4 END, created_at ASC, rowid ASC";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    project    TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);

CREATE TABLE IF NOT EXISTS agents (
    id         TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    name       TEXT NOT NULL,
    agent_type TEXT,
    parent_id  TEXT,
    status     TEXT NOT NULL DEFAULT 'active',
    summary    TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_session ON agents(session_id);
CREATE INDEX IF NOT EXISTS idx_agents_type ON agents(agent_type);

CREATE TABLE IF NOT EXISTS marks (
    id             TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL,
    agent_name     TEXT,
    project        TEXT NOT NULL,
    mark_type      TEXT NOT NULL,
    title          TEXT NOT NULL,
    narrative      TEXT,
    concepts       TEXT NOT NULL DEFAULT '[]',
    files_read     TEXT NOT NULL DEFAULT '[]',
    files_modified TEXT NOT NULL DEFAULT '[]',
    embedding      BLOB,
    promoted_to    TEXT,
    status         TEXT NOT NULL DEFAULT 'active',
    created_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_marks_session ON marks(session_id);
CREATE INDEX IF NOT EXISTS idx_marks_project ON marks(project, created_at);

CREATE TABLE IF NOT EXISTS context_entries (
    id           TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL,
    entry_type   TEXT NOT NULL,
    content      TEXT NOT NULL,
    addressed_to TEXT NOT NULL DEFAULT '[]',
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_session ON context_entries(session_id);

CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status      TEXT NOT NULL DEFAULT 'pending',
    assignee    TEXT,
    tags        TEXT NOT NULL DEFAULT '[]',
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_session ON tasks(session_id);

CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    project    TEXT NOT NULL,
    to_agent   TEXT NOT NULL,
    from_agent TEXT,
    content    TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_project ON messages(project, to_agent);
";

// ----------------------------------------------------------------------
// Row conversion
// ----------------------------------------------------------------------

/// Raw mark row; list columns stay as JSON text until decoded outside the
/// rusqlite closure so codec failures surface as our own error type.
struct MarkRow {
    id: String,
    session_id: String,
    agent_name: Option<String>,
    project: String,
    mark_type: String,
    title: String,
    narrative: Option<String>,
    concepts: String,
    files_read: String,
    files_modified: String,
    embedding: Option<Vec<u8>>,
    promoted_to: Option<String>,
    status: String,
    created_at: u64,
}

impl MarkRow {
    fn into_mark(self) -> Result<Mark> {
        Ok(Mark {
            id: MarkId::new(self.id),
            session_id: self.session_id,
            agent_name: self.agent_name,
            project: self.project,
            mark_type: self.mark_type,
            title: self.title,
            narrative: self.narrative,
            concepts: json_to_strings(&self.concepts)?,
            files_read: json_to_strings(&self.files_read)?,
            files_modified: json_to_strings(&self.files_modified)?,
            embedding: self.embedding.as_deref().map(blob_to_embedding).transpose()?,
            promoted_to: self.promoted_to,
            status: MarkStatus::parse(&self.status),
            created_at: self.created_at,
        })
    }
}

fn mark_row(row: &Row<'_>) -> rusqlite::Result<MarkRow> {
    Ok(MarkRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        agent_name: row.get(2)?,
        project: row.get(3)?,
        mark_type: row.get(4)?,
        title: row.get(5)?,
        narrative: row.get(6)?,
        concepts: row.get(7)?,
        files_read: row.get(8)?,
        files_modified: row.get(9)?,
        embedding: row.get(10)?,
        promoted_to: row.get(11)?,
        status: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentSummary> {
    Ok(AgentSummary {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        agent_type: row.get(3)?,
        parent_id: row.get(4)?,
        status: AgentStatus::parse(&row.get::<_, String>(5)?),
        summary: row.get(6)?,
        created_at: row.get(7)?,
    })
}

struct EntryRow {
    id: String,
    session_id: String,
    entry_type: String,
    content: String,
    addressed_to: String,
    created_at: u64,
}

impl EntryRow {
    fn into_entry(self) -> Result<ContextEntry> {
        Ok(ContextEntry {
            id: self.id,
            session_id: self.session_id,
            entry_type: self.entry_type,
            content: self.content,
            addressed_to: json_to_strings(&self.addressed_to)?,
            created_at: self.created_at,
        })
    }
}

fn entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        entry_type: row.get(2)?,
        content: row.get(3)?,
        addressed_to: row.get(4)?,
        created_at: row.get(5)?,
    })
}

struct TaskRow {
    id: String,
    session_id: String,
    title: String,
    description: String,
    status: String,
    assignee: Option<String>,
    tags: String,
    created_at: u64,
}

impl TaskRow {
    fn into_task(self) -> Result<TaskSummary> {
        Ok(TaskSummary {
            id: self.id,
            session_id: self.session_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::parse(&self.status),
            assignee: self.assignee,
            tags: json_to_strings(&self.tags)?,
            created_at: self.created_at,
        })
    }
}

fn task_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        assignee: row.get(5)?,
        tags: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageSummary> {
    Ok(MessageSummary {
        id: row.get(0)?,
        project: row.get(1)?,
        to_agent: row.get(2)?,
        from_agent: row.get(3)?,
        content: row.get(4)?,
        status: MessageStatus::parse(&row.get::<_, String>(5)?),
        created_at: row.get(6)?,
    })
}

/// Builds `?n, ?n+1, …` placeholder lists for dynamic IN clauses.
fn numbered_placeholders(start: usize, count: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", start + i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    label: &str,
) -> Result<Vec<T>> {
    rows.collect::<rusqlite::Result<Vec<T>>>()
        .map_err(|e| Error::op(label, e))
}

fn finish_marks(
    rows: impl Iterator<Item = rusqlite::Result<MarkRow>>,
    label: &str,
) -> Result<Vec<Mark>> {
    collect_rows(rows, label)?
        .into_iter()
        .map(MarkRow::into_mark)
        .collect()
}

fn finish_entries(
    rows: impl Iterator<Item = rusqlite::Result<EntryRow>>,
    label: &str,
) -> Result<Vec<ContextEntry>> {
    collect_rows(rows, label)?
        .into_iter()
        .map(EntryRow::into_entry)
        .collect()
}

fn finish_tasks(
    rows: impl Iterator<Item = rusqlite::Result<TaskRow>>,
    label: &str,
) -> Result<Vec<TaskSummary>> {
    collect_rows(rows, label)?
        .into_iter()
        .map(TaskRow::into_task)
        .collect()
}
