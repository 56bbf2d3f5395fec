//! End-to-end briefing behavior over an in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use debrief::{
    AgentStatus, AgentSummary, ContextAssembler, ContextEntry, DebriefConfig, EmbeddingGateway,
    EmbeddingProvider, Error, Mark, MarkStatus, MessageSummary, NotifyThrottle, SqliteStore,
    TaskSummary,
};
use std::sync::Arc;

const SENTINEL: &str = "No session context recorded yet.";

fn seeded() -> (Arc<SqliteStore>, ContextAssembler) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.insert_session("s-now", "proj").unwrap();
    let assembler = ContextAssembler::new(Arc::clone(&store), DebriefConfig::default());
    (store, assembler)
}

#[test]
fn test_empty_session_produces_empty_and_sentinel() {
    let (_, assembler) = seeded();
    assert_eq!(assembler.build_smart_context("s-now", "backend", None, None), "");
    assert_eq!(assembler.build_prompt_context("s-now"), SENTINEL);
}

#[test]
fn test_sibling_mark_surfaces_in_team_section() {
    let (store, assembler) = seeded();

    // worker-a and worker-b share a parent; worker-a already hit the quirk.
    let mut worker_a = AgentSummary::new("s-now", "worker-a");
    worker_a.parent_id = Some("lead-1".to_string());
    store.insert_agent(&worker_a).unwrap();
    let mut worker_b = AgentSummary::new("s-now", "worker-b");
    worker_b.parent_id = Some("lead-1".to_string());
    store.insert_agent(&worker_b).unwrap();

    let mut mark = Mark::new("s-now", "proj", "warning", "BigInt needs Number() wrap");
    mark.agent_name = Some("worker-a".to_string());
    store.insert_mark(&mark).unwrap();

    let briefing = assembler.build_smart_context("s-now", "worker-b", None, Some("lead-1"));
    assert!(briefing.contains("## Team Marks"));
    assert!(briefing.contains("BigInt needs Number() wrap"));

    // The author never sees their own mark back.
    let own_view = assembler.build_smart_context("s-now", "worker-a", None, Some("lead-1"));
    assert!(!own_view.contains("BigInt needs Number() wrap"));
}

#[test]
fn test_promoted_and_resolved_marks_never_surface() {
    let (store, assembler) = seeded();
    store.insert_session("s-old", "proj").unwrap();

    let promoted = Mark::new("s-old", "proj", "warning", "promoted away");
    store.insert_mark(&promoted).unwrap();
    store.set_mark_promoted(&promoted.id, "rule-1").unwrap();

    let resolved = Mark::new("s-old", "proj", "warning", "already handled");
    store.insert_mark(&resolved).unwrap();
    store
        .set_mark_status(&resolved.id, MarkStatus::Resolved)
        .unwrap();

    assert_eq!(assembler.build_smart_context("s-now", "backend", None, None), "");
    assert_eq!(assembler.build_prompt_context("s-now"), SENTINEL);
}

#[test]
fn test_fallback_suppressed_by_any_higher_section() {
    let (store, assembler) = seeded();
    store
        .insert_entry(&ContextEntry::new("s-now", "note", "loose observation"))
        .unwrap();

    let only_notes = assembler.build_smart_context("s-now", "backend", None, None);
    assert!(only_notes.contains("## Recent Session Notes"));

    let mut task = TaskSummary::new("s-now", "Wire up the queue");
    task.assignee = Some("backend".to_string());
    store.insert_task(&task).unwrap();

    let with_task = assembler.build_smart_context("s-now", "backend", None, None);
    assert!(with_task.contains("## Your Assigned Tasks"));
    assert!(!with_task.contains("## Recent Session Notes"));
}

/// Provider whose every call fails, simulating a dead embedding endpoint.
struct DeadProvider;

impl EmbeddingProvider for DeadProvider {
    fn dimensions(&self) -> usize {
        4
    }

    fn embed_batch(&self, _texts: &[String]) -> debrief::Result<Vec<Option<Vec<f32>>>> {
        Err(Error::OperationFailed {
            operation: "embed_batch".to_string(),
            cause: "connection refused".to_string(),
        })
    }
}

fn assembler_with_provider(
    store: &Arc<SqliteStore>,
    provider: Option<Box<dyn EmbeddingProvider>>,
) -> ContextAssembler {
    let config = DebriefConfig::default();
    let gateway = Arc::new(EmbeddingGateway::with_provider(
        Arc::clone(store),
        config.embedding.clone(),
        provider,
    ));
    ContextAssembler::with_gateway(Arc::clone(store), gateway, config)
}

#[test]
fn test_failing_provider_briefs_identically_to_disabled() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.insert_session("s-now", "proj").unwrap();
    store.insert_session("s-old", "proj").unwrap();
    for title in ["first finding", "second finding", "third finding"] {
        store
            .insert_mark(&Mark::new("s-old", "proj", "discovery", title))
            .unwrap();
    }

    let disabled = assembler_with_provider(&store, None);
    let failing = assembler_with_provider(&store, Some(Box::new(DeadProvider)));

    assert!(!disabled.is_embedding_enabled());
    assert!(failing.is_embedding_enabled());
    assert_eq!(
        disabled.build_smart_context("s-now", "backend", None, None),
        failing.build_smart_context("s-now", "backend", None, None)
    );
    assert_eq!(
        disabled.build_prompt_context("s-now"),
        failing.build_prompt_context("s-now")
    );
}

/// Provider that embeds every text to the same unit vector.
struct ConstantProvider;

impl EmbeddingProvider for ConstantProvider {
    fn dimensions(&self) -> usize {
        4
    }

    fn embed_batch(&self, texts: &[String]) -> debrief::Result<Vec<Option<Vec<f32>>>> {
        Ok(texts.iter().map(|_| Some(vec![1.0, 0.0, 0.0, 0.0])).collect())
    }
}

#[test]
fn test_backfill_is_idempotent_and_bounded_to_null_rows() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.insert_session("s-now", "proj").unwrap();
    for i in 0..5 {
        store
            .insert_mark(&Mark::new("s-now", "proj", "discovery", format!("mark {i}")))
            .unwrap();
    }

    let config = DebriefConfig {
        embedding: debrief::EmbeddingConfig {
            dimensions: 4,
            ..debrief::EmbeddingConfig::default()
        },
        ..DebriefConfig::default()
    };
    let gateway = Arc::new(EmbeddingGateway::with_provider(
        Arc::clone(&store),
        config.embedding.clone(),
        Some(Box::new(ConstantProvider)),
    ));
    let assembler = ContextAssembler::with_gateway(Arc::clone(&store), gateway, config);

    assert_eq!(assembler.backfill_embeddings().unwrap(), 5);
    assert_eq!(assembler.backfill_embeddings().unwrap(), 0);

    // New marks are picked up; existing embeddings stay untouched.
    store
        .insert_mark(&Mark::new("s-now", "proj", "discovery", "late arrival"))
        .unwrap();
    assert_eq!(assembler.backfill_embeddings().unwrap(), 1);
}

#[test]
fn test_pending_messages_reach_their_addressee_only() {
    let (store, assembler) = seeded();
    store
        .insert_message(&MessageSummary::new("proj", "backend", "schema is frozen"))
        .unwrap();

    let for_backend = assembler.build_smart_context("s-now", "backend", None, None);
    assert!(for_backend.contains("## Pending Messages"));
    assert!(for_backend.contains("schema is frozen"));

    let for_frontend = assembler.build_smart_context("s-now", "frontend", None, None);
    assert!(!for_frontend.contains("schema is frozen"));
}

#[test]
fn test_incomplete_task_warning_fires_once_per_window() {
    let (store, assembler) = seeded();
    let mut task = TaskSummary::new("s-now", "Finish the migration");
    task.assignee = Some("backend".to_string());
    store.insert_task(&task).unwrap();

    let throttle = NotifyThrottle::new(300);
    assert!(
        assembler
            .check_incomplete_tasks("s-now", "agent-7", "backend", &throttle)
            .is_some()
    );
    assert!(
        assembler
            .check_incomplete_tasks("s-now", "agent-7", "backend", &throttle)
            .is_none()
    );

    // A fresh throttle (new host process) is allowed to warn again.
    let fresh = NotifyThrottle::new(300);
    assert!(
        assembler
            .check_incomplete_tasks("s-now", "agent-7", "backend", &fresh)
            .is_some()
    );
}

#[test]
fn test_file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("projections.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.insert_session("s-now", "proj").unwrap();
        store
            .insert_mark(&Mark::new("s-now", "proj", "warning", "persisted mark"))
            .unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    store.insert_session("s-later", "proj").unwrap();
    let assembler = ContextAssembler::new(store, DebriefConfig::default());
    let briefing = assembler.build_prompt_context("s-later");
    assert!(briefing.contains("persisted mark"));
}

#[test]
fn test_completed_agent_summaries_in_prompt_context() {
    let (store, assembler) = seeded();
    let mut agent = AgentSummary::new("s-now", "researcher");
    agent.status = AgentStatus::Completed;
    agent.summary = Some("catalogued all the edge cases".to_string());
    store.insert_agent(&agent).unwrap();

    let briefing = assembler.build_prompt_context("s-now");
    assert!(briefing.contains("## Completed Agents"));
    assert!(briefing.contains("catalogued all the edge cases"));
}
