//! Promotion mining over an in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use debrief::{Mark, MarkStatus, PromotionMiner, SqliteStore};
use std::sync::Arc;

fn seeded() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.insert_session("s1", "proj").unwrap();
    store.insert_session("s2", "proj").unwrap();
    store
}

fn concept_mark(session: &str, title: &str, concepts: &[&str]) -> Mark {
    let mut mark = Mark::new(session, "proj", "discovery", title);
    mark.concepts = concepts.iter().map(ToString::to_string).collect();
    mark
}

#[test]
fn test_recurring_concept_becomes_candidate() {
    let store = seeded();

    // "duckdb" shows up three times across two sessions; "csv" only once.
    let first = concept_mark("s1", "duckdb chokes on huge varchar", &["duckdb"]);
    let second = concept_mark("s1", "duckdb needs explicit threads", &["duckdb"]);
    let third = concept_mark("s2", "duckdb again, csv import", &["duckdb", "csv"]);
    for mark in [&first, &second, &third] {
        store.insert_mark(mark).unwrap();
    }

    let miner = PromotionMiner::new(Arc::clone(&store));
    let candidates = miner.find_promotion_candidates("proj", 3, 2).unwrap();

    assert_eq!(candidates.len(), 1);
    let duckdb = &candidates[0];
    assert_eq!(duckdb.concept, "duckdb");
    assert_eq!(duckdb.count, 3);
    assert_eq!(duckdb.session_count, 2);
    assert_eq!(duckdb.mark_ids.len(), 3);
    // Most-recent-first: the last inserted mark leads.
    assert_eq!(duckdb.mark_ids[0], third.id);
    assert!(duckdb.sample_titles.contains(&first.title));
}

#[test]
fn test_single_session_recurrence_is_filtered() {
    let store = seeded();
    for title in ["one", "two", "three"] {
        store
            .insert_mark(&concept_mark("s1", title, &["retry-policy"]))
            .unwrap();
    }

    let miner = PromotionMiner::new(store);
    assert!(miner.find_promotion_candidates("proj", 3, 2).unwrap().is_empty());
    assert_eq!(miner.find_promotion_candidates("proj", 3, 1).unwrap().len(), 1);
}

#[test]
fn test_promoted_marks_leave_the_mining_pool() {
    let store = seeded();
    let kept = concept_mark("s1", "kept", &["timeouts"]);
    let gone = concept_mark("s2", "gone", &["timeouts"]);
    store.insert_mark(&kept).unwrap();
    store.insert_mark(&gone).unwrap();
    store.set_mark_promoted(&gone.id, "rule-3").unwrap();

    let miner = PromotionMiner::new(store);
    let candidates = miner.find_promotion_candidates("proj", 1, 1).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].count, 1);
    assert_eq!(candidates[0].mark_ids, vec![kept.id.clone()]);
}

#[test]
fn test_resolved_marks_still_mine() {
    let store = seeded();
    let resolved = concept_mark("s1", "resolved finding", &["locking"]);
    store.insert_mark(&resolved).unwrap();
    store
        .set_mark_status(&resolved.id, MarkStatus::Resolved)
        .unwrap();
    store
        .insert_mark(&concept_mark("s2", "active finding", &["locking"]))
        .unwrap();

    let miner = PromotionMiner::new(store);
    let candidates = miner.find_promotion_candidates("proj", 2, 2).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].count, 2);
}

#[test]
fn test_unknown_project_yields_no_candidates() {
    let store = seeded();
    store
        .insert_mark(&concept_mark("s1", "something", &["anything"]))
        .unwrap();

    let miner = PromotionMiner::new(store);
    assert!(miner.find_promotion_candidates("other-proj", 1, 1).unwrap().is_empty());
}
