//! Promotion mining.
//!
//! Aggregates concept recurrence across a project's marks into promotion
//! candidates. Unlike the briefing paths, mining propagates failures: the
//! candidate report feeds a user-facing curation workflow, and a silently
//! empty report would read as "nothing to promote".

use crate::models::{Mark, PromotionCandidate};
use crate::storage::SqliteStore;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Cap on sample titles/types carried per candidate.
const SAMPLE_CAP: usize = 5;

/// Mines recurring concepts for promotion into durable project rules.
pub struct PromotionMiner {
    store: Arc<SqliteStore>,
}

/// Per-concept aggregation state.
#[derive(Default)]
struct ConceptGroup {
    count: usize,
    sessions: Vec<String>,
    mark_indexes: Vec<usize>,
}

impl PromotionMiner {
    /// Creates a miner over a store.
    #[must_use]
    pub const fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Finds concepts recurring at least `min_occurrences` times across at
    /// least `min_distinct_sessions` sessions of a project.
    ///
    /// Eligible marks are all non-promoted marks with a non-empty concept
    /// set; resolved marks still count. Candidates are ordered by occurrence
    /// count descending, then concept ascending for determinism. Thresholds
    /// below 1 are clamped to 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails.
    pub fn find_promotion_candidates(
        &self,
        project: &str,
        min_occurrences: usize,
        min_distinct_sessions: usize,
    ) -> Result<Vec<PromotionCandidate>> {
        let min_occurrences = clamp_threshold("min_occurrences", min_occurrences);
        let min_distinct_sessions =
            clamp_threshold("min_distinct_sessions", min_distinct_sessions);

        // Most-recent-first from the store; every downstream ordering
        // (mark_ids, samples) inherits it by iterating in index order.
        let marks = self.store.minable_marks(project)?;

        let mut groups: HashMap<&str, ConceptGroup> = HashMap::new();
        for (index, mark) in marks.iter().enumerate() {
            for concept in &mark.concepts {
                let group = groups.entry(concept.as_str()).or_default();
                group.count += 1;
                if !group.sessions.contains(&mark.session_id) {
                    group.sessions.push(mark.session_id.clone());
                }
                group.mark_indexes.push(index);
            }
        }

        let mut candidates: Vec<PromotionCandidate> = groups
            .into_iter()
            .filter(|(_, group)| {
                group.count >= min_occurrences && group.sessions.len() >= min_distinct_sessions
            })
            .map(|(concept, group)| build_candidate(concept, &group, &marks))
            .collect();

        candidates.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.concept.cmp(&b.concept)));

        tracing::debug!(
            project,
            candidates = candidates.len(),
            scanned = marks.len(),
            "promotion mining pass done"
        );
        Ok(candidates)
    }
}

fn build_candidate(concept: &str, group: &ConceptGroup, marks: &[Mark]) -> PromotionCandidate {
    let mut sample_titles = Vec::new();
    let mut sample_types = Vec::new();
    let mut mark_ids = Vec::with_capacity(group.mark_indexes.len());

    for &index in &group.mark_indexes {
        let mark = &marks[index];
        mark_ids.push(mark.id.clone());
        if sample_titles.len() < SAMPLE_CAP && !sample_titles.contains(&mark.title) {
            sample_titles.push(mark.title.clone());
        }
        if sample_types.len() < SAMPLE_CAP && !sample_types.contains(&mark.mark_type) {
            sample_types.push(mark.mark_type.clone());
        }
    }

    PromotionCandidate {
        concept: concept.to_string(),
        count: group.count,
        session_count: group.sessions.len(),
        mark_ids,
        sample_titles,
        sample_types,
    }
}

/// Clamps a mining threshold to at least 1; zero would promote everything.
fn clamp_threshold(name: &str, value: usize) -> usize {
    if value < 1 {
        tracing::warn!(threshold = name, value, "threshold below 1; clamping to 1");
        return 1;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mark, MarkStatus};

    fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.insert_session("s1", "p1").unwrap();
        store.insert_session("s2", "p1").unwrap();
        store
    }

    fn mark_with_concepts(session: &str, title: &str, concepts: &[&str]) -> Mark {
        let mut mark = Mark::new(session, "p1", "discovery", title);
        mark.concepts = concepts.iter().map(ToString::to_string).collect();
        mark
    }

    #[test]
    fn test_thresholds_filter_candidates() {
        let store = seeded_store();
        store
            .insert_mark(&mark_with_concepts("s1", "a", &["duckdb"]))
            .unwrap();
        store
            .insert_mark(&mark_with_concepts("s1", "b", &["duckdb"]))
            .unwrap();
        store
            .insert_mark(&mark_with_concepts("s2", "c", &["duckdb", "sqlite"]))
            .unwrap();

        let miner = PromotionMiner::new(store);

        let candidates = miner.find_promotion_candidates("p1", 3, 2).unwrap();
        assert_eq!(candidates.len(), 1);
        let duckdb = &candidates[0];
        assert_eq!(duckdb.concept, "duckdb");
        assert_eq!(duckdb.count, 3);
        assert_eq!(duckdb.session_count, 2);
        assert_eq!(duckdb.mark_ids.len(), 3);

        // sqlite appears once in one session: filtered by either threshold.
        assert_eq!(miner.find_promotion_candidates("p1", 1, 2).unwrap().len(), 1);
        let relaxed = miner.find_promotion_candidates("p1", 1, 1).unwrap();
        assert_eq!(relaxed.len(), 2);
    }

    #[test]
    fn test_ordering_count_desc_then_concept_asc() {
        let store = seeded_store();
        for title in ["a", "b"] {
            store
                .insert_mark(&mark_with_concepts("s1", title, &["zeta", "alpha"]))
                .unwrap();
        }

        let miner = PromotionMiner::new(store);
        let candidates = miner.find_promotion_candidates("p1", 1, 1).unwrap();
        let concepts: Vec<_> = candidates.iter().map(|c| c.concept.as_str()).collect();
        assert_eq!(concepts, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_resolved_marks_mine_but_promoted_do_not() {
        let store = seeded_store();

        let resolved = mark_with_concepts("s1", "resolved one", &["retry-policy"]);
        store.insert_mark(&resolved).unwrap();
        store
            .set_mark_status(&resolved.id, MarkStatus::Resolved)
            .unwrap();

        let promoted = mark_with_concepts("s2", "promoted one", &["retry-policy"]);
        store.insert_mark(&promoted).unwrap();
        store.set_mark_promoted(&promoted.id, "rule-9").unwrap();

        let miner = PromotionMiner::new(store);
        let candidates = miner.find_promotion_candidates("p1", 1, 1).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].count, 1);
        assert_eq!(candidates[0].sample_titles, vec!["resolved one"]);
    }

    #[test]
    fn test_zero_thresholds_clamp_to_one() {
        let store = seeded_store();
        store
            .insert_mark(&mark_with_concepts("s1", "a", &["solo"]))
            .unwrap();

        let miner = PromotionMiner::new(store);
        let candidates = miner.find_promotion_candidates("p1", 0, 0).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_marks_without_concepts_are_ignored() {
        let store = seeded_store();
        store
            .insert_mark(&Mark::new("s1", "p1", "discovery", "no concepts"))
            .unwrap();

        let miner = PromotionMiner::new(store);
        assert!(miner.find_promotion_candidates("p1", 1, 1).unwrap().is_empty());
    }
}
