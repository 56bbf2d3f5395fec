//! Relevance cascade for mark retrieval.
//!
//! A cascade is an ordered list of strategies with one contract: produce the
//! marks this strategy considers relevant, or an error. The driver runs them
//! in order and returns the first non-empty result; an error or an empty
//! result both degrade to the next strategy, so a briefing always gets the
//! best evidence currently reachable and never a failure.
//!
//! Strategy order encodes relevance confidence: file overlap (strongest
//! signal), sibling-session marks, vector similarity when available, and
//! project-wide recency as the floor. Every strategy excludes the current
//! session and promoted or resolved marks at the query level.

use crate::config::ContextConfig;
use crate::embedding::{EmbeddingGateway, cosine_similarity};
use crate::models::Mark;
use crate::observability::CASCADE_DEGRADATION_COUNTER;
use crate::storage::SqliteStore;
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Candidate scan cap for the vector-similarity strategy. Bounds in-process
/// ranking work when no similarity index is built yet.
const RAG_SCAN_CAP: usize = 200;

/// A labeled retrieval strategy.
type Strategy<'a> = (&'static str, Box<dyn FnOnce() -> Result<Vec<Mark>> + 'a>);

/// Mark retrieval over the store and the embedding gateway.
pub struct MarkRetriever {
    store: Arc<SqliteStore>,
    gateway: Arc<EmbeddingGateway>,
    config: ContextConfig,
}

impl MarkRetriever {
    /// Creates a retriever.
    #[must_use]
    pub fn new(
        store: Arc<SqliteStore>,
        gateway: Arc<EmbeddingGateway>,
        config: ContextConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Runs strategies in order, returning the first non-empty result.
    ///
    /// Strategy errors are logged and counted, then treated like empty
    /// results; the cascade itself never fails.
    fn run_cascade(strategies: Vec<Strategy<'_>>) -> Vec<Mark> {
        for (label, run) in strategies {
            match run() {
                Ok(marks) if !marks.is_empty() => {
                    tracing::debug!(strategy = label, count = marks.len(), "cascade hit");
                    return marks;
                },
                Ok(_) => {
                    tracing::debug!(strategy = label, "strategy empty; trying next");
                },
                Err(e) => {
                    tracing::warn!(strategy = label, error = %e, "strategy failed; trying next");
                    metrics::counter!(CASCADE_DEGRADATION_COUNTER, "strategy" => label)
                        .increment(1);
                },
            }
        }
        Vec::new()
    }

    /// Marks from other sessions that touched any of the given files.
    ///
    /// An empty file set yields an empty result; the overlap signal either
    /// exists or it does not, and this level never substitutes a weaker one.
    #[must_use]
    pub fn file_overlap_marks(
        &self,
        project: &str,
        exclude_session: &str,
        files: &[String],
        limit: usize,
    ) -> Vec<Mark> {
        if files.is_empty() {
            return Vec::new();
        }
        Self::run_cascade(vec![(
            "file_overlap",
            Box::new(|| {
                self.store
                    .file_overlap_marks(project, exclude_session, files, limit)
            }),
        )])
    }

    /// Marks authored by other agents of the same session, restricted to the
    /// same parent when one is given.
    #[must_use]
    pub fn sibling_marks(
        &self,
        session_id: &str,
        exclude_agent: &str,
        parent_id: Option<&str>,
        limit: usize,
    ) -> Vec<Mark> {
        Self::run_cascade(vec![(
            "sibling_marks",
            Box::new(|| {
                self.store
                    .session_marks(session_id, exclude_agent, parent_id, limit)
            }),
        )])
    }

    /// Most recent marks across the project, excluding one session. The
    /// cascade floor.
    #[must_use]
    pub fn project_marks(&self, project: &str, exclude_session: &str, limit: usize) -> Vec<Mark> {
        Self::run_cascade(vec![(
            "project_recency",
            Box::new(|| self.store.project_marks(project, exclude_session, limit)),
        )])
    }

    /// Vector-similarity retrieval with automatic degradation to project
    /// recency. A disabled gateway, a failed query embedding, a store error,
    /// or zero similar marks all fall through silently.
    #[must_use]
    pub fn relevant_marks(
        &self,
        project: &str,
        exclude_session: &str,
        query_text: &str,
        limit: usize,
    ) -> Vec<Mark> {
        Self::run_cascade(vec![
            (
                "vector_similarity",
                Box::new(|| self.vector_similarity(project, exclude_session, query_text, limit)),
            ),
            (
                "project_recency",
                Box::new(move || self.store.project_marks(project, exclude_session, limit)),
            ),
        ])
    }

    /// The full past-marks cascade used for briefing assembly: file overlap,
    /// then vector similarity, then project recency.
    #[must_use]
    pub fn past_marks(
        &self,
        project: &str,
        exclude_session: &str,
        files: &[String],
        query_text: &str,
        limit: usize,
    ) -> Vec<Mark> {
        let mut strategies: Vec<Strategy<'_>> = Vec::with_capacity(3);
        if !files.is_empty() {
            strategies.push((
                "file_overlap",
                Box::new(move || {
                    self.store
                        .file_overlap_marks(project, exclude_session, files, limit)
                }),
            ));
        }
        strategies.push((
            "vector_similarity",
            Box::new(move || self.vector_similarity(project, exclude_session, query_text, limit)),
        ));
        strategies.push((
            "project_recency",
            Box::new(move || self.store.project_marks(project, exclude_session, limit)),
        ));
        Self::run_cascade(strategies)
    }

    /// Ranks embedded project marks by ascending cosine distance from the
    /// query text's embedding.
    ///
    /// Empty results (including "embedding disabled") are the degradation
    /// signal; only store failures surface as errors.
    fn vector_similarity(
        &self,
        project: &str,
        exclude_session: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<Mark>> {
        if !self.gateway.is_enabled() || query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let Some(query) = self.gateway.embed_one(query_text) else {
            return Ok(Vec::new());
        };

        let candidates =
            self.store
                .embedded_project_marks(project, exclude_session, RAG_SCAN_CAP)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(Mark, f32)> =
            if let Some(hits) = self.gateway.similar_mark_ids(&query, RAG_SCAN_CAP) {
                let distance_by_id: HashMap<&str, f32> =
                    hits.iter().map(|(id, d)| (id.as_str(), *d)).collect();
                candidates
                    .into_iter()
                    .filter_map(|mark| {
                        distance_by_id
                            .get(mark.id.as_str())
                            .copied()
                            .map(|d| (mark, d))
                    })
                    .collect()
            } else {
                candidates
                    .into_iter()
                    .filter_map(|mark| {
                        mark.embedding
                            .as_deref()
                            .map(|e| 1.0 - cosine_similarity(&query, e))
                            .map(|d| (mark, d))
                    })
                    .collect()
            };

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(mark, _)| mark).collect())
    }

    /// The configured default mark limit.
    #[must_use]
    pub const fn default_limit(&self) -> usize {
        self.config.default_limit
    }
}

/// Removes duplicate mark ids across composed strategy results, keeping the
/// earliest occurrence.
#[must_use]
pub fn dedup_marks(marks: Vec<Mark>) -> Vec<Mark> {
    let mut seen = HashSet::new();
    marks
        .into_iter()
        .filter(|mark| seen.insert(mark.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::EmbeddingProvider;
    use crate::models::{Mark, MarkStatus};
    use crate::Error;

    /// Provider that embeds by keyword lookup; unknown texts fail.
    struct KeywordProvider;

    impl EmbeddingProvider for KeywordProvider {
        fn dimensions(&self) -> usize {
            3
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
            texts
                .iter()
                .map(|text| {
                    if text.contains("database") {
                        Ok(Some(vec![1.0, 0.0, 0.0]))
                    } else if text.contains("frontend") {
                        Ok(Some(vec![0.0, 1.0, 0.0]))
                    } else {
                        Err(Error::op("embed_batch", "unknown keyword"))
                    }
                })
                .collect()
        }
    }

    fn store_with_sessions() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.insert_session("s-old", "p1").unwrap();
        store.insert_session("s-now", "p1").unwrap();
        store
    }

    fn retriever(store: &Arc<SqliteStore>, enabled: bool) -> MarkRetriever {
        let config = EmbeddingConfig {
            dimensions: 3,
            ..EmbeddingConfig::default()
        };
        let provider: Option<Box<dyn EmbeddingProvider>> = if enabled {
            Some(Box::new(KeywordProvider))
        } else {
            None
        };
        let gateway = Arc::new(EmbeddingGateway::with_provider(
            Arc::clone(store),
            config,
            provider,
        ));
        MarkRetriever::new(Arc::clone(store), gateway, ContextConfig::default())
    }

    fn insert_mark(store: &SqliteStore, session: &str, title: &str) -> Mark {
        let mark = Mark::new(session, "p1", "discovery", title);
        store.insert_mark(&mark).unwrap();
        mark
    }

    #[test]
    fn test_empty_file_set_yields_empty_without_fallback() {
        let store = store_with_sessions();
        insert_mark(&store, "s-old", "something recent");

        let retriever = retriever(&store, false);
        assert!(retriever.file_overlap_marks("p1", "s-now", &[], 5).is_empty());
    }

    #[test]
    fn test_file_overlap_preferred_over_project_recency() {
        let store = store_with_sessions();
        let mut touched = Mark::new("s-old", "p1", "warning", "touched the file");
        touched.files_modified = vec!["src/db.rs".to_string()];
        store.insert_mark(&touched).unwrap();
        insert_mark(&store, "s-old", "unrelated but newer");

        let retriever = retriever(&store, false);
        let files = vec!["src/db.rs".to_string()];
        let marks = retriever.past_marks("p1", "s-now", &files, "anything", 5);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].title, "touched the file");
    }

    #[test]
    fn test_disabled_rag_equals_project_recency() {
        let store = store_with_sessions();
        insert_mark(&store, "s-old", "alpha");
        insert_mark(&store, "s-old", "beta");

        let retriever = retriever(&store, false);
        let via_rag = retriever.relevant_marks("p1", "s-now", "database work", 5);
        let via_recency = retriever.project_marks("p1", "s-now", 5);

        let rag_ids: Vec<_> = via_rag.iter().map(|m| m.id.as_str()).collect();
        let recency_ids: Vec<_> = via_recency.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(rag_ids, recency_ids);
    }

    #[test]
    fn test_rag_ranks_by_similarity() {
        let store = store_with_sessions();
        let db_mark = insert_mark(&store, "s-old", "database tuning");
        let ui_mark = insert_mark(&store, "s-old", "frontend layout");
        store
            .set_mark_embedding(&db_mark.id, &[1.0, 0.0, 0.0])
            .unwrap();
        store
            .set_mark_embedding(&ui_mark.id, &[0.0, 1.0, 0.0])
            .unwrap();

        let retriever = retriever(&store, true);
        let marks = retriever.relevant_marks("p1", "s-now", "database migration", 5);
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].title, "database tuning");
        assert_eq!(marks[1].title, "frontend layout");
    }

    #[test]
    fn test_rag_embed_failure_degrades_to_recency() {
        let store = store_with_sessions();
        let mark = insert_mark(&store, "s-old", "database tuning");
        store
            .set_mark_embedding(&mark.id, &[1.0, 0.0, 0.0])
            .unwrap();

        // "mystery" hits the provider's failure branch.
        let retriever = retriever(&store, true);
        let marks = retriever.relevant_marks("p1", "s-now", "mystery topic", 5);
        assert_eq!(marks.len(), 1);
    }

    #[test]
    fn test_strategies_exclude_promoted_and_resolved() {
        let store = store_with_sessions();
        let promoted = insert_mark(&store, "s-old", "promoted away");
        store.set_mark_promoted(&promoted.id, "rule-1").unwrap();
        let resolved = insert_mark(&store, "s-old", "already resolved");
        store
            .set_mark_status(&resolved.id, MarkStatus::Resolved)
            .unwrap();
        insert_mark(&store, "s-old", "still active");

        let retriever = retriever(&store, false);
        let marks = retriever.project_marks("p1", "s-now", 10);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].title, "still active");
    }

    #[test]
    fn test_sibling_marks_exclude_own_agent() {
        let store = store_with_sessions();
        let mut own = Mark::new("s-now", "p1", "warning", "mine");
        own.agent_name = Some("backend".to_string());
        store.insert_mark(&own).unwrap();
        let mut sibling = Mark::new("s-now", "p1", "warning", "theirs");
        sibling.agent_name = Some("frontend".to_string());
        store.insert_mark(&sibling).unwrap();

        let retriever = retriever(&store, false);
        let marks = retriever.sibling_marks("s-now", "backend", None, 5);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].title, "theirs");
    }

    #[test]
    fn test_dedup_marks_keeps_earliest() {
        let first = Mark::new("s1", "p1", "warning", "first");
        let mut duplicate = Mark::new("s1", "p1", "warning", "later copy");
        duplicate.id = first.id.clone();
        let other = Mark::new("s1", "p1", "warning", "other");

        let deduped = dedup_marks(vec![first.clone(), duplicate, other]);
        let titles: Vec<_> = deduped.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "other"]);
    }
}
