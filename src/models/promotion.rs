//! Promotion candidate projection.

use super::MarkId;
use serde::{Deserialize, Serialize};

/// A concept recurring across sessions, recommended for promotion into a
/// durable project rule.
///
/// Derived by aggregation, never persisted — the external curation workflow
/// performs the actual promotion write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionCandidate {
    /// The recurring concept label.
    pub concept: String,
    /// Total occurrences across eligible marks.
    pub count: usize,
    /// Number of distinct sessions the concept appeared in.
    pub session_count: usize,
    /// Contributing mark ids, most-recent-first.
    pub mark_ids: Vec<MarkId>,
    /// Deduplicated sample of contributing mark titles.
    pub sample_titles: Vec<String>,
    /// Deduplicated sample of contributing mark types.
    pub sample_types: Vec<String>,
}
