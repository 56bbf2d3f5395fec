//! # Debrief
//!
//! Bounded, relevance-ranked context briefings for multi-agent AI coding sessions.
//!
//! Debrief assembles a single budgeted briefing string from many independently
//! failing sources — agent summaries, session notes, tasks, messages, and
//! durable "marks" — and injects it at agent lifecycle checkpoints (agent
//! start, prompt submission). A separate mining pass aggregates recurring
//! concepts across sessions into promotion candidates for durable project
//! rules.
//!
//! ## Guarantees
//!
//! - Bounded output size (character budget, priority-ordered sections)
//! - Bounded latency (the only remote call has its own hard timeout)
//! - Graceful degradation (a failing source omits its section, never aborts)
//!
//! ## Example
//!
//! ```rust,ignore
//! use debrief::{ContextAssembler, DebriefConfig, SqliteStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open("projections.db")?);
//! let assembler = ContextAssembler::new(store, DebriefConfig::default());
//! let briefing = assembler.build_smart_context("s1", "backend", None, None);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod assembler;
pub mod cascade;
pub mod config;
pub mod embedding;
pub mod miner;
pub mod models;
pub mod observability;
pub mod queries;
pub mod storage;

// Re-exports for convenience
pub use assembler::{ContextAssembler, NotifyThrottle};
pub use cascade::MarkRetriever;
pub use config::{ContextConfig, DebriefConfig, EmbeddingConfig};
pub use embedding::{EmbeddingGateway, EmbeddingProvider};
pub use miner::PromotionMiner;
pub use models::{
    AgentStatus, AgentSummary, ContextEntry, Mark, MarkId, MarkStatus, MessageStatus,
    MessageSummary, PromotionCandidate, TaskStatus, TaskSummary,
};
pub use queries::{Scope, SourceQueries};
pub use storage::SqliteStore;

/// Error type for debrief operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed stored rows, malformed provider payloads |
/// | `OperationFailed` | Store queries fail, provider calls fail or time out |
///
/// The two briefing entry points never surface these errors to callers; they
/// are recovered internally as empty sections. The promotion miner propagates
/// them, since candidate counts feed a user-facing curation report.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A stored row fails to parse into its projection type
    /// - An embedding provider response payload is malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail to prepare or execute
    /// - The embedding provider returns a non-success status or times out
    /// - Similarity-index construction fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Shorthand for an [`Error::OperationFailed`] with the given label.
    pub(crate) fn op(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for debrief operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized to avoid duplicate implementations across the codebase.
/// Uses `SystemTime::now()` with fallback to 0 if the system clock is before
/// the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use debrief::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
