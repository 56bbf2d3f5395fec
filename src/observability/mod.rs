//! Logging initialization and the metric-name catalog.
//!
//! The crate emits through the `tracing` and `metrics` facades only; exporter
//! wiring belongs to the host process. [`init_logging`] is a convenience for
//! hosts without their own subscriber (hook handlers, test harnesses).

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Counter: source query failures, labeled by query name.
pub const SOURCE_FAILURE_COUNTER: &str = "debrief_source_failure_total";

/// Counter: cascade strategy degradations, labeled by strategy name.
pub const CASCADE_DEGRADATION_COUNTER: &str = "debrief_cascade_degradation_total";

/// Counter: whole-batch embedding provider failures.
pub const EMBEDDING_FAILURE_COUNTER: &str = "debrief_embedding_failure_total";

/// Counter: provider vectors discarded for wrong shape or non-finite values.
pub const INVALID_VECTOR_COUNTER: &str = "debrief_embedding_invalid_vector_total";

/// Counter: similarity-index construction failures.
pub const INDEX_BUILD_FAILURE_COUNTER: &str = "debrief_index_build_failure_total";

/// Counter: briefings that hit the budget and dropped trailing sections.
pub const SECTIONS_DROPPED_COUNTER: &str = "debrief_sections_dropped_total";

/// Counter: store mutex poison recoveries.
pub const MUTEX_POISON_COUNTER: &str = "debrief_sqlite_mutex_poison_recovery_total";

static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Installs a `tracing-subscriber` fmt subscriber once per process.
///
/// Respects `RUST_LOG`; defaults to `debrief=info`. Does nothing if a global
/// subscriber is already installed.
pub fn init_logging() {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("debrief=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_counter_names_share_prefix() {
        for name in [
            SOURCE_FAILURE_COUNTER,
            CASCADE_DEGRADATION_COUNTER,
            EMBEDDING_FAILURE_COUNTER,
            INVALID_VECTOR_COUNTER,
            INDEX_BUILD_FAILURE_COUNTER,
            SECTIONS_DROPPED_COUNTER,
            MUTEX_POISON_COUNTER,
        ] {
            assert!(name.starts_with("debrief_"));
        }
    }
}
