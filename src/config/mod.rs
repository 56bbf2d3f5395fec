//! Configuration for the briefing engine.
//!
//! All state with a lifecycle is constructed explicitly from these structs at
//! process start — there are no module-level mutable globals. Environment
//! loading is a convenience for hosts that configure via `.env`.

use secrecy::SecretString;

/// Environment variable holding the embedding provider API key.
pub const API_KEY_ENV: &str = "DEBRIEF_EMBEDDING_API_KEY";

/// Embedding gateway configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Provider API key. Absent ⇒ the gateway is disabled.
    pub api_key: Option<SecretString>,
    /// Provider base URL (OpenAI-compatible `/embeddings` endpoint).
    pub base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Expected vector dimension; anything else is rejected.
    pub dimensions: usize,
    /// Hard per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Texts per provider request during backfill.
    pub batch_size: usize,
    /// Character ceiling for embeddable text (provider-token-budget-driven).
    pub max_text_chars: usize,
    /// Minimum embedded-mark corpus size before the similarity index is built.
    pub min_index_corpus: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_ms: 2_000,
            batch_size: 20,
            max_text_chars: 2_000,
            min_index_corpus: 10,
        }
    }
}

/// Context assembler configuration.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Character ceiling for a rendered briefing.
    pub char_budget: usize,
    /// Default row limit for bounded source queries.
    pub default_limit: usize,
    /// Row limit for open-task sections.
    pub open_task_limit: usize,
    /// Row limit for pending-message sections.
    pub message_limit: usize,
    /// Suppression window for repeated incomplete-task warnings, in seconds.
    pub notify_window_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            char_budget: 6_000,
            default_limit: 5,
            open_task_limit: 10,
            message_limit: 10,
            notify_window_secs: 300,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct DebriefConfig {
    /// Embedding gateway settings.
    pub embedding: EmbeddingConfig,
    /// Context assembler settings.
    pub context: ContextConfig,
}

impl DebriefConfig {
    /// Loads configuration from the environment, honoring a `.env` file.
    ///
    /// Unset variables keep their defaults; malformed numeric values are
    /// ignored rather than fatal, since briefing construction must not be
    /// blocked by a bad override.
    #[must_use]
    pub fn from_env() -> Self {
        // Missing .env is the common case, not an error.
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            config.embedding.api_key = Some(SecretString::from(key));
        }
        if let Ok(url) = std::env::var("DEBRIEF_EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("DEBRIEF_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        read_usize("DEBRIEF_EMBEDDING_DIMENSIONS", &mut config.embedding.dimensions);
        read_u64("DEBRIEF_EMBEDDING_TIMEOUT_MS", &mut config.embedding.timeout_ms);
        read_usize("DEBRIEF_EMBEDDING_BATCH_SIZE", &mut config.embedding.batch_size);
        read_usize("DEBRIEF_CONTEXT_CHAR_BUDGET", &mut config.context.char_budget);
        read_usize("DEBRIEF_MESSAGE_LIMIT", &mut config.context.message_limit);
        read_u64("DEBRIEF_NOTIFY_WINDOW_SECS", &mut config.context.notify_window_secs);

        config
    }
}

/// Reads a `usize` env override into `slot`, warning on malformed values.
fn read_usize(var: &str, slot: &mut usize) {
    if let Ok(raw) = std::env::var(var) {
        apply_parsed(var, &raw, slot);
    }
}

/// Reads a `u64` env override into `slot`, warning on malformed values.
fn read_u64(var: &str, slot: &mut u64) {
    if let Ok(raw) = std::env::var(var) {
        apply_parsed(var, &raw, slot);
    }
}

/// Applies a parsed override, keeping the existing value on parse failure.
fn apply_parsed<T: std::str::FromStr>(var: &str, raw: &str, slot: &mut T) {
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(var, value = %raw, "ignoring malformed numeric override"),
    }
}
