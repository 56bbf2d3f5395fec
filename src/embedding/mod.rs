//! Embedding gateway.
//!
//! Converts mark text into fixed-dimension vectors through an external
//! provider and maintains a similarity index over stored vectors. The gateway
//! is disabled entirely when provider credentials are absent; callers check
//! [`EmbeddingGateway::is_enabled`] before attempting RAG and treat disabled
//! as equivalent to provider failure.

mod index;
mod openai;

pub use index::{LinearIndex, VectorIndex, build_index};
pub use openai::OpenAiEmbeddingProvider;

use crate::Result;
use crate::config::EmbeddingConfig;
use crate::models::{Mark, MarkId};
use crate::observability::{
    EMBEDDING_FAILURE_COUNTER, INDEX_BUILD_FAILURE_COUNTER, INVALID_VECTOR_COUNTER,
};
use crate::storage::SqliteStore;
use std::sync::{Arc, RwLock};

/// Trait for embedding providers.
///
/// A provider turns a batch of texts into one optional vector per input
/// text. Implementations report failures as `Err`; the gateway converts
/// every failure mode into per-input `None` before anything reaches a
/// caller.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the provider's embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates embeddings for a batch of texts, one optional vector per
    /// input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails as a whole (timeout,
    /// non-success response, malformed payload).
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths, empty, or zero-norm vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Builds the embeddable text for a mark: title, optional narrative, and
/// the concept list, capped at the configured character ceiling to bound
/// provider cost.
#[must_use]
pub fn embeddable_text(mark: &Mark, max_chars: usize) -> String {
    let mut text = mark.title.clone();
    if let Some(narrative) = mark.narrative.as_deref()
        && !narrative.trim().is_empty()
    {
        text.push('\n');
        text.push_str(narrative);
    }
    if !mark.concepts.is_empty() {
        text.push('\n');
        text.push_str(&mark.concepts.join(", "));
    }
    truncate_chars(&text, max_chars)
}

/// Truncates a string to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Validates a provider vector: exact expected dimension, all-finite
/// components.
fn valid_vector(vector: &[f32], dimensions: usize) -> bool {
    vector.len() == dimensions && vector.iter().all(|v| v.is_finite())
}

/// Gateway over the embedding provider and the similarity index.
pub struct EmbeddingGateway {
    store: Arc<SqliteStore>,
    provider: Option<Box<dyn EmbeddingProvider>>,
    config: EmbeddingConfig,
    /// Lazily built similarity index; `None` until the corpus is large
    /// enough and construction succeeds.
    index: RwLock<Option<Box<dyn VectorIndex>>>,
}

impl EmbeddingGateway {
    /// Creates a gateway, constructing the HTTP provider when credentials
    /// are configured.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, config: EmbeddingConfig) -> Self {
        let provider = OpenAiEmbeddingProvider::from_config(&config)
            .map(|p| Box::new(p) as Box<dyn EmbeddingProvider>);
        Self::with_provider(store, config, provider)
    }

    /// Creates a gateway over an explicit provider (test doubles, alternate
    /// backends).
    #[must_use]
    pub fn with_provider(
        store: Arc<SqliteStore>,
        config: EmbeddingConfig,
        provider: Option<Box<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            index: RwLock::new(None),
        }
    }

    /// Whether embedding is available at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Embeds a batch of texts, returning one optional vector per input.
    ///
    /// Never errors: a disabled gateway, provider failure, or invalid
    /// returned vector becomes `None` for the affected inputs.
    #[must_use]
    pub fn embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let Some(provider) = self.provider.as_deref() else {
            return vec![None; texts.len()];
        };
        if texts.is_empty() {
            return Vec::new();
        }

        match provider.embed_batch(texts) {
            Ok(vectors) => {
                let mut out: Vec<Option<Vec<f32>>> = vectors
                    .into_iter()
                    .map(|slot| {
                        slot.filter(|vector| {
                            let ok = valid_vector(vector, self.config.dimensions);
                            if !ok {
                                metrics::counter!(INVALID_VECTOR_COUNTER).increment(1);
                                tracing::warn!(
                                    expected = self.config.dimensions,
                                    got = vector.len(),
                                    "discarding invalid embedding vector"
                                );
                            }
                            ok
                        })
                    })
                    .collect();
                // A short response leaves trailing inputs unembedded.
                out.resize_with(texts.len(), || None);
                out
            },
            Err(e) => {
                tracing::warn!(error = %e, batch = texts.len(), "embedding provider call failed");
                metrics::counter!(EMBEDDING_FAILURE_COUNTER).increment(1);
                vec![None; texts.len()]
            },
        }
    }

    /// Embeds a single text.
    #[must_use]
    pub fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        self.embed(std::slice::from_ref(&text.to_string()))
            .into_iter()
            .next()
            .flatten()
    }

    /// Scans for marks missing an embedding and fills them in fixed-size
    /// batches. Idempotent (only null fields are targeted) and safe to run
    /// concurrently with live writes.
    ///
    /// Returns the number of marks embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan or a write fails; provider
    /// failures only skip the affected inputs.
    pub fn backfill_embeddings(&self) -> Result<usize> {
        if !self.is_enabled() {
            tracing::debug!("embedding disabled; skipping backfill");
            return Ok(0);
        }

        let pending = self.store.marks_missing_embedding()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut embedded = 0_usize;
        for chunk in pending.chunks(batch_size) {
            let texts: Vec<String> = chunk
                .iter()
                .map(|mark| embeddable_text(mark, self.config.max_text_chars))
                .collect();
            for (mark, vector) in chunk.iter().zip(self.embed(&texts)) {
                if let Some(vector) = vector
                    && self.store.set_mark_embedding(&mark.id, &vector)?
                {
                    embedded += 1;
                }
            }
        }

        tracing::info!(embedded, total_pending = pending.len(), "embedding backfill pass done");
        Ok(embedded)
    }

    /// Lazily builds the similarity index once the embedded corpus reaches
    /// the configured minimum, if one is not already built. Construction
    /// failures are logged and swallowed; the next startup retries.
    pub fn ensure_similarity_index(&self) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(guard) = self.index.read()
            && guard.is_some()
        {
            return;
        }

        match self.try_build_index() {
            Ok(Some(built)) => {
                tracing::info!(vectors = built.len(), "similarity index ready");
                if let Ok(mut guard) = self.index.write() {
                    *guard = Some(built);
                }
            },
            Ok(None) => {},
            Err(e) => {
                tracing::warn!(error = %e, "similarity index creation failed; continuing without");
                metrics::counter!(INDEX_BUILD_FAILURE_COUNTER).increment(1);
            },
        }
    }

    /// Builds an index when the embedded corpus is large enough; `Ok(None)`
    /// means "not yet warranted".
    fn try_build_index(&self) -> Result<Option<Box<dyn VectorIndex>>> {
        let corpus = self.store.count_embedded_marks()?;
        if corpus < self.config.min_index_corpus {
            tracing::debug!(
                corpus,
                minimum = self.config.min_index_corpus,
                "corpus below index threshold"
            );
            return Ok(None);
        }
        let entries = self.store.embedded_vectors()?;
        build_index(entries, self.config.dimensions).map(Some)
    }

    /// Nearest embedded marks by ascending cosine distance, via the index
    /// when one is built.
    ///
    /// Returns `None` when no index is available; callers fall back to a
    /// store scan.
    #[must_use]
    pub fn similar_mark_ids(&self, vector: &[f32], k: usize) -> Option<Vec<(MarkId, f32)>> {
        let guard = self.index.read().ok()?;
        let index = guard.as_deref()?;
        match index.search(vector, k) {
            Ok(hits) => Some(hits),
            Err(e) => {
                tracing::warn!(error = %e, "similarity index search failed");
                None
            },
        }
    }

    /// The configured embedding dimension.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// The configured embeddable-text character ceiling.
    #[must_use]
    pub const fn max_text_chars(&self) -> usize {
        self.config.max_text_chars
    }
}
