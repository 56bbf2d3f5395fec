//! Similarity index over embedded marks.
//!
//! Provides nearest-neighbor search by cosine distance. The default backend
//! is an exact linear scan, which is plenty for corpora in the low thousands;
//! the `usearch-hnsw` feature swaps in an HNSW graph for larger ones. Both
//! are built in one shot from the embedded corpus and rebuilt on restart —
//! the corpus is append-mostly and staleness between restarts only costs
//! recall, never correctness.

use crate::models::MarkId;
#[cfg(feature = "usearch-hnsw")]
use crate::Error;
use crate::Result;
use crate::embedding::cosine_similarity;

/// HNSW connectivity parameter (M).
#[cfg(feature = "usearch-hnsw")]
const HNSW_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for construction (`ef_construction`).
#[cfg(feature = "usearch-hnsw")]
const HNSW_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (`ef`).
#[cfg(feature = "usearch-hnsw")]
const HNSW_EXPANSION_SEARCH: usize = 64;

/// Nearest-neighbor search over a fixed corpus of mark vectors.
pub trait VectorIndex: Send + Sync {
    /// Number of vectors in the index.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns up to `k` mark IDs by ascending cosine distance from `vector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend search fails.
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(MarkId, f32)>>;
}

/// Exact linear-scan index.
pub struct LinearIndex {
    entries: Vec<(MarkId, Vec<f32>)>,
}

impl LinearIndex {
    /// Builds an index over the given vectors.
    #[must_use]
    pub const fn build(entries: Vec<(MarkId, Vec<f32>)>) -> Self {
        Self { entries }
    }
}

impl VectorIndex for LinearIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(MarkId, f32)>> {
        let mut scored: Vec<(MarkId, f32)> = self
            .entries
            .iter()
            .map(|(id, candidate)| (id.clone(), 1.0 - cosine_similarity(vector, candidate)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// HNSW-backed index via usearch.
#[cfg(feature = "usearch-hnsw")]
pub struct HnswIndex {
    index: usearch::Index,
    keys: Vec<MarkId>,
}

#[cfg(feature = "usearch-hnsw")]
impl HnswIndex {
    /// Builds an HNSW index over the given vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if index creation or insertion fails.
    pub fn build(entries: Vec<(MarkId, Vec<f32>)>, dimensions: usize) -> Result<Self> {
        let options = usearch::IndexOptions {
            dimensions,
            metric: usearch::MetricKind::Cos,
            quantization: usearch::ScalarKind::F32,
            connectivity: HNSW_CONNECTIVITY,
            expansion_add: HNSW_EXPANSION_ADD,
            expansion_search: HNSW_EXPANSION_SEARCH,
            multi: false,
        };

        let index =
            usearch::Index::new(&options).map_err(|e| Error::op("create_hnsw_index", e))?;
        index
            .reserve(entries.len().max(1))
            .map_err(|e| Error::op("reserve_hnsw_capacity", e))?;

        let mut keys = Vec::with_capacity(entries.len());
        for (key, (id, vector)) in entries.into_iter().enumerate() {
            index
                .add(key as u64, &vector)
                .map_err(|e| Error::op("add_hnsw_vector", e))?;
            keys.push(id);
        }

        Ok(Self { index, keys })
    }
}

#[cfg(feature = "usearch-hnsw")]
impl VectorIndex for HnswIndex {
    fn len(&self) -> usize {
        self.keys.len()
    }

    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(MarkId, f32)>> {
        let matches = self
            .index
            .search(vector, k)
            .map_err(|e| Error::op("search_hnsw_index", e))?;

        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                usize::try_from(*key)
                    .ok()
                    .and_then(|i| self.keys.get(i))
                    .map(|id| (id.clone(), *distance))
            })
            .collect())
    }
}

/// Builds the configured index backend over the given vectors.
///
/// # Errors
///
/// Returns an error if backend construction fails.
#[cfg(feature = "usearch-hnsw")]
pub fn build_index(
    entries: Vec<(MarkId, Vec<f32>)>,
    dimensions: usize,
) -> Result<Box<dyn VectorIndex>> {
    HnswIndex::build(entries, dimensions).map(|i| Box::new(i) as Box<dyn VectorIndex>)
}

/// Builds the configured index backend over the given vectors.
///
/// # Errors
///
/// Returns an error if backend construction fails.
#[cfg(not(feature = "usearch-hnsw"))]
#[allow(clippy::unnecessary_wraps)]
pub fn build_index(
    entries: Vec<(MarkId, Vec<f32>)>,
    dimensions: usize,
) -> Result<Box<dyn VectorIndex>> {
    let _ = dimensions;
    Ok(Box::new(LinearIndex::build(entries)))
}
