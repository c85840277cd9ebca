//! In-memory semantic index over the chunks of one document.
//!
//! An [`IndexHandle`] owns the embedding provider it was built with, so a
//! query is always embedded in the same vector space as the stored chunks.

use crate::embeddings::EmbeddingProvider;
use crate::error::IndexError;
use crate::models::{Chunk, IndexEntry, RetrievalResult, ScoredChunk};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared euclidean distance.
    #[default]
    L2,
    /// One minus cosine similarity.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(self, left: &[f32], right: &[f32]) -> f32 {
        match self {
            Self::L2 => left
                .iter()
                .zip(right)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
            Self::Cosine => {
                let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
                let norm_left = left.iter().map(|value| value * value).sum::<f32>().sqrt();
                let norm_right = right.iter().map(|value| value * value).sum::<f32>().sqrt();
                if norm_left == 0.0 || norm_right == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_left * norm_right)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub batch_size: usize,
    pub metric: DistanceMetric,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            metric: DistanceMetric::default(),
        }
    }
}

/// Nearest-neighbour storage for fixed-length vectors.
pub trait VectorIndex: Send + Sync {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<(), IndexError>;

    /// Returns `(position, distance)` for at most `k` entries, closest first.
    /// Equal distances keep insertion order.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError>;
}

/// Exhaustive scan; exact results, linear cost per query.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    metric: DistanceMetric,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            vectors: Vec::new(),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        for vector in &vectors {
            self.check_dimensions(vector)?;
        }
        self.vectors.extend(vectors);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        self.check_dimensions(query)?;

        let mut scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, self.metric.distance(vector, query)))
            .collect::<Vec<_>>();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|left, right| left.1.total_cmp(&right.1));
        scored.truncate(k);
        Ok(scored)
    }
}

/// The active index of a session.
pub struct IndexHandle {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Box<dyn VectorIndex>,
    entries: Vec<IndexEntry>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("embedding_model", &self.embedder.model_id())
            .field("dimensions", &self.index.dimensions())
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl IndexHandle {
    /// Embeds every chunk in batches. Any provider failure or dimension
    /// mismatch aborts the build; no partial handle is returned.
    pub async fn build(
        chunks: &[Chunk],
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> Result<Self, IndexError> {
        let index = FlatIndex::new(embedder.dimensions(), options.metric);
        Self::build_with(chunks, embedder, Box::new(index), options.batch_size).await
    }

    pub async fn build_with(
        chunks: &[Chunk],
        embedder: Arc<dyn EmbeddingProvider>,
        mut index: Box<dyn VectorIndex>,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts = batch.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
            let vectors = embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    inputs: batch.len(),
                    embeddings: vectors.len(),
                });
            }
            for vector in &vectors {
                if vector.len() != embedder.dimensions() {
                    return Err(IndexError::DimensionMismatch {
                        expected: embedder.dimensions(),
                        actual: vector.len(),
                    });
                }
            }

            entries.extend(batch.iter().zip(&vectors).map(|(chunk, vector)| IndexEntry {
                chunk_id: chunk.chunk_id.clone(),
                vector: vector.clone(),
                chunk_text: chunk.text.clone(),
            }));
            index.add(vectors)?;
            debug!(embedded = entries.len(), total = chunks.len(), "embedded batch");
        }

        info!(
            entries = entries.len(),
            model = embedder.model_id(),
            dimensions = embedder.dimensions(),
            "index built"
        );

        Ok(Self {
            embedder,
            index,
            entries,
        })
    }

    /// Returns at most `k` entries, never more than the index holds. An empty
    /// index answers with an empty result without calling the provider.
    pub async fn query(&self, question: &str, k: usize) -> Result<RetrievalResult, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query_vector = self.embedder.embed(question).await?;
        let nearest = self.index.search(&query_vector, k.min(self.entries.len()))?;

        let hits = nearest
            .into_iter()
            .filter_map(|(position, score)| {
                self.entries.get(position).map(|entry| ScoredChunk {
                    chunk_id: entry.chunk_id.clone(),
                    chunk_text: entry.chunk_text.clone(),
                    score,
                })
            })
            .collect::<Vec<_>>();

        debug!(
            requested = k,
            returned = hits.len(),
            best = hits.first().map(|hit| hit.score),
            "retrieval"
        );

        Ok(RetrievalResult { hits })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }
}
