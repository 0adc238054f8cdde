//! In-memory vector index built once per request.

use super::types::Chunk;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, embed_with_timeout};
use std::time::Duration;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 4;

/// Default number of chunks sent to the embedder per call.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;

/// Chunk paired with its similarity to a query vector.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    /// Matching chunk.
    pub chunk: &'a Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Exhaustive cosine-similarity index over one document's chunks.
///
/// Immutable after [`VectorIndex::build`]; concurrent readers need no locking.
#[derive(Debug)]
pub struct VectorIndex {
    embedding_model: String,
    dimension: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Embed every chunk with `embedder` and index the results.
    ///
    /// Chunks are sent in batches of at most `batch_size`, each call bounded by `timeout`, so
    /// large documents stay within provider input caps.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingClient,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let batch_size = batch_size.max(1);
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let mut embedded = embed_with_timeout(embedder, texts, timeout).await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingClientError::InvalidResponse(format!(
                    "batch {batch_index}: expected {} vectors, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.append(&mut embedded);
        }
        Self::from_parts(embedder.model_id().to_string(), chunks, vectors)
    }

    /// Assemble an index from pre-computed vectors, validating their shape.
    pub fn from_parts(
        embedding_model: String,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, EmbeddingClientError> {
        if vectors.len() != chunks.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if vectors.iter().any(|vector| vector.len() != dimension) {
            return Err(EmbeddingClientError::InvalidResponse(
                "vectors have inconsistent dimensions".into(),
            ));
        }
        if !chunks.is_empty() && dimension == 0 {
            return Err(EmbeddingClientError::InvalidResponse(
                "provider returned empty vectors".into(),
            ));
        }

        tracing::debug!(
            embedding_model = %embedding_model,
            chunks = chunks.len(),
            dimension,
            "Vector index built"
        );
        Ok(Self {
            embedding_model,
            dimension,
            chunks,
            vectors,
        })
    }

    /// Embedding space identity of the indexed vectors.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Width of the indexed vectors.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return up to `k` chunks ordered by descending similarity.
    ///
    /// Equal scores keep original chunk order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit<'_>> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|(left_idx, left), (right_idx, right)| {
            right.total_cmp(left).then(left_idx.cmp(right_idx))
        });
        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| SearchHit {
                chunk: &self.chunks[idx],
                score,
            })
            .collect()
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|v| v * v).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    let score = dot / (left_norm * right_norm);
    if score.is_nan() { 0.0 } else { score }
}
