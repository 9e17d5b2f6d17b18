//! In-memory brute-force vector index.

use super::{check_dimensions, rank, DistanceMetric, EmbeddedChunk, ScoredChunk, VectorIndex};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Flat in-memory index. Entries are kept in insertion order, so an entry's
/// position doubles as its insertion sequence number.
pub struct FlatIndex {
    metric: DistanceMetric,
    dimensions: usize,
    entries: RwLock<Vec<EmbeddedChunk>>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(metric: DistanceMetric, dimensions: usize) -> Self {
        Self {
            metric,
            dimensions,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn insert(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        for chunk in &chunks {
            check_dimensions(self.dimensions, chunk.embedding.len())?;
        }

        let count = chunks.len();
        self.entries.write().extend(chunks);
        Ok(count)
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_dimensions(self.dimensions, query_embedding.len())?;

        let entries = self.entries.read();
        let candidates = entries
            .iter()
            .enumerate()
            .map(|(seq, entry)| (seq as u64, self.metric.distance(query_embedding, &entry.embedding)))
            .collect();

        Ok(rank(candidates, k)
            .into_iter()
            .map(|(seq, distance)| ScoredChunk {
                chunk: entries[seq as usize].chunk.clone(),
                distance,
                similarity: self.metric.similarity(distance),
            })
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
