//! Vector index abstraction.
//!
//! One index instance belongs to exactly one context. Indexes support
//! incremental insertion and k-nearest-neighbour search; results come back
//! ordered by ascending distance, with ties broken by insertion order.

mod flat;
mod sqlite;

pub use flat::FlatIndex;
pub use sqlite::SqliteIndex;

use crate::chunking::Chunk;
use crate::config::{IndexBackend, MetricSetting, VectorIndexSettings};
use crate::context::{ContextId, TempResource};
use crate::error::{DocQaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Distance metric used by an index.
///
/// Raw distances are backend-specific, so every metric carries its own
/// monotonic transform into a "higher is better" similarity in `[0, 1]`:
///
/// - `Cosine`: distance is `1 - cos(a, b)` (range `[0, 2]`); similarity is
///   `1 - distance`, clamped to `[0, 1]` so opposite vectors score 0.
/// - `L2`: distance is Euclidean and unbounded; similarity is `1 / (1 + distance)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// Normalize a raw distance from this metric into a similarity in `[0, 1]`.
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => (1.0 - distance).clamp(0.0, 1.0),
            DistanceMetric::L2 => 1.0 / (1.0 + distance.max(0.0)),
        }
    }
}

impl From<MetricSetting> for DistanceMetric {
    fn from(setting: MetricSetting) -> Self {
        match setting {
            MetricSetting::Cosine => DistanceMetric::Cosine,
            MetricSetting::L2 => DistanceMetric::L2,
        }
    }
}

/// A chunk together with its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk with its raw distance and normalized similarity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Backend-specific distance (lower is closer).
    pub distance: f32,
    /// Normalized similarity in `[0, 1]` (higher is better).
    pub similarity: f32,
}

/// Trait for vector index implementations.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append chunks. Either all of them are inserted or none are.
    async fn insert(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize>;

    /// Return the `k` nearest chunks (all of them if fewer are stored).
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks.
    async fn len(&self) -> Result<usize>;

    /// Metric this index ranks by.
    fn metric(&self) -> DistanceMetric;

    /// Embedding dimensions accepted by this index.
    fn dimensions(&self) -> usize;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Rank `(insertion_seq, distance)` pairs: ascending distance, then earliest
/// insertion first. NaN distances sort last.
pub(crate) fn rank(mut candidates: Vec<(u64, f32)>, k: usize) -> Vec<(u64, f32)> {
    candidates.sort_by(|(seq_a, dist_a), (seq_b, dist_b)| {
        let by_distance = match (dist_a.is_nan(), dist_b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => dist_a.partial_cmp(dist_b).unwrap_or(Ordering::Equal),
        };
        by_distance.then(seq_a.cmp(seq_b))
    });
    candidates.truncate(k);
    candidates
}

pub(crate) fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(DocQaError::VectorIndex(format!(
            "Embedding has {} dimensions, index expects {}",
            actual, expected
        )));
    }
    Ok(())
}

/// A freshly created index plus any scratch resource backing it.
pub struct CreatedIndex {
    pub index: Arc<dyn VectorIndex>,
    pub resource: Option<TempResource>,
}

/// Creates per-context indexes according to configuration.
#[derive(Debug, Clone)]
pub struct IndexFactory {
    backend: IndexBackend,
    metric: DistanceMetric,
    temp_dir: PathBuf,
}

impl IndexFactory {
    pub fn new(settings: &VectorIndexSettings, temp_dir: PathBuf) -> Self {
        Self {
            backend: settings.backend,
            metric: settings.metric.into(),
            temp_dir,
        }
    }

    /// In-memory factory with the given metric.
    pub fn memory(metric: DistanceMetric) -> Self {
        Self {
            backend: IndexBackend::Memory,
            metric,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Create an empty index for a context.
    pub fn create(&self, context_id: ContextId, dimensions: usize) -> Result<CreatedIndex> {
        match self.backend {
            IndexBackend::Memory => Ok(CreatedIndex {
                index: Arc::new(FlatIndex::new(self.metric, dimensions)),
                resource: None,
            }),
            IndexBackend::Sqlite => {
                std::fs::create_dir_all(&self.temp_dir)?;
                let scratch = tempfile::Builder::new()
                    .prefix(&format!("ctx-{}-", context_id))
                    .tempdir_in(&self.temp_dir)?;
                let resource = TempResource::new(scratch);

                // On error the scratch dir goes with `resource`.
                let index =
                    SqliteIndex::open(&resource.path().join("index.db"), self.metric, dimensions)?;
                debug!(
                    "Created SQLite index for context {} in {:?}",
                    context_id,
                    resource.path()
                );
                Ok(CreatedIndex {
                    index: Arc::new(index),
                    resource: Some(resource),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_similarity_normalization_is_bounded_and_monotonic() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::L2] {
            let mut previous = f32::INFINITY;
            for step in 0..=40 {
                let distance = step as f32 * 0.05;
                let similarity = metric.similarity(distance);
                assert!((0.0..=1.0).contains(&similarity));
                assert!(similarity <= previous);
                previous = similarity;
            }
        }
        assert_eq!(DistanceMetric::Cosine.similarity(0.0), 1.0);
        assert_eq!(DistanceMetric::Cosine.similarity(2.0), 0.0);
        assert_eq!(DistanceMetric::L2.similarity(1.0), 0.5);
    }

    #[test]
    fn test_rank_breaks_ties_by_insertion_order() {
        let ranked = rank(vec![(3, 0.5), (1, 0.5), (2, 0.1), (0, f32::NAN)], 3);
        assert_eq!(ranked.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[test]
    fn test_sqlite_factory_tracks_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = VectorIndexSettings {
            backend: IndexBackend::Sqlite,
            metric: MetricSetting::L2,
        };
        let factory = IndexFactory::new(&settings, dir.path().to_path_buf());
        let created = factory.create(ContextId::new(), 3).unwrap();

        let mut resource = created.resource.expect("sqlite index needs a scratch dir");
        assert!(resource.path().exists());
        assert_eq!(created.index.metric(), DistanceMetric::L2);

        drop(created.index);
        resource.release();
        assert!(!resource.path().exists());
    }

    #[test]
    fn test_abandoned_sqlite_index_leaves_no_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = VectorIndexSettings {
            backend: IndexBackend::Sqlite,
            metric: MetricSetting::Cosine,
        };
        let factory = IndexFactory::new(&settings, dir.path().to_path_buf());
        let created = factory.create(ContextId::new(), 3).unwrap();
        let path = created.resource.as_ref().unwrap().path().to_path_buf();
        assert!(path.join("index.db").exists());

        drop(created);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
