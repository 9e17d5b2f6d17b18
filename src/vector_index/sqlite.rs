//! SQLite-backed vector index.
//!
//! Each index lives in its own database file inside the owning context's
//! scratch directory. Distances are computed in Rust over the stored
//! embeddings; the rowid doubles as the insertion sequence number.

use super::{check_dimensions, rank, DistanceMetric, EmbeddedChunk, ScoredChunk, VectorIndex};
use crate::chunking::Chunk;
use crate::context::ContextId;
use crate::error::{DocQaError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chunks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        context_id TEXT NOT NULL,
        source_filename TEXT NOT NULL,
        position INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL
    );
"#;

/// SQLite-backed index for a single context.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    metric: DistanceMetric,
    dimensions: usize,
}

impl SqliteIndex {
    /// Open (or create) an index database at `path`.
    #[instrument(skip_all)]
    pub fn open(path: &Path, metric: DistanceMetric, dimensions: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        debug!("Opened SQLite index at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            metric,
            dimensions,
        })
    }

    /// Create an in-memory index (useful for testing).
    pub fn in_memory(metric: DistanceMetric, dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            metric,
            dimensions,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DocQaError::VectorIndex(format!("Failed to acquire lock: {}", e)))
    }

    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    async fn insert(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        for chunk in &chunks {
            check_dimensions(self.dimensions, chunk.embedding.len())?;
        }

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for item in &chunks {
            tx.execute(
                r#"
                INSERT INTO chunks (context_id, source_filename, position, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    item.chunk.context_id.to_string(),
                    item.chunk.source_filename,
                    item.chunk.position as i64,
                    item.chunk.text,
                    Self::embedding_to_bytes(&item.embedding),
                ],
            )?;
        }

        tx.commit()?;
        debug!("Inserted {} chunks", chunks.len());
        Ok(chunks.len())
    }

    #[instrument(skip(self, query_embedding))]
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_dimensions(self.dimensions, query_embedding.len())?;

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, context_id, source_filename, position, content, embedding FROM chunks",
        )?;

        let rows = stmt.query_map([], |row| {
            let seq: i64 = row.get(0)?;
            let context_id: String = row.get(1)?;
            let position: i64 = row.get(3)?;
            let embedding: Vec<u8> = row.get(5)?;
            Ok((
                seq as u64,
                context_id,
                row.get::<_, String>(2)?,
                position as usize,
                row.get::<_, String>(4)?,
                Self::bytes_to_embedding(&embedding),
            ))
        })?;

        let mut stored = Vec::new();
        for row in rows {
            let (seq, context_id, source_filename, position, text, embedding) = row?;
            let context_id = ContextId::parse(&context_id).ok_or_else(|| {
                DocQaError::VectorIndex(format!("Corrupt context id in index: {}", context_id))
            })?;
            let distance = self.metric.distance(query_embedding, &embedding);
            stored.push((
                seq,
                distance,
                Chunk {
                    text,
                    source_filename,
                    context_id,
                    position,
                },
            ));
        }

        let ranked = rank(stored.iter().map(|(seq, d, _)| (*seq, *d)).collect(), k);

        let mut by_seq: std::collections::HashMap<u64, Chunk> = stored
            .into_iter()
            .map(|(seq, _, chunk)| (seq, chunk))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|(seq, distance)| {
                by_seq.remove(&seq).map(|chunk| ScoredChunk {
                    chunk,
                    distance,
                    similarity: self.metric.similarity(distance),
                })
            })
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
