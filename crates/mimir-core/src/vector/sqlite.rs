//! SQLite-backed vector index
//!
//! Embeddings are stored as little-endian f32 BLOBs and ranked in process.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::llm::Embedder;
use crate::storage::Database;

use super::index::{
    DocumentChunk, ScoredChunk, VectorIndex, cosine_similarity, decode_embedding,
    encode_embedding,
};

#[derive(Debug, FromRow)]
struct ChunkRow {
    source: String,
    page: Option<i64>,
    chunk_offset: i64,
    content: String,
    embedding: Vec<u8>,
}

/// Vector index stored in a local SQLite database
#[derive(Debug, Clone)]
pub struct SqliteVectorIndex {
    db: Database,
}

impl SqliteVectorIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (creating if needed) the index file at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = Database::open(&path)
            .await
            .map_err(|e| Error::VectorIndexUnavailable(format!("{:#}", e)))?;
        Ok(Self::new(db))
    }

    pub async fn in_memory() -> Result<Self> {
        let db = Database::in_memory()
            .await
            .map_err(|e| Error::VectorIndexUnavailable(format!("{:#}", e)))?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn similarity_search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<ChunkRow> = sqlx::query_as(
            "SELECT source, page, chunk_offset, content, embedding FROM document_chunks",
        )
        .fetch_all(self.db.pool())
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<ScoredChunk> = rows
            .into_iter()
            .map(|row| {
                let score = cosine_similarity(embedding, &decode_embedding(&row.embedding));
                ScoredChunk {
                    chunk: DocumentChunk {
                        content: row.content,
                        source: row.source,
                        page: row.page.and_then(|p| u32::try_from(p).ok()),
                        offset: usize::try_from(row.chunk_offset).unwrap_or(0),
                    },
                    score,
                }
            })
            .collect();

        // Ties fall back to document order so repeated searches agree
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.source.cmp(&b.chunk.source))
                .then_with(|| a.chunk.offset.cmp(&b.chunk.offset))
        });
        results.truncate(k);

        debug!(candidates = results.len(), k = k, "Vector search complete");
        Ok(results)
    }

    async fn index_documents(
        &self,
        chunks: &[DocumentChunk],
        embedder: &dyn Embedder,
    ) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| Error::EmbeddingFailed(e.to_string()))?;

        if embeddings.len() != chunks.len() {
            return Err(Error::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let model = embedder.embedding_model().to_string();
        let mut tx = self.db.pool().begin().await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (id, source, page, chunk_offset, content, embedding, embedding_model, dimensions)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    embedding_model = excluded.embedding_model,
                    dimensions = excluded.dimensions
                "#,
            )
            .bind(chunk.id())
            .bind(&chunk.source)
            .bind(chunk.page.map(i64::from))
            .bind(chunk.offset as i64)
            .bind(&chunk.content)
            .bind(encode_embedding(embedding))
            .bind(&model)
            .bind(embedding.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(chunks = chunks.len(), model = %model, "Chunks indexed");
        Ok(chunks.len())
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count as u64)
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT embedding_model FROM document_chunks \
             GROUP BY embedding_model ORDER BY COUNT(*) DESC LIMIT 1",
        )
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|(model,)| model))
    }

    async fn clear(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM document_chunks")
            .execute(self.db.pool())
            .await?;
        info!(removed = result.rows_affected(), "Vector index cleared");
        Ok(())
    }
}
