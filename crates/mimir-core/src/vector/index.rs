//! Vector index trait and chunk types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::llm::Embedder;

/// A passage of source text stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    /// Identifier of the source document (usually its file name)
    pub source: String,
    pub page: Option<u32>,
    /// Character offset of the chunk within the source text
    pub offset: usize,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page: None,
            offset: 0,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Content-derived identifier; re-indexing the same chunk overwrites it
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(self.offset.to_le_bytes());
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Nearest-neighbour store of embedded text chunks
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `k` chunks ranked by cosine similarity, best first
    async fn similarity_search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Embed and store chunks, returning how many were written
    async fn index_documents(
        &self,
        chunks: &[DocumentChunk],
        embedder: &dyn Embedder,
    ) -> Result<usize>;

    async fn count(&self) -> Result<u64>;

    /// Model the stored chunks were embedded with, if any are stored
    async fn embedding_model(&self) -> Result<Option<String>>;

    async fn clear(&self) -> Result<()>;
}

/// Compute cosine similarity between two vectors
///
/// Vectors of different length score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
