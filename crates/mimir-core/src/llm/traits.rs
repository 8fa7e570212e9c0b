//! Capability traits for the language model and embedding endpoints
//!
//! The retrieval pipeline only depends on these traits, so tests can swap
//! the HTTP client for in-process fakes.

use async_trait::async_trait;

use crate::error::Result;

/// A text completion capability
///
/// Implementations must run completions deterministically (temperature 0)
/// so that generated graph queries are as reproducible as the model allows.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the model answering completions
    fn model_name(&self) -> &str;

    /// Complete a single prompt
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// A text embedding capability
///
/// The same embedder must be used at ingestion and at query time,
/// otherwise similarity scores are meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model
    fn embedding_model(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
