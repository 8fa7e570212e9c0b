//! Semantic retrieval: embed the question and search the vector index

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::Embedder;
use crate::vector::VectorIndex;

use super::types::{ChannelFailure, SemanticHit, SemanticResult};

/// Nearest-neighbour passage search
#[derive(Clone)]
pub struct SemanticRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    min_score: f32,
}

impl SemanticRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            min_score: 0.0,
        }
    }

    /// Drop hits scoring below `min_score`
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Top `k` passages for `question`
    ///
    /// Never fails: an empty index gives an empty result, and embedding or
    /// index errors are recorded in `SemanticResult::failure`.
    pub async fn search(&self, question: &str, k: usize) -> SemanticResult {
        if k == 0 {
            return SemanticResult::empty();
        }

        match self.index.count().await {
            Ok(0) => {
                debug!("Vector index is empty");
                return SemanticResult::empty();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Vector index unavailable");
                return SemanticResult::failed(ChannelFailure::IndexUnavailable(e.to_string()));
            }
        }

        let query_model = self.embedder.embedding_model();
        if let Ok(Some(index_model)) = self.index.embedding_model().await
            && index_model != query_model
        {
            warn!(
                index_model = %index_model,
                query_model = %query_model,
                "Index was built with a different embedding model; scores may be unreliable"
            );
        }

        let embedding = match self.embedder.embed(question).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Question embedding failed");
                return SemanticResult::failed(ChannelFailure::EmbeddingUnavailable(e.to_string()));
            }
        };

        match self.index.similarity_search(&embedding, k).await {
            Ok(scored) => {
                let hits: Vec<SemanticHit> = scored
                    .into_iter()
                    .filter(|s| s.score >= self.min_score)
                    .map(SemanticHit::from)
                    .collect();
                debug!(hits = hits.len(), k = k, "Semantic search complete");
                SemanticResult { hits, failure: None }
            }
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                SemanticResult::failed(ChannelFailure::IndexUnavailable(e.to_string()))
            }
        }
    }
}
