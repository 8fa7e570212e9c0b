//! Ingestion service
//!
//! Writes documents into both stores: extracted entities and relationships
//! go to the graph, chunk embeddings go to the vector index. The shared
//! schema cache is invalidated and refreshed after every graph write.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::graph::{GraphDocument, GraphStore, SchemaCache};
use crate::llm::{Embedder, LanguageModel};
use crate::vector::{DocumentChunk, VectorIndex};

use super::chunker::TextChunker;
use super::extractor::GraphExtractor;
use super::source::SourceDocument;

/// Counts from one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks whose extraction failed and contributed no graph data
    pub skipped_chunks: usize,
    pub entities: usize,
    pub relationships: usize,
    pub duration: Duration,
}

/// Loads documents into the graph store and the vector index
pub struct Ingestor {
    store: Arc<dyn GraphStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    extractor: GraphExtractor,
    chunker: TextChunker,
    schema_cache: Arc<SchemaCache>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn GraphStore>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        schema_cache: Arc<SchemaCache>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            extractor: GraphExtractor::new(model),
            chunker,
            schema_cache,
        }
    }

    /// Load and ingest one plain text or markdown file
    pub async fn ingest_file(&self, path: &Path, clear_first: bool) -> Result<IngestStats> {
        let document = SourceDocument::load(path).await?;
        self.ingest(&[document], clear_first).await
    }

    /// Ingest `documents`, optionally wiping both stores first
    pub async fn ingest(
        &self,
        documents: &[SourceDocument],
        clear_first: bool,
    ) -> Result<IngestStats> {
        let started = Instant::now();
        let mut stats = IngestStats {
            documents: documents.len(),
            ..Default::default()
        };

        if clear_first {
            self.clear().await?;
        }

        let mut graph_documents: Vec<GraphDocument> = Vec::new();
        let mut chunks: Vec<DocumentChunk> = Vec::new();

        for document in documents {
            for span in self.chunker.split(&document.text) {
                match self.extractor.extract(&span.text, &document.id).await {
                    Ok(graph) if !graph.is_empty() => {
                        stats.entities += graph.nodes.len();
                        stats.relationships += graph.relationships.len();
                        graph_documents.push(graph);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            source = %document.id,
                            offset = span.offset,
                            error = %e,
                            "Skipping chunk after extraction failure"
                        );
                        stats.skipped_chunks += 1;
                    }
                }
                chunks.push(DocumentChunk::new(span.text, &document.id).with_offset(span.offset));
            }
        }
        stats.chunks = chunks.len();

        let written = self.store.add_graph_documents(&graph_documents).await;
        self.schema_cache.invalidate().await;
        written?;

        self.index
            .index_documents(&chunks, self.embedder.as_ref())
            .await?;

        if let Err(e) = self.schema_cache.refresh(self.store.as_ref()).await {
            // Stays invalidated; the next query retries the refresh
            warn!(error = %e, "Schema refresh after ingestion failed");
        }

        stats.duration = started.elapsed();
        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            entities = stats.entities,
            relationships = stats.relationships,
            skipped = stats.skipped_chunks,
            duration_ms = stats.duration.as_millis() as u64,
            "Ingestion complete"
        );
        Ok(stats)
    }

    /// Remove everything from the graph and the vector index
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        self.schema_cache.invalidate().await;
        self.index.clear().await?;
        info!("Graph and vector index cleared");
        Ok(())
    }
}
