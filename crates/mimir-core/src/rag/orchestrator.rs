//! Hybrid orchestrator
//!
//! Runs one question through both retrieval channels and synthesis:
//!
//! 1. Read the schema cache, refreshing inline when missing or invalidated
//! 2. Run the structured channel (generate, then execute) and the semantic
//!    channel concurrently, each under an optional timeout
//! 3. Merge both outcomes into a `HybridContext`, with sentinels for gaps
//! 4. Synthesize the answer
//!
//! Channel failures degrade to empty evidence. Only a schema refresh failure,
//! a synthesis failure, or (when configured) an unreachable graph store fail
//! the whole query.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::graph::{GraphSchema, GraphStore, SchemaCache};
use crate::llm::{Embedder, LanguageModel};
use crate::vector::VectorIndex;

use super::generator::QueryGenerator;
use super::semantic::SemanticRetriever;
use super::structured::StructuredRetriever;
use super::synthesis::Synthesizer;
use super::types::{
    Answer, ChannelFailure, Diagnostics, HybridContext, SemanticResult, StructuredResult,
};

/// Per-query retrieval settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub row_cap: usize,
    pub min_score: f32,
    pub channel_timeout: Option<Duration>,
    pub read_only: bool,
    pub abort_on_store_unavailable: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            row_cap: config.row_cap,
            min_score: config.min_score,
            channel_timeout: config.channel_timeout_secs.map(Duration::from_secs),
            read_only: config.read_only,
            abort_on_store_unavailable: config.abort_on_store_unavailable,
        }
    }
}

/// Coordinates schema, both retrieval channels and synthesis
pub struct HybridOrchestrator {
    store: Arc<dyn GraphStore>,
    schema_cache: Arc<SchemaCache>,
    generator: QueryGenerator,
    structured: StructuredRetriever,
    semantic: SemanticRetriever,
    synthesizer: Synthesizer,
    options: RetrievalOptions,
}

impl HybridOrchestrator {
    pub fn builder() -> HybridOrchestratorBuilder {
        HybridOrchestratorBuilder::default()
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schema_cache
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Answer `question` from both channels
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let query_id = Uuid::new_v4();
        let span = info_span!("query", query_id = %query_id);

        async move {
            let started = Instant::now();
            let context = self.retrieve(question).await?;
            let mut answer = self.synthesizer.synthesize(&context).await?;

            answer.diagnostics = Diagnostics::from_context(query_id, &context, started.elapsed());
            info!(
                graph_records = answer.diagnostics.graph_records,
                text_hits = answer.diagnostics.text_hits,
                elapsed_ms = answer.diagnostics.elapsed.as_millis() as u64,
                "Question answered"
            );
            Ok(answer)
        }
        .instrument(span)
        .await
    }

    /// Run both channels and return the merged context without synthesis
    pub async fn retrieve(&self, question: &str) -> Result<HybridContext> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".to_string()));
        }

        let schema = self.schema_cache.ensure_fresh(self.store.as_ref()).await?;

        let structured = with_timeout(
            self.options.channel_timeout,
            self.structured_channel(question, schema.clone()),
        );
        let semantic = with_timeout(
            self.options.channel_timeout,
            self.semantic.search(question, self.options.top_k),
        );
        let (structured, semantic) = tokio::join!(structured, semantic);

        let structured = match structured {
            None => {
                warn!(channel = "graph", "Channel timed out");
                StructuredResult::no_data(ChannelFailure::Timeout)
            }
            Some(Ok(result)) => result,
            Some(Err(e)) if self.options.abort_on_store_unavailable => {
                warn!(channel = "graph", error = %e, "Aborting query");
                return Err(match e {
                    Error::StoreUnavailable(_) => e,
                    other => Error::StoreUnavailable(other.to_string()),
                });
            }
            Some(Err(e)) => {
                warn!(channel = "graph", error = %e, "Continuing without graph evidence");
                StructuredResult::no_data(ChannelFailure::from_graph_error(&e))
            }
        };

        let semantic = semantic.unwrap_or_else(|| {
            warn!(channel = "text", "Channel timed out");
            SemanticResult::failed(ChannelFailure::Timeout)
        });

        // An ingest may have refreshed or invalidated the cache meanwhile
        let schema_stale = !self.schema_cache.is_current(&schema).await;
        if schema_stale {
            warn!("Graph schema changed while the question was being answered");
        }

        debug!(
            graph_records = structured.records().len(),
            text_hits = semantic.hits.len(),
            schema_stale,
            "Retrieval complete"
        );

        Ok(HybridContext::new(question, structured, semantic).with_schema_stale(schema_stale))
    }

    /// Generate and execute a graph query
    ///
    /// Returns `Err` only for connection-level store failures.
    async fn structured_channel(
        &self,
        question: &str,
        schema: Arc<GraphSchema>,
    ) -> Result<StructuredResult> {
        if schema.is_empty() {
            debug!("Graph is empty; skipping query generation");
            return Ok(StructuredResult::no_data(ChannelFailure::EmptyGraph));
        }

        let query = match self.generator.generate(question, schema).await {
            Ok(query) => query,
            Err(e) => {
                warn!(channel = "graph", error = %e, "No graph query generated");
                return Ok(StructuredResult::no_data(ChannelFailure::from_graph_error(&e)));
            }
        };

        self.structured.execute(query).await
    }
}

/// `None` when `timeout` elapses first
async fn with_timeout<F: Future>(timeout: Option<Duration>, future: F) -> Option<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

/// Builder for `HybridOrchestrator`
#[derive(Default)]
pub struct HybridOrchestratorBuilder {
    store: Option<Arc<dyn GraphStore>>,
    index: Option<Arc<dyn VectorIndex>>,
    model: Option<Arc<dyn LanguageModel>>,
    embedder: Option<Arc<dyn Embedder>>,
    schema_cache: Option<Arc<SchemaCache>>,
    options: RetrievalOptions,
}

impl HybridOrchestratorBuilder {
    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Model used for both query generation and synthesis
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Share a schema cache with other components (the ingestor)
    pub fn schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    pub fn options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<HybridOrchestrator> {
        let store = self
            .store
            .ok_or_else(|| Error::ConfigError("Graph store not provided".to_string()))?;
        let index = self
            .index
            .ok_or_else(|| Error::ConfigError("Vector index not provided".to_string()))?;
        let model = self
            .model
            .ok_or_else(|| Error::ConfigError("Language model not provided".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| Error::ConfigError("Embedder not provided".to_string()))?;

        if self.options.top_k == 0 {
            return Err(Error::ConfigError("top_k must be at least 1".to_string()));
        }

        let mut structured = StructuredRetriever::new(Arc::clone(&store), self.options.row_cap);
        if !self.options.read_only {
            structured = structured.allow_writes();
        }

        Ok(HybridOrchestrator {
            schema_cache: self.schema_cache.unwrap_or_default(),
            generator: QueryGenerator::new(Arc::clone(&model)),
            structured,
            semantic: SemanticRetriever::new(index, embedder).with_min_score(self.options.min_score),
            synthesizer: Synthesizer::new(model),
            store,
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = RetrievalConfig {
            channel_timeout_secs: Some(20),
            abort_on_store_unavailable: true,
            ..Default::default()
        };
        let options = RetrievalOptions::from(&config);
        assert_eq!(options.top_k, 3);
        assert_eq!(options.row_cap, 25);
        assert_eq!(options.channel_timeout, Some(Duration::from_secs(20)));
        assert!(options.read_only);
        assert!(options.abort_on_store_unavailable);
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = HybridOrchestrator::builder().build().err().unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout() {
        let fast = with_timeout(Some(Duration::from_secs(1)), async { 7 }).await;
        assert_eq!(fast, Some(7));

        let slow = with_timeout(Some(Duration::from_secs(1)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            7
        })
        .await;
        assert_eq!(slow, None);

        assert_eq!(with_timeout(None, async { 3 }).await, Some(3));
    }
}
