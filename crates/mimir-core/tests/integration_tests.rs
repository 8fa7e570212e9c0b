//! Mimir Core Integration Tests
//!
//! Drive the hybrid pipeline end to end with in-process collaborators: a
//! scripted language model that records prompts, a bag-of-words embedder, an
//! in-memory graph store and a real in-memory SQLite vector index.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use mimir_core::graph::{
    Freshness, GraphDocument, GraphRecord, GraphSchema, GraphStore, SchemaCache,
};
use mimir_core::ingest::{Ingestor, SourceDocument, SourceFormat, TextChunker};
use mimir_core::llm::{Embedder, LanguageModel};
use mimir_core::rag::{
    ChannelFailure, HybridOrchestrator, NO_GRAPH_DATA, NO_TEXT_DATA, RetrievalOptions,
};
use mimir_core::vector::{DocumentChunk, SqliteVectorIndex, VectorIndex};
use mimir_core::{Error, Result};

const JEFFREY_CYPHER: &str =
    r#"MATCH (n:Person)-[r]-(m) WHERE toLower(n.id) CONTAINS "jeffrey" RETURN n, r, m"#;

const INSUFFICIENT: &str = "I do not have enough grounded information to answer that.";

// ========== Collaborators ==========

/// Language model that answers by prompt kind and records every prompt
struct ScriptedModel {
    cypher: Option<String>,
    cypher_delay: Option<Duration>,
    synthesis_up: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(cypher: Option<&str>) -> Self {
        Self {
            cypher: cypher.map(str::to_string),
            cypher_delay: None,
            synthesis_up: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn synthesis_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with("You are Mimir"))
            .cloned()
            .collect()
    }

    fn generation_calls(&self) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with("Task: Generate a Cypher"))
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if prompt.starts_with("Task: Generate a Cypher") {
            if let Some(delay) = self.cypher_delay {
                tokio::time::sleep(delay).await;
            }
            return self
                .cypher
                .clone()
                .ok_or_else(|| Error::LLMError("model not loaded".to_string()));
        }

        if prompt.starts_with("Extract a knowledge graph") {
            return Ok(json!({
                "nodes": [
                    {"id": "Jeffrey Dean", "type": "Person"},
                    {"id": "MapReduce", "type": "Paper"}
                ],
                "relationships": [
                    {"source": "Jeffrey Dean", "target": "MapReduce", "type": "AUTHOR_OF"}
                ]
            })
            .to_string());
        }

        if !self.synthesis_up {
            return Err(Error::LLMError("connection refused".to_string()));
        }
        if prompt.contains(NO_GRAPH_DATA) && prompt.contains(NO_TEXT_DATA) {
            Ok(INSUFFICIENT.to_string())
        } else {
            Ok("Jeffrey Dean co-authored MapReduce at Google.".to_string())
        }
    }
}

/// Hashes words into a fixed number of buckets
struct BagOfWords {
    model: &'static str,
    dimensions: usize,
}

impl BagOfWords {
    fn new(model: &'static str, dimensions: usize) -> Self {
        Self { model, dimensions }
    }
}

#[async_trait]
impl Embedder for BagOfWords {
    fn embedding_model(&self) -> &str {
        self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        const STOPWORDS: &[&str] = &["what", "who", "the", "for", "and", "with", "used"];
        let mut vector = vec![0.0; self.dimensions];
        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
            if word.len() <= 2 || STOPWORDS.contains(&word) {
                continue;
            }
            let hash = word.bytes().fold(2_166_136_261_u32, |h, b| {
                (h ^ u32::from(b)).wrapping_mul(16_777_619)
            });
            vector[hash as usize % self.dimensions] += 1.0;
        }
        Ok(vector)
    }
}

/// Graph held in memory; understands only the fuzzy neighbourhood query shape
#[derive(Default)]
struct InMemoryGraph {
    nodes: Mutex<BTreeMap<String, String>>,
    edges: Mutex<Vec<(String, String, String)>>,
    down: AtomicBool,
    queries: Mutex<Vec<String>>,
}

impl InMemoryGraph {
    fn papers() -> Self {
        let graph = Self::default();
        graph.link(("Jeffrey Dean", "Person"), "AUTHOR_OF", ("MapReduce", "Paper"));
        graph.link(("Sanjay Ghemawat", "Person"), "AUTHOR_OF", ("MapReduce", "Paper"));
        graph.link(("Jeffrey Dean", "Person"), "WORKS_AT", ("Google", "Organization"));
        graph
    }

    fn link(&self, source: (&str, &str), rel_type: &str, target: (&str, &str)) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(source.0.to_string(), source.1.to_string());
        nodes.insert(target.0.to_string(), target.1.to_string());

        let edge = (source.0.to_string(), rel_type.to_string(), target.0.to_string());
        let mut edges = self.edges.lock().unwrap();
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn node_value(&self, id: &str) -> Value {
        let label = self.nodes.lock().unwrap().get(id).cloned().unwrap_or_default();
        json!({"id": id, "labels": [label]})
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn query(&self, statement: &str, _params: Value) -> Result<Vec<GraphRecord>> {
        self.check_up()?;
        self.queries.lock().unwrap().push(statement.to_string());

        if !statement.starts_with("MATCH ") {
            return Err(Error::QuerySyntax(format!("Invalid input: {}", statement)));
        }

        let Some(term) = statement
            .split("CONTAINS \"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
        else {
            return Ok(Vec::new());
        };

        let edges = self.edges.lock().unwrap().clone();
        let mut records = Vec::new();
        for (source, rel_type, target) in edges {
            let relationship = json!({"type": rel_type, "start": source, "end": target});
            if source.to_lowercase().contains(term) {
                records.push(
                    GraphRecord::new()
                        .with("n", self.node_value(&source))
                        .with("r", relationship.clone())
                        .with("m", self.node_value(&target)),
                );
            }
            if target.to_lowercase().contains(term) {
                records.push(
                    GraphRecord::new()
                        .with("n", self.node_value(&target))
                        .with("r", relationship)
                        .with("m", self.node_value(&source)),
                );
            }
        }
        Ok(records)
    }

    async fn get_schema(&self) -> Result<GraphSchema> {
        self.check_up()?;
        let nodes = self.nodes.lock().unwrap();
        let mut schema = GraphSchema::new();
        for label in nodes.values() {
            schema.add_node(label.clone(), ["id"]);
        }
        for (source, rel_type, target) in self.edges.lock().unwrap().iter() {
            if let (Some(s), Some(t)) = (nodes.get(source), nodes.get(target)) {
                schema.add_relationship(s.clone(), rel_type.clone(), t.clone());
            }
        }
        Ok(schema)
    }

    async fn add_graph_documents(&self, documents: &[GraphDocument]) -> Result<()> {
        self.check_up()?;
        for document in documents {
            for node in &document.nodes {
                self.nodes
                    .lock()
                    .unwrap()
                    .insert(node.id.clone(), node.label.clone());
            }
            for rel in &document.relationships {
                self.link(
                    (&rel.source.id, &rel.source.label),
                    &rel.rel_type,
                    (&rel.target.id, &rel.target.label),
                );
            }
        }
        Ok(())
    }
}

// ========== Fixtures ==========

fn corpus() -> Vec<DocumentChunk> {
    vec![
        DocumentChunk::new(
            "Jeffrey Dean is a Google Fellow who co-designed MapReduce and Bigtable.",
            "dean.md",
        )
        .with_page(1),
        DocumentChunk::new(
            "HDFS is a distributed file system modelled on the Google File System.",
            "hdfs.md",
        ),
        DocumentChunk::new(
            "Spanner is a globally distributed database with external consistency.",
            "spanner.md",
        ),
        DocumentChunk::new(
            "MapReduce is a programming model for processing large data sets.",
            "mapreduce.md",
        ),
        DocumentChunk::new(
            "Bigtable is a sparse, distributed, persistent multidimensional sorted map.",
            "bigtable.md",
        ),
    ]
}

async fn index_with(chunks: &[DocumentChunk], embedder: &BagOfWords) -> Arc<SqliteVectorIndex> {
    let index = SqliteVectorIndex::in_memory().await.unwrap();
    index.index_documents(chunks, embedder).await.unwrap();
    Arc::new(index)
}

struct Pipeline {
    orchestrator: HybridOrchestrator,
    model: Arc<ScriptedModel>,
    graph: Arc<InMemoryGraph>,
}

fn pipeline(
    graph: InMemoryGraph,
    index: Arc<SqliteVectorIndex>,
    model: ScriptedModel,
    embedder: BagOfWords,
    options: RetrievalOptions,
) -> Pipeline {
    let graph = Arc::new(graph);
    let model = Arc::new(model);
    let orchestrator = HybridOrchestrator::builder()
        .graph_store(graph.clone())
        .vector_index(index)
        .language_model(model.clone())
        .embedder(Arc::new(embedder))
        .options(options)
        .build()
        .unwrap();

    Pipeline {
        orchestrator,
        model,
        graph,
    }
}

// ========== Scenarios ==========

#[tokio::test]
async fn test_both_channels_reach_synthesis() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        embedder,
        RetrievalOptions {
            top_k: 1,
            ..Default::default()
        },
    );

    let answer = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();

    assert_eq!(answer.text, "Jeffrey Dean co-authored MapReduce at Google.");
    assert_eq!(answer.graph_statement(), Some(JEFFREY_CYPHER));
    assert_eq!(answer.diagnostics.graph_records, 2);
    assert!(answer.diagnostics.graph_failure.is_none());
    assert!(!answer.diagnostics.schema_stale);
    assert!(answer.is_grounded());

    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].document_id, "dean.md");
    assert_eq!(answer.citations[0].page, Some(1));

    let prompts = p.model.synthesis_prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains(r#""type":"AUTHOR_OF""#));
    assert!(prompt.contains(r#""type":"WORKS_AT""#));
    assert!(prompt.contains("Google Fellow"));
    assert!(!prompt.contains(NO_GRAPH_DATA));
    assert!(!prompt.contains(NO_TEXT_DATA));
}

#[tokio::test]
async fn test_empty_graph_uses_text_only() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::default(),
        index,
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        embedder,
        RetrievalOptions::default(),
    );

    let answer = p.orchestrator.ask("What is Spanner?").await.unwrap();

    assert_eq!(answer.diagnostics.graph_failure, Some(ChannelFailure::EmptyGraph));
    assert_eq!(answer.diagnostics.text_hits, 3);
    assert_eq!(answer.citations.len(), 3);
    assert_eq!(p.model.generation_calls(), 0);

    let prompt = &p.model.synthesis_prompts()[0];
    assert!(prompt.contains(NO_GRAPH_DATA));
    assert!(prompt.contains("[3] ("));
}

#[tokio::test]
async fn test_both_channels_empty_still_answers() {
    let index = Arc::new(SqliteVectorIndex::in_memory().await.unwrap());
    let p = pipeline(
        InMemoryGraph::default(),
        index,
        ScriptedModel::new(None),
        BagOfWords::new("bow-64", 64),
        RetrievalOptions::default(),
    );

    let answer = p.orchestrator.ask("What is Bigtable?").await.unwrap();

    assert_eq!(answer.text, INSUFFICIENT);
    assert!(answer.citations.is_empty());
    assert!(!answer.is_grounded());

    let prompt = &p.model.synthesis_prompts()[0];
    assert!(prompt.contains(NO_GRAPH_DATA));
    assert!(prompt.contains(NO_TEXT_DATA));
}

#[tokio::test]
async fn test_embedding_model_mismatch_still_ranks() {
    let index = index_with(&corpus(), &BagOfWords::new("bow-64", 64)).await;
    let p = pipeline(
        InMemoryGraph::default(),
        index,
        ScriptedModel::new(None),
        BagOfWords::new("bow-32", 32),
        RetrievalOptions::default(),
    );

    let context = p.orchestrator.retrieve("What is HDFS used for?").await.unwrap();
    assert_eq!(context.semantic.hits.len(), 3);
    assert!(context.semantic.failure.is_none());
}

// ========== Degradation ==========

#[tokio::test]
async fn test_query_syntax_error_degrades_to_text() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        ScriptedModel::new(Some("MATC (n:Person) RETURN n")),
        embedder,
        RetrievalOptions::default(),
    );

    let answer = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();

    assert!(matches!(
        answer.diagnostics.graph_failure,
        Some(ChannelFailure::QuerySyntax(_))
    ));
    assert_eq!(answer.diagnostics.graph_records, 0);
    assert!(answer.diagnostics.text_hits > 0);
    // Not retried
    assert_eq!(p.graph.queries.lock().unwrap().len(), 1);

    let prompt = &p.model.synthesis_prompts()[0];
    assert!(prompt.contains(NO_GRAPH_DATA));
    assert!(prompt.contains("Google Fellow"));
}

#[tokio::test]
async fn test_generation_unavailable_degrades() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        ScriptedModel::new(None),
        embedder,
        RetrievalOptions::default(),
    );

    let answer = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();
    assert!(matches!(
        answer.diagnostics.graph_failure,
        Some(ChannelFailure::GenerationUnavailable(_))
    ));
    assert!(p.graph.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_write_query_is_refused() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        ScriptedModel::new(Some("MATCH (n) DETACH DELETE n")),
        embedder,
        RetrievalOptions::default(),
    );

    let answer = p.orchestrator.ask("Delete everything").await.unwrap();
    assert_eq!(
        answer.diagnostics.graph_failure,
        Some(ChannelFailure::ReadOnlyViolation)
    );
    assert!(p.graph.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_store_unavailable_degrades_or_aborts() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::papers(),
        index.clone(),
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        embedder,
        RetrievalOptions::default(),
    );

    // Load the schema, then lose the store
    p.orchestrator
        .schema_cache()
        .refresh(p.graph.as_ref())
        .await
        .unwrap();
    p.graph.set_down(true);

    let answer = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();
    assert!(matches!(
        answer.diagnostics.graph_failure,
        Some(ChannelFailure::StoreUnavailable(_))
    ));
    assert!(answer.diagnostics.text_hits > 0);

    let strict = pipeline(
        InMemoryGraph::papers(),
        index,
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        BagOfWords::new("bow-64", 64),
        RetrievalOptions {
            abort_on_store_unavailable: true,
            ..Default::default()
        },
    );
    strict
        .orchestrator
        .schema_cache()
        .refresh(strict.graph.as_ref())
        .await
        .unwrap();
    strict.graph.set_down(true);

    let err = strict.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_schema_unavailable_is_surfaced() {
    let graph = InMemoryGraph::papers();
    graph.set_down(true);
    let p = pipeline(
        graph,
        Arc::new(SqliteVectorIndex::in_memory().await.unwrap()),
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        BagOfWords::new("bow-64", 64),
        RetrievalOptions::default(),
    );

    let err = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap_err();
    assert!(matches!(err, Error::SchemaUnavailable(_)));
    assert!(p.model.synthesis_prompts().is_empty());
}

#[tokio::test]
async fn test_synthesis_failure_is_fatal() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let mut model = ScriptedModel::new(Some(JEFFREY_CYPHER));
    model.synthesis_up = false;
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        model,
        embedder,
        RetrievalOptions::default(),
    );

    let err = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap_err();
    assert!(matches!(err, Error::SynthesisUnavailable(_)));
}

#[tokio::test]
async fn test_slow_channel_times_out() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let mut model = ScriptedModel::new(Some(JEFFREY_CYPHER));
    model.cypher_delay = Some(Duration::from_secs(30));
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        model,
        embedder,
        RetrievalOptions {
            channel_timeout: Some(Duration::from_millis(500)),
            ..Default::default()
        },
    );

    let answer = p.orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();
    assert_eq!(answer.diagnostics.graph_failure, Some(ChannelFailure::Timeout));
    assert!(answer.diagnostics.text_hits > 0);
}

#[tokio::test]
async fn test_empty_question_rejected() {
    let p = pipeline(
        InMemoryGraph::papers(),
        Arc::new(SqliteVectorIndex::in_memory().await.unwrap()),
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        BagOfWords::new("bow-64", 64),
        RetrievalOptions::default(),
    );

    let err = p.orchestrator.ask("   ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

// ========== Schema freshness ==========

#[tokio::test]
async fn test_repeated_queries_return_same_records() {
    let embedder = BagOfWords::new("bow-64", 64);
    let index = index_with(&corpus(), &embedder).await;
    let p = pipeline(
        InMemoryGraph::papers(),
        index,
        ScriptedModel::new(Some(JEFFREY_CYPHER)),
        embedder,
        RetrievalOptions::default(),
    );

    let first = p.orchestrator.retrieve("Who is Jeffrey Dean?").await.unwrap();
    let second = p.orchestrator.retrieve("Who is Jeffrey Dean?").await.unwrap();

    let mut a: Vec<String> = first
        .structured
        .records()
        .iter()
        .map(GraphRecord::to_context_line)
        .collect();
    let mut b: Vec<String> = second
        .structured
        .records()
        .iter()
        .map(GraphRecord::to_context_line)
        .collect();
    a.sort();
    b.sort();
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_external_mutation_is_detected() {
    let graph = Arc::new(InMemoryGraph::papers());
    let cache = SchemaCache::new();
    let before = cache.ensure_fresh(graph.as_ref()).await.unwrap();

    // Mutation from outside the process, no refresh
    graph.link(("Bigtable", "Paper"), "CITES", ("GFS", "Paper"));
    assert_eq!(cache.current().await.unwrap(), before);
    assert_eq!(
        cache.check_freshness(graph.as_ref()).await.unwrap(),
        Freshness::Stale
    );

    let after = cache.ensure_fresh(graph.as_ref()).await.unwrap();
    assert!(after.relationship_types().any(|t| t == "CITES"));
    assert!(cache.is_current(&after).await);
    assert_eq!(
        cache.check_freshness(graph.as_ref()).await.unwrap(),
        Freshness::Current
    );
}

#[tokio::test]
async fn test_schema_change_during_query_is_flagged() {
    let embedder = Arc::new(BagOfWords::new("bow-64", 64));
    let index = index_with(&corpus(), &embedder).await;
    let graph = Arc::new(InMemoryGraph::papers());
    let mut model = ScriptedModel::new(Some(JEFFREY_CYPHER));
    model.cypher_delay = Some(Duration::from_millis(300));
    let cache = Arc::new(SchemaCache::new());

    let orchestrator = HybridOrchestrator::builder()
        .graph_store(graph.clone())
        .vector_index(index)
        .language_model(Arc::new(model))
        .embedder(embedder)
        .schema_cache(cache.clone())
        .build()
        .unwrap();

    // A writer lands while the graph query is being generated
    let writer = {
        let graph = graph.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            graph.link(("Bigtable", "Paper"), "CITES", ("GFS", "Paper"));
            cache.invalidate().await;
        })
    };

    let answer = orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();
    writer.await.unwrap();
    assert!(answer.diagnostics.schema_stale);
    assert_eq!(answer.diagnostics.graph_records, 2);

    let again = orchestrator.ask("Who is Jeffrey Dean?").await.unwrap();
    assert!(!again.diagnostics.schema_stale);
}

#[tokio::test]
async fn test_ingestion_refreshes_shared_schema() {
    let graph = Arc::new(InMemoryGraph::default());
    let index = Arc::new(SqliteVectorIndex::in_memory().await.unwrap());
    let model = Arc::new(ScriptedModel::new(Some(JEFFREY_CYPHER)));
    let embedder = Arc::new(BagOfWords::new("bow-64", 64));
    let cache = Arc::new(SchemaCache::new());

    let orchestrator = HybridOrchestrator::builder()
        .graph_store(graph.clone())
        .vector_index(index.clone())
        .language_model(model.clone())
        .embedder(embedder.clone())
        .schema_cache(cache.clone())
        .build()
        .unwrap();

    // Empty graph: the structured channel has nothing
    let before = orchestrator.retrieve("Who is Jeffrey Dean?").await.unwrap();
    assert_eq!(before.structured.failure(), Some(&ChannelFailure::EmptyGraph));

    let ingestor = Ingestor::new(
        graph.clone(),
        index.clone(),
        model.clone(),
        embedder.clone(),
        cache.clone(),
        TextChunker::new(1000, 200).unwrap(),
    );
    let stats = ingestor
        .ingest(
            &[SourceDocument::new(
                "mapreduce.md",
                SourceFormat::Markdown,
                "Jeffrey Dean and Sanjay Ghemawat wrote the MapReduce paper.",
            )],
            false,
        )
        .await
        .unwrap();
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.relationships, 1);
    assert!(!cache.is_stale().await);

    let after = orchestrator.retrieve("Who is Jeffrey Dean?").await.unwrap();
    assert!(after.structured.failure().is_none());
    assert_eq!(after.structured.records().len(), 1);
    assert_eq!(after.semantic.hits[0].source, "mapreduce.md");
}
