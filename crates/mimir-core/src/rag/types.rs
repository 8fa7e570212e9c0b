//! Values passed between the retrieval channels and synthesis

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::Error;
use crate::graph::{GraphRecord, GraphSchema};
use crate::vector::ScoredChunk;

/// Placeholder for the graph section when the structured channel has nothing
pub const NO_GRAPH_DATA: &str = "No graph data available.";

/// Placeholder for the text section when the semantic channel has nothing
pub const NO_TEXT_DATA: &str = "No relevant text passages found.";

/// Maximum excerpt length in citations, in characters
const EXCERPT_CHARS: usize = 200;

/// A generated graph query bound to the schema it was written against
#[derive(Debug, Clone)]
pub struct StructuredQuery {
    statement: String,
    schema: Arc<GraphSchema>,
}

impl StructuredQuery {
    pub fn new(statement: impl Into<String>, schema: Arc<GraphSchema>) -> Self {
        Self {
            statement: statement.into(),
            schema,
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn schema(&self) -> &GraphSchema {
        &self.schema
    }
}

/// Why a retrieval channel produced no evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ChannelFailure {
    GenerationUnavailable(String),
    EmptyGraph,
    QuerySyntax(String),
    QueryFailed(String),
    ReadOnlyViolation,
    StoreUnavailable(String),
    Timeout,
    EmbeddingUnavailable(String),
    IndexUnavailable(String),
}

impl ChannelFailure {
    /// Classify an error raised while running the structured channel
    pub fn from_graph_error(err: &Error) -> Self {
        match err {
            Error::QuerySyntax(msg) => Self::QuerySyntax(msg.clone()),
            Error::Timeout(_) => Self::Timeout,
            Error::GenerationUnavailable(msg) => Self::GenerationUnavailable(msg.clone()),
            e if e.is_connection_level() => Self::StoreUnavailable(e.to_string()),
            e => Self::QueryFailed(e.to_string()),
        }
    }
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerationUnavailable(msg) => write!(f, "query generation unavailable: {}", msg),
            Self::EmptyGraph => write!(f, "graph is empty"),
            Self::QuerySyntax(msg) => write!(f, "generated query rejected: {}", msg),
            Self::QueryFailed(msg) => write!(f, "graph query failed: {}", msg),
            Self::ReadOnlyViolation => write!(f, "generated query contains a write clause"),
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
            Self::Timeout => write!(f, "timed out"),
            Self::EmbeddingUnavailable(msg) => write!(f, "embedding unavailable: {}", msg),
            Self::IndexUnavailable(msg) => write!(f, "vector index unavailable: {}", msg),
        }
    }
}

/// Outcome of the structured channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StructuredResult {
    Records {
        statement: String,
        records: Vec<GraphRecord>,
        /// More rows matched than the row cap allowed through
        truncated: bool,
    },
    NoData {
        statement: Option<String>,
        reason: ChannelFailure,
    },
}

impl StructuredResult {
    pub fn no_data(reason: ChannelFailure) -> Self {
        Self::NoData {
            statement: None,
            reason,
        }
    }

    pub fn records(&self) -> &[GraphRecord] {
        match self {
            Self::Records { records, .. } => records,
            Self::NoData { .. } => &[],
        }
    }

    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Records { statement, .. } => Some(statement),
            Self::NoData { statement, .. } => statement.as_deref(),
        }
    }

    pub fn failure(&self) -> Option<&ChannelFailure> {
        match self {
            Self::Records { .. } => None,
            Self::NoData { reason, .. } => Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// One passage returned by the semantic channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
    pub offset: usize,
    pub score: f32,
}

impl From<ScoredChunk> for SemanticHit {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            content: scored.chunk.content,
            source: scored.chunk.source,
            page: scored.chunk.page,
            offset: scored.chunk.offset,
            score: scored.score,
        }
    }
}

/// Outcome of the semantic channel: hits best-first, or why there are none
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SemanticResult {
    pub hits: Vec<SemanticHit>,
    pub failure: Option<ChannelFailure>,
}

impl SemanticResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(failure: ChannelFailure) -> Self {
        Self {
            hits: Vec::new(),
            failure: Some(failure),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Everything synthesis sees for one question
///
/// Both sections always render to text: real evidence or a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridContext {
    pub question: String,
    pub structured: StructuredResult,
    pub semantic: SemanticResult,
    /// The graph schema changed while the graph query was in flight
    pub schema_stale: bool,
}

impl HybridContext {
    pub fn new(
        question: impl Into<String>,
        structured: StructuredResult,
        semantic: SemanticResult,
    ) -> Self {
        Self {
            question: question.into(),
            structured,
            semantic,
            schema_stale: false,
        }
    }

    pub fn with_schema_stale(mut self, stale: bool) -> Self {
        self.schema_stale = stale;
        self
    }

    /// Graph records as one JSON line each, or the sentinel
    pub fn graph_evidence(&self) -> String {
        let records = self.structured.records();
        if records.is_empty() {
            return NO_GRAPH_DATA.to_string();
        }
        records
            .iter()
            .map(GraphRecord::to_context_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Numbered passages with their source, or the sentinel
    pub fn text_evidence(&self) -> String {
        if self.semantic.hits.is_empty() {
            return NO_TEXT_DATA.to_string();
        }
        self.semantic
            .hits
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                let location = match hit.page {
                    Some(page) => format!("{}, page {}", hit.source, page),
                    None => hit.source.clone(),
                };
                format!("[{}] ({})\n{}", i + 1, location, hit.content.trim())
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn has_evidence(&self) -> bool {
        !self.structured.is_empty() || !self.semantic.is_empty()
    }
}

/// A source passage backing an answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub document_id: String,
    pub page: Option<u32>,
    pub excerpt: String,
}

impl From<&SemanticHit> for Citation {
    fn from(hit: &SemanticHit) -> Self {
        let trimmed = hit.content.trim();
        let excerpt = match trimmed.char_indices().nth(EXCERPT_CHARS) {
            Some((cut, _)) => format!("{}...", &trimmed[..cut]),
            None => trimmed.to_string(),
        };
        Self {
            document_id: hit.source.clone(),
            page: hit.page,
            excerpt,
        }
    }
}

/// How each channel fared for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub query_id: Uuid,
    pub graph_statement: Option<String>,
    pub graph_records: usize,
    pub graph_truncated: bool,
    pub graph_failure: Option<ChannelFailure>,
    pub text_hits: usize,
    pub text_failure: Option<ChannelFailure>,
    pub schema_stale: bool,
    pub elapsed: Duration,
}

impl Diagnostics {
    pub fn from_context(query_id: Uuid, context: &HybridContext, elapsed: Duration) -> Self {
        Self {
            query_id,
            graph_statement: context.structured.statement().map(str::to_string),
            graph_records: context.structured.records().len(),
            graph_truncated: matches!(
                context.structured,
                StructuredResult::Records { truncated: true, .. }
            ),
            graph_failure: context.structured.failure().cloned(),
            text_hits: context.semantic.hits.len(),
            text_failure: context.semantic.failure.clone(),
            schema_stale: context.schema_stale,
            elapsed,
        }
    }
}

/// Final response for a question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub diagnostics: Diagnostics,
}

impl Answer {
    pub fn graph_statement(&self) -> Option<&str> {
        self.diagnostics.graph_statement.as_deref()
    }

    /// True when at least one channel contributed evidence
    pub fn is_grounded(&self) -> bool {
        self.diagnostics.graph_records > 0 || self.diagnostics.text_hits > 0
    }
}
