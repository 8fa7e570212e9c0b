//! Structured retrieval: run a generated query against the graph store

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::GraphStore;

use super::types::{ChannelFailure, StructuredQuery, StructuredResult};

/// Clauses that modify the graph
const WRITE_CLAUSES: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "LOAD", "FOREACH",
];

/// Executes generated queries with a row cap
#[derive(Clone)]
pub struct StructuredRetriever {
    store: Arc<dyn GraphStore>,
    row_cap: usize,
    read_only: bool,
}

impl StructuredRetriever {
    pub fn new(store: Arc<dyn GraphStore>, row_cap: usize) -> Self {
        Self {
            store,
            row_cap: row_cap.max(1),
            read_only: true,
        }
    }

    /// Allow statements with write clauses to reach the store
    pub fn allow_writes(mut self) -> Self {
        self.read_only = false;
        self
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Run `query`, consuming it
    ///
    /// Syntax errors, timeouts and other statement-level failures become
    /// `NoData`. A connection-level failure is returned as `Err` so the
    /// caller can decide between degrading and aborting.
    pub async fn execute(&self, query: StructuredQuery) -> Result<StructuredResult> {
        let statement = query.statement().to_string();

        if self.read_only && contains_write_clause(&statement) {
            warn!(statement = %statement, "Refusing to run a write statement");
            return Ok(StructuredResult::NoData {
                statement: Some(statement),
                reason: ChannelFailure::ReadOnlyViolation,
            });
        }

        match self.store.query(&statement, Value::Null).await {
            Ok(mut records) => {
                let truncated = records.len() > self.row_cap;
                records.truncate(self.row_cap);
                debug!(rows = records.len(), truncated = truncated, "Graph query returned");
                Ok(StructuredResult::Records {
                    statement,
                    records,
                    truncated,
                })
            }
            Err(e) if e.is_connection_level() => Err(e),
            Err(e) => {
                warn!(error = %e, statement = %statement, "Graph query failed");
                Ok(StructuredResult::NoData {
                    statement: Some(statement),
                    reason: ChannelFailure::from_graph_error(&e),
                })
            }
        }
    }
}

/// Whether a Cypher statement contains a write clause outside string literals
pub fn contains_write_clause(statement: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut word = String::new();
    let mut words = Vec::new();

    for c in statement.chars() {
        match quote {
            // Backslash escapes apply in string literals, not in backtick identifiers
            Some(_) if escaped => escaped = false,
            Some(q) if c == '\\' && q != '`' => escaped = true,
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' || c == '`' => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
                quote = Some(c);
            }
            None if c.is_alphanumeric() || c == '_' || c == '.' => word.push(c),
            None => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
        }
    }
    if !word.is_empty() {
        words.push(word);
    }

    words
        .iter()
        .any(|w| WRITE_CLAUSES.iter().any(|clause| w.eq_ignore_ascii_case(clause)))
}
