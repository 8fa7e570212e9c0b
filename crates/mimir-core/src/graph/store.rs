//! Graph store trait and the records it exchanges
//!
//! The trait abstracts over the property-graph backend. The pipeline only
//! needs `query` and `get_schema`; ingestion uses `add_graph_documents`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::schema::GraphSchema;

/// Statement used by the default `stats` implementation
const STATS_STATEMENT: &str = "MATCH (n) OPTIONAL MATCH (n)-[r]->() \
     RETURN count(DISTINCT n) AS nodes, count(r) AS edges";

/// One row returned by a graph query, keyed by column name
///
/// Columns are kept in a sorted map so two executions of the same query
/// render identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphRecord(BTreeMap<String, Value>);

impl GraphRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.0.insert(column.into(), value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Single-line JSON rendering used as synthesis context
    pub fn to_context_line(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl From<BTreeMap<String, Value>> for GraphRecord {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// A node to be written to the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Entity identifier (the `id` property queries match on)
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed relationship to be written to the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub source: GraphNode,
    pub target: GraphNode,
    pub rel_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl GraphRelationship {
    pub fn new(source: GraphNode, rel_type: impl Into<String>, target: GraphNode) -> Self {
        Self {
            source,
            target,
            rel_type: rel_type.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Nodes and relationships extracted from one piece of source text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    /// Identifier of the document the graph was extracted from
    pub source: Option<String>,
}

impl GraphDocument {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

/// Node and edge counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: u64,
    pub edges: u64,
}

/// Property-graph store used by the structured channel
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a read statement and return its rows
    ///
    /// Errors are classified: `QuerySyntax` for malformed statements,
    /// `Timeout` for slow queries, `StoreUnavailable` when the store cannot
    /// be reached.
    async fn query(&self, statement: &str, params: Value) -> Result<Vec<GraphRecord>>;

    /// Read the current label, relationship type and property catalogue
    async fn get_schema(&self) -> Result<GraphSchema>;

    /// Write extracted nodes and relationships (merge semantics)
    async fn add_graph_documents(&self, documents: &[GraphDocument]) -> Result<()>;

    /// Count nodes and edges
    async fn stats(&self) -> Result<GraphStats> {
        let rows = self.query(STATS_STATEMENT, Value::Null).await?;
        let row = rows
            .first()
            .ok_or_else(|| Error::QueryFailed("Statistics query returned no rows".to_string()))?;

        Ok(GraphStats {
            nodes: row.get("nodes").and_then(Value::as_u64).unwrap_or(0),
            edges: row.get("edges").and_then(Value::as_u64).unwrap_or(0),
        })
    }

    /// Delete every node and relationship
    async fn clear(&self) -> Result<()> {
        self.query("MATCH (n) DETACH DELETE n", Value::Null).await?;
        Ok(())
    }

    /// Cheap connectivity check
    async fn ping(&self) -> Result<()> {
        self.query("RETURN 1 AS ok", Value::Null).await?;
        Ok(())
    }
}
