//! Graph schema snapshot and the cache that holds it
//!
//! The schema description is embedded in query-generation prompts, so it must
//! match what the graph actually holds. `SchemaCache` keeps one immutable
//! snapshot behind an `Arc` and swaps it atomically on refresh; readers never
//! see a half-built schema.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::store::GraphStore;

/// A `(source)-[type]->(target)` triple observed in the graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RelationshipPattern {
    pub source: String,
    pub rel_type: String,
    pub target: String,
}

/// Immutable description of labels, relationship types and properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSchema {
    node_properties: BTreeMap<String, BTreeSet<String>>,
    relationship_properties: BTreeMap<String, BTreeSet<String>>,
    relationships: BTreeSet<RelationshipPattern>,
}

impl GraphSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node label with its property names
    pub fn with_node<I, S>(mut self, label: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_node(label, properties);
        self
    }

    pub fn with_relationship(
        mut self,
        source: impl Into<String>,
        rel_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.add_relationship(source, rel_type, target);
        self
    }

    pub fn add_node<I, S>(&mut self, label: impl Into<String>, properties: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_properties
            .entry(label.into())
            .or_default()
            .extend(properties.into_iter().map(Into::into));
    }

    pub fn add_relationship_properties<I, S>(&mut self, rel_type: impl Into<String>, properties: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationship_properties
            .entry(rel_type.into())
            .or_default()
            .extend(properties.into_iter().map(Into::into));
    }

    pub fn add_relationship(
        &mut self,
        source: impl Into<String>,
        rel_type: impl Into<String>,
        target: impl Into<String>,
    ) {
        let rel_type = rel_type.into();
        self.relationship_properties
            .entry(rel_type.clone())
            .or_default();
        self.relationships.insert(RelationshipPattern {
            source: source.into(),
            rel_type,
            target: target.into(),
        });
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.node_properties.keys().map(String::as_str)
    }

    pub fn relationship_types(&self) -> impl Iterator<Item = &str> {
        self.relationship_properties.keys().map(String::as_str)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipPattern> {
        self.relationships.iter()
    }

    /// A schema with no node labels describes an empty graph
    pub fn is_empty(&self) -> bool {
        self.node_properties.is_empty()
    }

    /// Text rendering embedded in query-generation prompts
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "The graph is empty.".to_string();
        }

        let mut out = String::from("Node properties:\n");
        for (label, props) in &self.node_properties {
            out.push_str(&format!("{} {{{}}}\n", label, join(props)));
        }

        out.push_str("Relationship properties:\n");
        for (rel_type, props) in &self.relationship_properties {
            if !props.is_empty() {
                out.push_str(&format!("{} {{{}}}\n", rel_type, join(props)));
            }
        }

        out.push_str("The relationships:\n");
        for pattern in &self.relationships {
            out.push_str(&format!(
                "(:{})-[:{}]->(:{})\n",
                pattern.source, pattern.rel_type, pattern.target
            ));
        }

        out.trim_end().to_string()
    }

    /// Stable content hash used to detect schema drift
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.describe().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn join(props: &BTreeSet<String>) -> String {
    props.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Result of comparing the cached snapshot with the live graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Current,
    Stale,
}

impl Freshness {
    /// Compare a fingerprint recorded by an earlier process with the live schema
    pub fn against(recorded: &str, live: &GraphSchema) -> Self {
        if recorded == live.fingerprint() {
            Self::Current
        } else {
            Self::Stale
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Option<Arc<GraphSchema>>,
    invalidated: bool,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Holds the current schema snapshot
#[derive(Debug, Default)]
pub struct SchemaCache {
    state: RwLock<CacheState>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with a known snapshot
    pub fn with_schema(schema: GraphSchema) -> Self {
        Self {
            state: RwLock::new(CacheState {
                snapshot: Some(Arc::new(schema)),
                invalidated: false,
                refreshed_at: Some(Utc::now()),
            }),
        }
    }

    /// Re-read the schema from the store and replace the snapshot
    ///
    /// On failure the previous snapshot is kept and `SchemaUnavailable` is
    /// returned.
    pub async fn refresh(&self, store: &dyn GraphStore) -> Result<Arc<GraphSchema>> {
        let schema = store.get_schema().await.map_err(|e| match e {
            Error::SchemaUnavailable(_) => e,
            other => Error::SchemaUnavailable(other.to_string()),
        })?;
        let schema = Arc::new(schema);

        let mut state = self.state.write().await;
        state.snapshot = Some(Arc::clone(&schema));
        state.invalidated = false;
        state.refreshed_at = Some(Utc::now());

        let fingerprint = schema.fingerprint();
        info!(
            labels = schema.labels().count(),
            relationship_types = schema.relationship_types().count(),
            fingerprint = %&fingerprint[..12],
            "Graph schema refreshed"
        );

        Ok(schema)
    }

    /// Latest snapshot, without consulting the store
    pub async fn current(&self) -> Result<Arc<GraphSchema>> {
        self.state
            .read()
            .await
            .snapshot
            .clone()
            .ok_or_else(|| Error::SchemaUnavailable("schema has not been loaded".to_string()))
    }

    /// Mark the snapshot stale; the next `ensure_fresh` re-reads it
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.invalidated = true;
        debug!("Graph schema invalidated");
    }

    pub async fn is_stale(&self) -> bool {
        let state = self.state.read().await;
        state.invalidated || state.snapshot.is_none()
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }

    /// Return the snapshot, refreshing first when missing or invalidated
    pub async fn ensure_fresh(&self, store: &dyn GraphStore) -> Result<Arc<GraphSchema>> {
        {
            let state = self.state.read().await;
            if !state.invalidated
                && let Some(snapshot) = &state.snapshot
            {
                return Ok(Arc::clone(snapshot));
            }
        }
        self.refresh(store).await
    }

    /// Compare the cached fingerprint with the live graph
    ///
    /// A mismatch marks the cache invalidated so the next `ensure_fresh`
    /// picks up the new schema.
    pub async fn check_freshness(&self, store: &dyn GraphStore) -> Result<Freshness> {
        let live = store
            .get_schema()
            .await
            .map_err(|e| Error::SchemaUnavailable(e.to_string()))?;

        let mut state = self.state.write().await;
        let matches = state
            .snapshot
            .as_ref()
            .is_some_and(|cached| cached.fingerprint() == live.fingerprint());

        if matches && !state.invalidated {
            Ok(Freshness::Current)
        } else {
            if !matches {
                warn!("Cached graph schema differs from the live graph");
            }
            state.invalidated = true;
            Ok(Freshness::Stale)
        }
    }

    /// Whether `schema` is the snapshot currently held and not invalidated
    pub async fn is_current(&self, schema: &GraphSchema) -> bool {
        let state = self.state.read().await;
        !state.invalidated
            && state
                .snapshot
                .as_ref()
                .is_some_and(|cached| cached.fingerprint() == schema.fingerprint())
    }
}
