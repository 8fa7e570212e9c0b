//! Property-graph access
//!
//! - `store`: the `GraphStore` trait plus the records and documents it exchanges
//! - `schema`: schema snapshots and the `SchemaCache` that keeps them current
//! - `neo4j`: `GraphStore` over the Neo4j HTTP transactional API

mod neo4j;
mod schema;
mod store;

pub use neo4j::Neo4jGraphStore;
pub use schema::{Freshness, GraphSchema, RelationshipPattern, SchemaCache};
pub use store::{GraphDocument, GraphNode, GraphRecord, GraphRelationship, GraphStats, GraphStore};
