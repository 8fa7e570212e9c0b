//! Mimir Core Library
//!
//! This crate provides the core functionality for Mimir, including:
//! - Hybrid retrieval (graph query generation + vector similarity search)
//! - Answer synthesis with graceful degradation when a channel fails
//! - Graph store access (Neo4j HTTP API) with a cached schema description
//! - Vector index storage (SQLite)
//! - LLM integration (OpenAI-compatible API, Ollama by default)
//! - Document ingestion into both stores

pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod storage;
pub mod vector;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::graph::{GraphSchema, GraphStore, SchemaCache};
    pub use crate::llm::{Embedder, LanguageModel};
    pub use crate::rag::{Answer, HybridOrchestrator};
    pub use crate::vector::VectorIndex;
}
