//! Hybrid retrieval and synthesis
//!
//! - `generator`: question + schema -> Cypher statement
//! - `structured`: execute the statement with a row cap
//! - `semantic`: embed the question and search the vector index
//! - `synthesis`: merge both kinds of evidence into an answer
//! - `orchestrator`: run the channels and apply the degradation policy

pub mod prompts;

mod generator;
mod orchestrator;
mod semantic;
mod structured;
mod synthesis;
mod types;

pub use generator::QueryGenerator;
pub use orchestrator::{HybridOrchestrator, HybridOrchestratorBuilder, RetrievalOptions};
pub use semantic::SemanticRetriever;
pub use structured::{StructuredRetriever, contains_write_clause};
pub use synthesis::Synthesizer;
pub use types::{
    Answer, ChannelFailure, Citation, Diagnostics, HybridContext, NO_GRAPH_DATA, NO_TEXT_DATA,
    SemanticHit, SemanticResult, StructuredQuery, StructuredResult,
};
