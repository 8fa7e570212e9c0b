//! Document ingestion into the graph store and the vector index
//!
//! - `source`: source documents and the formats accepted
//! - `chunker`: overlapping text windows
//! - `extractor`: LLM entity/relationship extraction
//! - `service`: the `Ingestor` that ties them together

mod chunker;
mod extractor;
mod service;
mod source;

pub use chunker::{TextChunker, TextSpan};
pub use extractor::GraphExtractor;
pub use service::{IngestStats, Ingestor};
pub use source::{SourceDocument, SourceFormat};
