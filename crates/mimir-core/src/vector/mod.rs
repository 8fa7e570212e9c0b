//! Vector index over embedded text chunks
//!
//! - `index`: the `VectorIndex` trait, chunk types and similarity helpers
//! - `sqlite`: `VectorIndex` stored in a local SQLite file

mod index;
mod sqlite;

pub use index::{
    DocumentChunk, ScoredChunk, VectorIndex, cosine_similarity, decode_embedding,
    encode_embedding,
};
pub use sqlite::SqliteVectorIndex;
