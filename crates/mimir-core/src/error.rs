//! Error types for Mimir

use thiserror::Error;

/// Result type alias using Mimir's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Mimir error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Graph schema unavailable: {0}. Check that the graph store is running with `mimir doctor`.")]
    SchemaUnavailable(String),

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Generated query is invalid: {0}")]
    QuerySyntax(String),

    #[error("Graph query failed: {0}")]
    QueryFailed(String),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check that the service is reachable.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check the model name with `mimir config get llm.default_model`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("{0} timed out")]
    Timeout(String),

    // Pipeline errors (E200-E299)
    #[error("Query generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Answer synthesis unavailable: {0}. Check that the language model endpoint is running.")]
    SynthesisUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Graph extraction failed: {0}")]
    ExtractionFailed(String),

    // Storage errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Vector index unavailable: {0}")]
    VectorIndexUnavailable(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported document format '{0}'. Supported formats: txt, md.")]
    UnsupportedFormat(String),

    // Generic errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaUnavailable(_) => "E001",
            Self::StoreUnavailable(_) => "E002",
            Self::QuerySyntax(_) => "E003",
            Self::QueryFailed(_) => "E004",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::Timeout(_) => "E103",
            Self::GenerationUnavailable(_) => "E200",
            Self::SynthesisUnavailable(_) => "E201",
            Self::EmbeddingFailed(_) => "E202",
            Self::ExtractionFailed(_) => "E203",
            Self::DatabaseError(_) => "E400",
            Self::VectorIndexUnavailable(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::UnsupportedFormat(_) => "E801",
            Self::Serialization(_) | Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SchemaUnavailable(_) | Self::StoreUnavailable(_) => {
                Some("mimir doctor".to_string())
            }
            Self::NetworkError(_) => Some("Check that Ollama and Neo4j are running".to_string()),
            Self::LLMError(_) => Some("mimir config get llm.default_model".to_string()),
            Self::SynthesisUnavailable(_) => Some("mimir doctor".to_string()),
            Self::QuerySyntax(_) => Some("Try rephrasing the question".to_string()),
            Self::UnsupportedFormat(_) => {
                Some("Convert the document to plain text or markdown first".to_string())
            }
            _ => None,
        }
    }

    /// Whether the error means the remote endpoint could not be reached at all
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::SchemaUnavailable(_) => true,
            Self::NetworkError(e) => e.is_connect(),
            _ => false,
        }
    }
}
