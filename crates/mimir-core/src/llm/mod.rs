//! LLM integration - OpenAI-compatible API (Ollama by default)
//!
//! This module provides:
//! - The `LanguageModel` and `Embedder` capability traits used by the pipeline
//! - An HTTP client implementing both against a local model server
//! - Request/response types matching the OpenAI-compatible API

mod client;
mod traits;
mod types;

pub use client::{DETERMINISTIC_TEMPERATURE, LlmClient, LlmClientBuilder};
pub use traits::{Embedder, LanguageModel};
pub use types::{FinishReason, LlmResponse, Message, MessageRole};
