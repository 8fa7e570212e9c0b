//! Structured query generation
//!
//! Turns a question plus the current schema into a Cypher statement using
//! the generation template.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::GraphSchema;
use crate::llm::LanguageModel;

use super::prompts::cypher_generation_prompt;
use super::types::StructuredQuery;

/// Generates Cypher statements with a language model
#[derive(Clone)]
pub struct QueryGenerator {
    model: Arc<dyn LanguageModel>,
}

impl QueryGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Produce a statement for `question` against `schema`
    ///
    /// The caller passes the freshest snapshot. A model failure or empty
    /// output yields `GenerationUnavailable`.
    pub async fn generate(
        &self,
        question: &str,
        schema: Arc<GraphSchema>,
    ) -> Result<StructuredQuery> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".to_string()));
        }

        let prompt = cypher_generation_prompt(&schema.describe(), question);
        let raw = self.model.complete(&prompt).await.map_err(|e| {
            warn!(error = %e, "Query generation failed");
            Error::GenerationUnavailable(e.to_string())
        })?;

        let statement = clean_statement(&raw);
        if statement.is_empty() {
            return Err(Error::GenerationUnavailable(
                "Model returned an empty query".to_string(),
            ));
        }

        debug!(statement = %statement, "Generated graph query");
        Ok(StructuredQuery::new(statement, schema))
    }
}

/// Strip code fences and a leading `Cypher:` label from model output
fn clean_statement(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip a language tag on the fence line
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        text = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    }

    let text = text.trim();
    let text = text
        .strip_prefix("Cypher:")
        .or_else(|| text.strip_prefix("cypher:"))
        .unwrap_or(text);

    text.trim().trim_end_matches(';').trim().to_string()
}
