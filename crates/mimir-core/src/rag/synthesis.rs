//! Answer synthesis from the merged evidence

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::llm::LanguageModel;

use super::prompts::synthesis_prompt;
use super::types::{Answer, Citation, Diagnostics, HybridContext};

#[derive(Clone)]
pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Build the synthesis prompt for `context`
    pub fn prompt(&self, context: &HybridContext) -> String {
        synthesis_prompt(
            &context.graph_evidence(),
            &context.text_evidence(),
            &context.question,
        )
    }

    /// Ask the model for one answer covering both evidence sections
    ///
    /// Citations come from the semantic hits. Diagnostics are left for the
    /// caller to fill in.
    pub async fn synthesize(&self, context: &HybridContext) -> Result<Answer> {
        let prompt = self.prompt(context);

        let text = self.model.complete(&prompt).await.map_err(|e| {
            error!(error = %e, model = %self.model.model_name(), "Synthesis failed");
            Error::SynthesisUnavailable(e.to_string())
        })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::SynthesisUnavailable(
                "Model returned an empty answer".to_string(),
            ));
        }

        debug!(chars = text.len(), "Answer synthesized");

        Ok(Answer {
            text,
            citations: context.semantic.hits.iter().map(Citation::from).collect(),
            diagnostics: Diagnostics::default(),
        })
    }
}
