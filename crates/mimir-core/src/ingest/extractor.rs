//! LLM-based graph extraction
//!
//! Prompts the language model for entities and relationships in a passage
//! and converts its JSON reply into a `GraphDocument`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{GraphDocument, GraphNode, GraphRelationship};
use crate::llm::LanguageModel;
use crate::rag::prompts::extraction_prompt;

/// Label used when the model gives no usable node type
const DEFAULT_LABEL: &str = "Entity";

/// Response structure from LLM extraction
#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    nodes: Vec<ExtractedNode>,
    #[serde(default)]
    relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Deserialize)]
struct ExtractedNode {
    id: String,
    #[serde(rename = "type", default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedRelationship {
    source: String,
    #[serde(default)]
    source_type: Option<String>,
    target: String,
    #[serde(default)]
    target_type: Option<String>,
    #[serde(rename = "type")]
    rel_type: String,
}

/// Extracts a knowledge graph from text with a language model
#[derive(Clone)]
pub struct GraphExtractor {
    model: Arc<dyn LanguageModel>,
}

impl GraphExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Extract nodes and relationships from one passage of `source`
    pub async fn extract(&self, text: &str, source: &str) -> Result<GraphDocument> {
        let response = self
            .model
            .complete(&extraction_prompt(text))
            .await
            .map_err(|e| Error::ExtractionFailed(e.to_string()))?;

        let json_str = extract_json_from_response(&response);
        let extraction: ExtractionResponse = serde_json::from_str(&json_str).map_err(|e| {
            warn!(error = %e, "Failed to parse extraction response as JSON");
            Error::ExtractionFailed(format!("Invalid response: {}", e))
        })?;

        let document = build_document(extraction, source);
        debug!(
            source = %source,
            nodes = document.nodes.len(),
            relationships = document.relationships.len(),
            "Graph extracted"
        );
        Ok(document)
    }
}

fn build_document(extraction: ExtractionResponse, source: &str) -> GraphDocument {
    // id -> label, first mention wins
    let mut labels: HashMap<String, String> = HashMap::new();
    let mut nodes: BTreeMap<(String, String), GraphNode> = BTreeMap::new();

    for node in extraction.nodes {
        let id = node.id.trim().to_string();
        if id.is_empty() {
            continue;
        }
        let label = normalize_label(node.label.as_deref());
        labels.entry(id.clone()).or_insert_with(|| label.clone());
        nodes
            .entry((label.clone(), id.clone()))
            .or_insert_with(|| GraphNode::new(id, label));
    }

    let mut relationships = Vec::new();
    for rel in extraction.relationships {
        let source_id = rel.source.trim().to_string();
        let target_id = rel.target.trim().to_string();
        let rel_type = normalize_rel_type(&rel.rel_type);
        if source_id.is_empty() || target_id.is_empty() || rel_type.is_empty() {
            continue;
        }

        let endpoint = |id: &str, given: Option<&str>| -> GraphNode {
            let label = labels
                .get(id)
                .cloned()
                .unwrap_or_else(|| normalize_label(given));
            GraphNode::new(id, label)
        };
        let source_node = endpoint(&source_id, rel.source_type.as_deref());
        let target_node = endpoint(&target_id, rel.target_type.as_deref());

        for node in [&source_node, &target_node] {
            nodes
                .entry((node.label.clone(), node.id.clone()))
                .or_insert_with(|| node.clone());
        }

        relationships.push(GraphRelationship::new(source_node, rel_type, target_node));
    }

    GraphDocument {
        nodes: nodes.into_values().collect(),
        relationships,
        source: Some(source.to_string()),
    }
}

/// `"programming language"` -> `ProgrammingLanguage`
fn normalize_label(raw: Option<&str>) -> String {
    let label: String = raw
        .unwrap_or_default()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    match label.chars().next() {
        Some(c) if c.is_alphabetic() => label,
        _ => DEFAULT_LABEL.to_string(),
    }
}

/// `"works at"` -> `WORKS_AT`
fn normalize_rel_type(raw: &str) -> String {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Extract JSON from an LLM response that might contain markdown code blocks
fn extract_json_from_response(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        return response[start..=end].to_string();
    }

    response.to_string()
}
