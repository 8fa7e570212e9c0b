//! Instruction templates for query generation, synthesis and extraction

/// Template for turning a question into a Cypher statement
///
/// Placeholders: `{schema}`, `{question}`.
pub const CYPHER_GENERATION_TEMPLATE: &str = r#"Task: Generate a Cypher statement to query a graph database.

Instructions:
- Use only the node labels, relationship types and properties listed in the schema.
- Entity names in the graph may differ in spelling or capitalization from the question.
  Always match entities with a case-insensitive substring test on the id property,
  for example: WHERE toLower(n.id) CONTAINS "term". Use a short, distinctive term.
- When asked about an entity, retrieve the node together with all of its immediate
  relationships and neighbours, for example: MATCH (n)-[r]-(m) ... RETURN n, r, m.
  This gives enough context to explain what the entity is and how it is connected.
- Only read from the graph. Never use CREATE, MERGE, SET, DELETE or REMOVE.
- Return only the Cypher statement. Do not add explanations or apologies.

Schema:
{schema}

Examples:
Question: Tell me about Map Reduce
Cypher: MATCH (n)-[r]-(m) WHERE toLower(n.id) CONTAINS "mapreduce" OR toLower(n.id) CONTAINS "map reduce" RETURN n, r, m

Question: Who is Jeffrey Dean?
Cypher: MATCH (n:Person)-[r]-(m) WHERE toLower(n.id) CONTAINS "jeffrey" RETURN n, r, m

Question: What is HDFS used for?
Cypher: MATCH (n)-[r]-(m) WHERE toLower(n.id) CONTAINS "hdfs" RETURN n, r, m

Question: Details about the Mapreduce Library
Cypher: MATCH (n)-[r]-(m) WHERE toLower(n.id) CONTAINS "mapreduce library" RETURN n, r, m

Question: {question}
Cypher:"#;

/// Template for merging both kinds of evidence into one answer
///
/// Placeholders: `{graph_context}`, `{text_context}`, `{question}`.
pub const SYNTHESIS_TEMPLATE: &str = r#"You are Mimir, an assistant that answers questions from a knowledge graph and a document collection.

You are given two kinds of evidence:
- Graph evidence: entities and relationships retrieved from the knowledge graph.
- Text evidence: passages retrieved from the source documents.

Instructions:
- Analyze: when graph evidence is present, treat it as the primary source for how
  entities relate to each other.
- Synthesize: use text evidence for definitions, descriptions and detail that the
  graph does not hold.
- Be comprehensive: write one coherent answer in prose, not a list of disconnected facts.
- If both sections say no data is available, say that there is not enough grounded
  information to answer. Do not invent facts.

Graph evidence:
{graph_context}

Text evidence:
{text_context}

Question: {question}

Answer:"#;

/// Template for extracting entities and relationships from a passage
///
/// Placeholder: `{text}`.
pub const EXTRACTION_TEMPLATE: &str = r#"Extract a knowledge graph from the text below.

Return JSON only, in this shape:
{
  "nodes": [{"id": "Jeffrey Dean", "type": "Person"}],
  "relationships": [{"source": "Jeffrey Dean", "source_type": "Person", "target": "MapReduce", "target_type": "Technology", "type": "CREATED"}]
}

Rules:
- Node ids are the entity names as written in the text, in title case.
- Node types are single CamelCase words such as Person, Organization, Technology, Concept, Paper.
- Relationship types are UPPER_SNAKE_CASE verbs such as CREATED, WORKS_AT, USES, PART_OF.
- Every relationship endpoint must also appear in "nodes".
- Do not include anything that is not stated in the text.

Text:
{text}"#;

pub fn cypher_generation_prompt(schema: &str, question: &str) -> String {
    render(
        CYPHER_GENERATION_TEMPLATE,
        &[("schema", schema), ("question", question)],
    )
}

pub fn synthesis_prompt(graph_context: &str, text_context: &str, question: &str) -> String {
    render(
        SYNTHESIS_TEMPLATE,
        &[
            ("graph_context", graph_context),
            ("text_context", text_context),
            ("question", question),
        ],
    )
}

pub fn extraction_prompt(text: &str) -> String {
    render(EXTRACTION_TEMPLATE, &[("text", text)])
}

/// Fill `{name}` placeholders in a single left-to-right pass
///
/// Inserted values are never rescanned, so evidence that happens to contain
/// `{question}` reaches the model verbatim. Braces that do not name a
/// placeholder are copied through.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_brace = &rest[open + 1..];
        let hit = values.iter().find_map(|(name, value)| {
            after_brace
                .strip_prefix(name)?
                .strip_prefix('}')
                .map(|remaining| (*value, remaining))
        });
        match hit {
            Some((value, remaining)) => {
                out.push_str(value);
                rest = remaining;
            }
            None => {
                out.push('{');
                rest = after_brace;
            }
        }
    }
    out.push_str(rest);
    out
}
