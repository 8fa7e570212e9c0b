//! Neo4j graph store over the HTTP transactional API
//!
//! Every call is a single auto-commit transaction against
//! `POST {endpoint}/db/{database}/tx/commit`, so a batch of statements either
//! applies completely or not at all.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::error::{Error, Result};

use super::schema::GraphSchema;
use super::store::{GraphDocument, GraphRecord, GraphStore};

const NODE_PROPERTIES_STATEMENT: &str = "CALL db.schema.nodeTypeProperties() \
     YIELD nodeLabels, propertyName \
     RETURN nodeLabels, collect(propertyName) AS properties";

const REL_PROPERTIES_STATEMENT: &str = "CALL db.schema.relTypeProperties() \
     YIELD relType, propertyName \
     RETURN relType, collect(propertyName) AS properties";

const RELATIONSHIP_PATTERNS_STATEMENT: &str = "MATCH (a)-[r]->(b) \
     WITH labels(a) AS sources, type(r) AS rel, labels(b) AS targets \
     UNWIND sources AS source UNWIND targets AS target \
     RETURN DISTINCT source, rel, target";

/// One statement in a transactional request
#[derive(Debug, Clone, Serialize)]
struct Statement {
    statement: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    parameters: Value,
    #[serde(rename = "resultDataContents")]
    result_data_contents: Vec<&'static str>,
}

impl Statement {
    fn rows(statement: impl Into<String>, parameters: Value) -> Self {
        Self {
            statement: statement.into(),
            parameters,
            result_data_contents: vec!["row"],
        }
    }

    /// Also request graph data so nodes and relationships keep their labels and types
    fn rows_and_graph(statement: impl Into<String>, parameters: Value) -> Self {
        Self {
            statement: statement.into(),
            parameters,
            result_data_contents: vec!["row", "graph"],
        }
    }
}

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: &'a [Statement],
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    #[serde(default)]
    row: Vec<Value>,
    #[serde(default)]
    meta: Vec<Value>,
    #[serde(default)]
    graph: Option<RowGraph>,
}

#[derive(Debug, Default, Deserialize)]
struct RowGraph {
    #[serde(default)]
    nodes: Vec<WireNode>,
    #[serde(default)]
    relationships: Vec<WireRelationship>,
}

#[derive(Debug, Deserialize)]
struct WireNode {
    id: String,
    #[serde(rename = "elementId")]
    element_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WireRelationship {
    id: String,
    #[serde(rename = "elementId")]
    element_id: Option<String>,
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(rename = "startNode")]
    start_node: String,
    #[serde(rename = "endNode")]
    end_node: String,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Graph store backed by a Neo4j server
#[derive(Clone)]
pub struct Neo4jGraphStore {
    http_client: HttpClient,
    endpoint: String,
    database: String,
    username: String,
    password: Option<String>,
}

impl std::fmt::Debug for Neo4jGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jGraphStore")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.is_some())
            .finish()
    }
}

impl Neo4jGraphStore {
    /// Create a store from configuration, reading the password from the environment
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        let password = config
            .resolved_password()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        Self::new(config, password)
    }

    pub fn new(config: &GraphConfig, password: Option<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    /// Send statements in one transaction and return their results in order
    async fn run(&self, statements: &[Statement]) -> Result<Vec<StatementResult>> {
        let mut request = self
            .http_client
            .post(self.commit_url())
            .header("Accept", "application/json")
            .json(&TxRequest { statements });

        if let Some(password) = &self.password {
            request = request.basic_auth(&self.username, Some(password));
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::StoreUnavailable(format!(
                "Graph store rejected credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::StoreUnavailable(format!(
                "Graph store returned {}: {}",
                status, body
            )));
        }

        let body: TxResponse = response.json().await.map_err(map_transport_error)?;
        if let Some(error) = body.errors.into_iter().next() {
            return Err(classify_tx_error(&error));
        }

        Ok(body.results)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn query(&self, statement: &str, params: Value) -> Result<Vec<GraphRecord>> {
        debug!(statement = %statement, "Running graph query");

        let results = self
            .run(&[Statement::rows_and_graph(statement, params)])
            .await?;

        let Some(result) = results.into_iter().next() else {
            return Ok(Vec::new());
        };

        Ok(result
            .data
            .iter()
            .map(|row| decode_row(&result.columns, row))
            .collect())
    }

    async fn get_schema(&self) -> Result<GraphSchema> {
        let statements = [
            Statement::rows(NODE_PROPERTIES_STATEMENT, Value::Null),
            Statement::rows(REL_PROPERTIES_STATEMENT, Value::Null),
            Statement::rows(RELATIONSHIP_PATTERNS_STATEMENT, Value::Null),
        ];

        let results = self
            .run(&statements)
            .await
            .map_err(|e| Error::SchemaUnavailable(e.to_string()))?;

        let [node_props, rel_props, patterns]: [StatementResult; 3] =
            results.try_into().map_err(|results: Vec<StatementResult>| {
                Error::SchemaUnavailable(format!(
                    "Expected 3 schema results, got {}",
                    results.len()
                ))
            })?;

        let mut schema = GraphSchema::new();

        for row in node_props.data {
            let labels = string_list(row.row.first());
            let properties = string_list(row.row.get(1));
            for label in labels {
                schema.add_node(label, properties.iter().cloned());
            }
        }

        for row in rel_props.data {
            let Some(rel_type) = row.row.first().and_then(Value::as_str) else {
                continue;
            };
            schema.add_relationship_properties(clean_rel_type(rel_type), string_list(row.row.get(1)));
        }

        for row in patterns.data {
            if let [Value::String(source), Value::String(rel), Value::String(target)] =
                row.row.as_slice()
            {
                schema.add_relationship(source.clone(), rel.clone(), target.clone());
            }
        }

        Ok(schema)
    }

    async fn add_graph_documents(&self, documents: &[GraphDocument]) -> Result<()> {
        let statements = merge_statements(documents);
        if statements.is_empty() {
            return Ok(());
        }

        debug!(statements = statements.len(), "Writing graph documents");
        self.run(&statements).await?;
        Ok(())
    }
}

/// Build MERGE statements grouped by label and relationship pattern
fn merge_statements(documents: &[GraphDocument]) -> Vec<Statement> {
    let mut nodes: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut relationships: BTreeMap<(String, String, String), Vec<Value>> = BTreeMap::new();

    for document in documents {
        for node in &document.nodes {
            if node.id.trim().is_empty() {
                continue;
            }
            nodes
                .entry(node.label.clone())
                .or_default()
                .push(json!({ "id": node.id, "properties": node.properties }));
        }

        for rel in &document.relationships {
            if rel.source.id.trim().is_empty() || rel.target.id.trim().is_empty() {
                continue;
            }
            relationships
                .entry((
                    rel.source.label.clone(),
                    rel.rel_type.clone(),
                    rel.target.label.clone(),
                ))
                .or_default()
                .push(json!({
                    "source": rel.source.id,
                    "target": rel.target.id,
                    "properties": rel.properties,
                }));
        }
    }

    let mut statements = Vec::with_capacity(nodes.len() + relationships.len());

    for (label, rows) in nodes {
        statements.push(Statement::rows(
            format!(
                "UNWIND $rows AS row MERGE (n:{} {{id: row.id}}) SET n += row.properties",
                escape_identifier(&label)
            ),
            json!({ "rows": rows }),
        ));
    }

    for ((source, rel_type, target), rows) in relationships {
        statements.push(Statement::rows(
            format!(
                "UNWIND $rows AS row \
                 MERGE (s:{} {{id: row.source}}) \
                 MERGE (t:{} {{id: row.target}}) \
                 MERGE (s)-[r:{}]->(t) SET r += row.properties",
                escape_identifier(&source),
                escape_identifier(&target),
                escape_identifier(&rel_type)
            ),
            json!({ "rows": rows }),
        ));
    }

    statements
}

/// Quote a label or relationship type for interpolation into Cypher
fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `:`WORKS_AT`` -> `WORKS_AT`
fn clean_rel_type(raw: &str) -> String {
    raw.trim_start_matches(':').trim_matches('`').to_string()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Turn one result row into a record, replacing entity cells with readable maps
///
/// Row data alone drops node labels and relationship types, so cells whose
/// meta entry marks them as a node or relationship are rebuilt from the graph
/// section of the response.
fn decode_row(columns: &[String], row: &RowData) -> GraphRecord {
    let graph = row.graph.as_ref();
    let nodes: HashMap<&str, &WireNode> = graph
        .map(|g| {
            g.nodes
                .iter()
                .flat_map(|n| {
                    let mut keys = vec![(n.id.as_str(), n)];
                    if let Some(element_id) = &n.element_id {
                        keys.push((element_id.as_str(), n));
                    }
                    keys
                })
                .collect()
        })
        .unwrap_or_default();

    let mut record = GraphRecord::new();
    for (index, column) in columns.iter().enumerate() {
        let value = row.row.get(index).cloned().unwrap_or(Value::Null);
        let meta = row.meta.get(index);

        let rendered = match (meta_kind(meta), graph) {
            (Some(("node", key)), Some(_)) => nodes
                .get(key.as_str())
                .map(|node| render_node(node))
                .unwrap_or(value),
            (Some(("relationship", key)), Some(g)) => g
                .relationships
                .iter()
                .find(|r| r.id == key || r.element_id.as_deref() == Some(key.as_str()))
                .map(|rel| render_relationship(rel, &nodes))
                .unwrap_or(value),
            _ => value,
        };

        record.insert(column.clone(), rendered);
    }
    record
}

/// Extract `(type, id)` from a meta entry when it describes a single entity
fn meta_kind(meta: Option<&Value>) -> Option<(&str, String)> {
    let meta = meta?.as_object()?;
    let kind = meta.get("type")?.as_str()?;
    let key = match meta.get("elementId").and_then(Value::as_str) {
        Some(element_id) => element_id.to_string(),
        None => match meta.get("id")? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return None,
        },
    };
    Some((kind, key))
}

fn render_node(node: &WireNode) -> Value {
    let mut map: serde_json::Map<String, Value> = node
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    map.insert("labels".to_string(), json!(node.labels));
    Value::Object(map)
}

fn render_relationship(rel: &WireRelationship, nodes: &HashMap<&str, &WireNode>) -> Value {
    let endpoint = |key: &str| -> Value {
        nodes
            .get(key)
            .and_then(|n| n.properties.get("id").cloned())
            .unwrap_or_else(|| Value::String(key.to_string()))
    };

    let mut map: serde_json::Map<String, Value> = rel
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    map.insert("type".to_string(), Value::String(rel.rel_type.clone()));
    map.insert("start".to_string(), endpoint(&rel.start_node));
    map.insert("end".to_string(), endpoint(&rel.end_node));
    Value::Object(map)
}

fn classify_tx_error(error: &TxError) -> Error {
    let code = error.code.as_str();
    if code.contains("Statement.SyntaxError")
        || code.contains("Statement.SemanticError")
        || code.contains("Statement.ParameterMissing")
        || code.contains("Statement.TypeError")
    {
        Error::QuerySyntax(error.message.clone())
    } else if code.contains("TransactionTimedOut") {
        Error::Timeout("Graph query".to_string())
    } else if code.contains("Security.Unauthorized") || code.contains("DatabaseNotFound") {
        Error::StoreUnavailable(error.message.clone())
    } else {
        warn!(code = %code, "Graph query failed");
        Error::QueryFailed(format!("{}: {}", code, error.message))
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout("Graph query".to_string())
    } else {
        Error::StoreUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::{GraphNode, GraphRelationship};
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, password: Option<&str>) -> Neo4jGraphStore {
        let config = GraphConfig {
            endpoint: server.uri(),
            timeout_secs: 5,
            ..Default::default()
        };
        Neo4jGraphStore::new(&config, password.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn test_query_renders_nodes_and_relationships() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["n", "r", "m"],
                    "data": [{
                        "row": [{"id": "Jeffrey Dean"}, {}, {"id": "MapReduce"}],
                        "meta": [
                            {"id": 1, "elementId": "4:x:1", "type": "node", "deleted": false},
                            {"id": 7, "elementId": "5:x:7", "type": "relationship", "deleted": false},
                            {"id": 2, "elementId": "4:x:2", "type": "node", "deleted": false}
                        ],
                        "graph": {
                            "nodes": [
                                {"id": "1", "elementId": "4:x:1", "labels": ["Person"], "properties": {"id": "Jeffrey Dean"}},
                                {"id": "2", "elementId": "4:x:2", "labels": ["Paper"], "properties": {"id": "MapReduce"}}
                            ],
                            "relationships": [
                                {"id": "7", "elementId": "5:x:7", "type": "AUTHOR_OF", "startNode": "1", "endNode": "2", "properties": {}}
                            ]
                        }
                    }]
                }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let store = store_for(&server, Some("secret"));
        let records = store
            .query("MATCH (n:Person)-[r]-(m) RETURN n, r, m", Value::Null)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record.get("n").unwrap(),
            &json!({"id": "Jeffrey Dean", "labels": ["Person"]})
        );
        assert_eq!(
            record.get("r").unwrap(),
            &json!({"type": "AUTHOR_OF", "start": "Jeffrey Dean", "end": "MapReduce"})
        );
    }

    #[tokio::test]
    async fn test_scalar_columns_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["nodes", "edges"],
                    "data": [{"row": [4, 3], "meta": [null, null], "graph": {"nodes": [], "relationships": []}}]
                }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let stats = store_for(&server, None).stats().await.unwrap();
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.edges, 3);
    }

    #[tokio::test]
    async fn test_syntax_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "errors": [{
                    "code": "Neo.ClientError.Statement.SyntaxError",
                    "message": "Invalid input 'MATC'"
                }]
            })))
            .mount(&server)
            .await;

        let err = store_for(&server, None)
            .query("MATC (n) RETURN n", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuerySyntax(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_is_store_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = store_for(&server, Some("wrong")).ping().await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let config = GraphConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let store = Neo4jGraphStore::new(&config, None).unwrap();

        let err = store.query("RETURN 1", Value::Null).await.unwrap_err();
        assert!(err.is_connection_level());
    }

    #[tokio::test]
    async fn test_get_schema_parses_procedures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("db.schema.nodeTypeProperties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"columns": ["nodeLabels", "properties"], "data": [
                        {"row": [["Person"], ["id"]]},
                        {"row": [["Paper"], ["id", "year"]]}
                    ]},
                    {"columns": ["relType", "properties"], "data": [
                        {"row": [":`AUTHOR_OF`", []]}
                    ]},
                    {"columns": ["source", "rel", "target"], "data": [
                        {"row": ["Person", "AUTHOR_OF", "Paper"]}
                    ]}
                ],
                "errors": []
            })))
            .mount(&server)
            .await;

        let schema = store_for(&server, None).get_schema().await.unwrap();
        assert_eq!(schema.labels().collect::<Vec<_>>(), vec!["Paper", "Person"]);
        assert_eq!(schema.relationship_types().collect::<Vec<_>>(), vec!["AUTHOR_OF"]);
        assert!(schema.describe().contains("(:Person)-[:AUTHOR_OF]->(:Paper)"));
    }

    #[tokio::test]
    async fn test_schema_failure_is_schema_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store_for(&server, None).get_schema().await.unwrap_err();
        assert!(matches!(err, Error::SchemaUnavailable(_)));
    }

    #[test]
    fn test_merge_statements_group_by_label() {
        let dean = GraphNode::new("Jeffrey Dean", "Person");
        let ghemawat = GraphNode::new("Sanjay Ghemawat", "Person");
        let paper = GraphNode::new("MapReduce", "Paper");
        let doc = GraphDocument {
            nodes: vec![dean.clone(), ghemawat, paper.clone(), GraphNode::new(" ", "Person")],
            relationships: vec![GraphRelationship::new(dean, "AUTHOR_OF", paper)],
            source: Some("mapreduce.md".to_string()),
        };

        let statements = merge_statements(&[doc]);
        assert_eq!(statements.len(), 3);

        let paper_stmt = &statements[0];
        assert!(paper_stmt.statement.contains("MERGE (n:`Paper` {id: row.id})"));

        let person_stmt = &statements[1];
        assert_eq!(person_stmt.parameters["rows"].as_array().unwrap().len(), 2);

        let rel_stmt = &statements[2];
        assert!(rel_stmt.statement.contains("MERGE (s)-[r:`AUTHOR_OF`]->(t)"));
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("Person"), "`Person`");
        assert_eq!(escape_identifier("Bad`Label"), "`Bad``Label`");
        assert_eq!(clean_rel_type(":`WORKS_AT`"), "WORKS_AT");
    }

    #[test]
    fn test_debug_hides_password() {
        let store = Neo4jGraphStore::new(&GraphConfig::default(), Some("hunter2".into())).unwrap();
        let debug = format!("{:?}", store);
        assert!(!debug.contains("hunter2"));
    }
}
