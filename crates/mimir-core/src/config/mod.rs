//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Mimir configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub graph: GraphConfig,
    pub vector: VectorConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    /// OpenAI-compatible endpoint (Ollama serves one under /v1)
    pub base_url: String,
    pub default_model: String,
    pub available_models: Vec<String>,
    /// Must match the model the vector index was built with
    pub embedding_model: String,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neo4j HTTP endpoint
    pub endpoint: String,
    pub database: String,
    pub username: String,
    #[serde(skip)]
    pub password: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// SQLite file holding chunk embeddings
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub row_cap: usize,
    pub min_score: f32,
    pub channel_timeout_secs: Option<u64>,
    pub read_only: bool,
    pub abort_on_store_unavailable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "http://localhost:11434/v1".to_string(),
            default_model: "llama3.2".to_string(),
            available_models: vec![
                "llama3.2".to_string(),
                "phi3:mini".to_string(),
                "mistral".to_string(),
                "llama3.1:8b".to_string(),
                "qwen2.5:7b".to_string(),
            ],
            embedding_model: "nomic-embed-text".to_string(),
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password: None,
            timeout_secs: 30,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            path: default_vector_path(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            row_cap: 25,
            min_score: 0.0,
            channel_timeout_secs: None,
            read_only: true,
            abort_on_store_unavailable: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Get the default vector index path
pub fn default_vector_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("mimir").join("vectors.db")
    } else {
        PathBuf::from("mimir-vectors.db")
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;
        Ok(env::var("MIMIR_API_KEY").ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl GraphConfig {
    pub fn resolved_password(&self) -> anyhow::Result<Option<String>> {
        if self.password.is_some() {
            return Err(anyhow!(
                "Graph passwords must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(env::var("MIMIR_GRAPH_PASSWORD")
            .or_else(|_| env::var("NEO4J_PASSWORD"))
            .ok())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("MIMIR_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("mimir")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.graph.password.is_some() {
            return Err(anyhow!("Graph password must not be stored in configuration"));
        }
        if self.retrieval.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be at least 1"));
        }
        if !(1..=500).contains(&self.retrieval.row_cap) {
            return Err(anyhow!("retrieval.row_cap must be between 1 and 500"));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(anyhow!("ingest.chunk_overlap must be smaller than ingest.chunk_size"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // LLM settings
            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.available_models" => Ok(self.llm.available_models.join(", ")),
            "llm.embedding_model" => Ok(self.llm.embedding_model.clone()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            // Graph settings
            "graph.endpoint" => Ok(self.graph.endpoint.clone()),
            "graph.database" => Ok(self.graph.database.clone()),
            "graph.username" => Ok(self.graph.username.clone()),
            "graph.timeout_secs" => Ok(self.graph.timeout_secs.to_string()),

            // Vector settings
            "vector.path" => Ok(self.vector.path.display().to_string()),

            // Retrieval settings
            "retrieval.top_k" => Ok(self.retrieval.top_k.to_string()),
            "retrieval.row_cap" => Ok(self.retrieval.row_cap.to_string()),
            "retrieval.min_score" => Ok(self.retrieval.min_score.to_string()),
            "retrieval.channel_timeout_secs" => Ok(self
                .retrieval
                .channel_timeout_secs
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(none)".to_string())),
            "retrieval.read_only" => Ok(self.retrieval.read_only.to_string()),
            "retrieval.abort_on_store_unavailable" => {
                Ok(self.retrieval.abort_on_store_unavailable.to_string())
            }

            // Ingest settings
            "ingest.chunk_size" => Ok(self.ingest.chunk_size.to_string()),
            "ingest.chunk_overlap" => Ok(self.ingest.chunk_overlap.to_string()),

            // Secrets (special handling - never shown)
            "llm.api_key" | "api_key" => Ok(match self.llm.resolved_api_key()? {
                Some(_) => "(set via MIMIR_API_KEY)".to_string(),
                None => "(not set - optional, use MIMIR_API_KEY env var)".to_string(),
            }),
            "graph.password" => Ok(match self.graph.resolved_password()? {
                Some(_) => "(set via environment)".to_string(),
                None => "(not set - use MIMIR_GRAPH_PASSWORD env var)".to_string(),
            }),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `mimir config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            // LLM settings
            "llm.base_url" => self.llm.base_url = value.trim_end_matches('/').to_string(),
            "llm.default_model" => self.llm.default_model = value.to_string(),
            "llm.available_models" => {
                self.llm.available_models = split_list(value);
            }
            "llm.embedding_model" => self.llm.embedding_model = value.to_string(),
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // Graph settings
            "graph.endpoint" => self.graph.endpoint = value.trim_end_matches('/').to_string(),
            "graph.database" => self.graph.database = value.to_string(),
            "graph.username" => self.graph.username = value.to_string(),
            "graph.timeout_secs" => {
                self.graph.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // Vector settings
            "vector.path" => self.vector.path = PathBuf::from(value),

            // Retrieval settings
            "retrieval.top_k" => {
                let top_k: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
                if top_k == 0 {
                    return Err(anyhow!("top_k must be at least 1"));
                }
                self.retrieval.top_k = top_k;
            }
            "retrieval.row_cap" => {
                let cap: usize = value
                    .parse()
                    .with_context(|| format!("Invalid row_cap value: {}", value))?;
                if !(1..=500).contains(&cap) {
                    return Err(anyhow!("row_cap must be between 1 and 500"));
                }
                self.retrieval.row_cap = cap;
            }
            "retrieval.min_score" => {
                let score: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid min_score value: {}", value))?;
                if !(-1.0..=1.0).contains(&score) {
                    return Err(anyhow!("min_score must be between -1.0 and 1.0"));
                }
                self.retrieval.min_score = score;
            }
            "retrieval.channel_timeout_secs" => {
                self.retrieval.channel_timeout_secs = match value {
                    "" | "none" => None,
                    v => Some(
                        v.parse()
                            .with_context(|| format!("Invalid channel_timeout_secs value: {}", v))?,
                    ),
                };
            }
            "retrieval.read_only" => {
                self.retrieval.read_only = parse_bool(value)?;
            }
            "retrieval.abort_on_store_unavailable" => {
                self.retrieval.abort_on_store_unavailable = parse_bool(value)?;
            }

            // Ingest settings
            "ingest.chunk_size" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid chunk_size value: {}", value))?;
                if size <= self.ingest.chunk_overlap {
                    return Err(anyhow!("chunk_size must be larger than chunk_overlap"));
                }
                self.ingest.chunk_size = size;
            }
            "ingest.chunk_overlap" => {
                let overlap: usize = value
                    .parse()
                    .with_context(|| format!("Invalid chunk_overlap value: {}", value))?;
                if overlap >= self.ingest.chunk_size {
                    return Err(anyhow!("chunk_overlap must be smaller than chunk_size"));
                }
                self.ingest.chunk_overlap = overlap;
            }

            // Secrets cannot be set via config
            "llm.api_key" | "api_key" | "graph.password" => {
                return Err(anyhow!(
                    "Secrets cannot be stored in configuration. \
                     Set MIMIR_API_KEY or MIMIR_GRAPH_PASSWORD environment variables instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `mimir config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.base_url",
            "llm.default_model",
            "llm.available_models",
            "llm.embedding_model",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "graph.endpoint",
            "graph.database",
            "graph.username",
            "graph.password",
            "graph.timeout_secs",
            "vector.path",
            "retrieval.top_k",
            "retrieval.row_cap",
            "retrieval.min_score",
            "retrieval.channel_timeout_secs",
            "retrieval.read_only",
            "retrieval.abort_on_store_unavailable",
            "ingest.chunk_size",
            "ingest.chunk_overlap",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("Invalid boolean value: {}", value)),
    }
}
