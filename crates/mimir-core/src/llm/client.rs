//! OpenAI-compatible LLM client implementation
//!
//! Provides an async HTTP client for a locally hosted model server
//! (Ollama exposes this API under `/v1`) with:
//! - Chat completions at temperature 0
//! - Single and batch embeddings
//! - Model listing for connection checks
//! - Rate limit handling with exponential backoff

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::traits::{Embedder, LanguageModel};
use super::types::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, FinishReason, LlmResponse,
    Message, ModelList,
};

/// Sampling temperature used for every completion
pub const DETERMINISTIC_TEMPERATURE: f32 = 0.0;

/// Maximum number of retry attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// First backoff step in milliseconds, doubled per attempt
const BACKOFF_BASE_MS: u64 = 1000;

/// LLM client for chat completions and embeddings
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    /// Optional bearer token (local servers usually need none)
    api_key: Option<String>,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("default_model", &self.config.default_model)
            .field("embedding_model", &self.config.embedding_model)
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

/// Builds an `LlmClient` from config plus overrides
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL (defaults to the configured `base_url`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| config.base_url.clone())
            .trim_end_matches('/')
            .to_string();

        Ok(LlmClient {
            http_client,
            config,
            api_key: self.api_key,
            base_url,
        })
    }
}

impl LlmClient {
    /// Create a new LlmClient from configuration, reading the optional API key from the environment
    pub fn from_config(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let mut builder = LlmClientBuilder::new().config(config);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        builder.build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    /// Return a copy of this client that completes with a different model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One deterministic completion; `model` overrides the configured default
    pub async fn chat(&self, messages: Vec<Message>, model: Option<&str>) -> Result<LlmResponse> {
        let model = model.unwrap_or(&self.config.default_model);

        let request = ChatRequest::new(model, messages)
            .with_temperature(DETERMINISTIC_TEMPERATURE)
            .with_max_tokens(self.config.max_tokens)
            .with_streaming(false);

        self.execute_request(&request).await
    }

    /// List models served by the endpoint
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse model list: {}", e)))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    /// Whether the endpoint reports the given model as available locally
    pub async fn is_model_available(&self, model: &str) -> Result<bool> {
        let wanted = normalize_model_tag(model);
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| normalize_model_tag(m) == wanted))
    }

    /// Generate embeddings for several texts with the configured embedding model
    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let request = EmbeddingRequest::batch(&self.config.embedding_model, texts);
        let response = self.execute_embedding_request(&request).await?;

        // Servers may answer a batch out of order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        if data.len() != expected {
            return Err(Error::EmbeddingFailed(format!(
                "Expected {} embeddings, received {}",
                expected,
                data.len()
            )));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Retries only on 429, up to `MAX_RETRY_ATTEMPTS`
    async fn execute_request(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(Error::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff,
                        "Model server is rate limiting, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Requesting completion"
        );

        let response = self
            .authorized(self.http_client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Unreadable completion: {}", e)))?;

        LlmResponse::from_chat_response(chat_response)
            .ok_or_else(|| Error::LLMError("Model server returned no choices".to_string()))
    }

    async fn execute_embedding_request(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let url = format!("{}/embeddings", self.base_url);

        debug!(model = %request.model, "Sending embedding request");

        let response = self
            .authorized(self.http_client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Unreadable embedding reply: {}", e)))?;

        if embedding_response.data.is_empty() {
            return Err(Error::EmbeddingFailed("Empty embedding response".to_string()));
        }

        Ok(embedding_response)
    }

    /// Map a non-2xx reply onto the error taxonomy
    async fn handle_error_response<T>(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> Result<T> {
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(Error::LLMError(
                "Unauthorized: set MIMIR_API_KEY if the endpoint requires a key".to_string(),
            )),
            429 => {
                let wait_secs = extract_retry_after(&body).unwrap_or(60);
                Err(Error::RateLimited(wait_secs))
            }
            400 => Err(Error::LLMError(format!("Bad request: {}", body))),
            404 => Err(Error::LLMError(format!(
                "Model not found or endpoint unavailable: {}",
                body
            ))),
            500..=599 => Err(Error::LLMError(format!("Server error ({}): {}", status, body))),
            _ => Err(Error::LLMError(format!("HTTP error {}: {}", status, body))),
        }
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    fn model_name(&self) -> &str {
        &self.config.default_model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.chat(vec![Message::user(prompt)], None).await?;
        // A cut-off graph query or answer is worse than none
        match response.finish_reason {
            FinishReason::ContentFilter => Err(Error::LLMError(format!(
                "{} withheld the completion (content filter)",
                response.model
            ))),
            FinishReason::Length => {
                warn!(
                    model = %response.model,
                    tokens_used = response.tokens_used,
                    max_tokens = self.config.max_tokens,
                    "Completion stopped at the token limit"
                );
                Err(Error::LLMError(format!(
                    "Completion truncated at {} tokens; raise llm.max_tokens",
                    self.config.max_tokens
                )))
            }
            FinishReason::Stop | FinishReason::Unknown => Ok(response.content),
        }
    }
}

#[async_trait]
impl Embedder for LlmClient {
    fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest::new(&self.config.embedding_model, text);
        let response = self.execute_embedding_request(&request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts.to_vec()).await
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout("LLM request".to_string())
    } else {
        Error::NetworkError(e)
    }
}

/// Ollama reports untagged models as `<name>:latest`
fn normalize_model_tag(model: &str) -> String {
    if model.contains(':') {
        model.to_string()
    } else {
        format!("{}:latest", model)
    }
}

/// Doubling delay plus jitter, never below the server's suggested wait
fn calculate_backoff(attempt: u32, suggested_wait: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
    let max_wait = suggested_wait * 1000;

    let delay = base.max(max_wait);

    // 10% jitter
    let jitter = delay / 10;
    delay + (rand_jitter() % jitter.max(1))
}

fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64 % 1000)
        .unwrap_or(0)
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(retry_after) = json.get("retry_after").and_then(|v| v.as_u64()) {
            return Some(retry_after);
        }
        if let Some(error) = json.get("error")
            && let Some(retry_after) = error.get("retry_after").and_then(|v| v.as_u64())
        {
            return Some(retry_after);
        }
    }
    None
}
