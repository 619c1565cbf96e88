//! LLM client trait and provider implementations.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::types::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, ModelSpec,
    Provider, StopReason, TokenUsage,
};

/// LLM client trait for making completions and embeddings.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Create embeddings for texts.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Get the provider for this client.
    fn provider(&self) -> Provider;

    /// List available models.
    fn available_models(&self) -> Vec<ModelSpec>;

    /// Check whether the provider is reachable. Used by the router's `auto`
    /// selection policy at construction time. Default: always healthy.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key (unused by the local Ollama client).
    pub api_key: String,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Default model.
    pub default_model: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Max retries on failure.
    pub max_retries: u32,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            timeout_secs: 120,
            max_retries: 3,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    let timeout = Duration::from_secs(timeout_secs);

    // Some sandboxed macOS environments can panic during proxy auto-detection
    // in reqwest's default client builder. Fall back to no-proxy in that case.
    match catch_unwind(AssertUnwindSafe(|| {
        Client::builder().timeout(timeout).build()
    })) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client"),
    }
}

/// Local Ollama client, reached over its HTTP API.
pub struct OllamaClient {
    config: ClientConfig,
    http: Client,
}

impl OllamaClient {
    const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    /// Either the literal `"json"` or a full JSON Schema object, per Ollama's
    /// structured-output API.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingRequest {
    #[allow(dead_code)]
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[allow(dead_code)]
    models: Vec<serde_json::Value>,
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .or(self.config.default_model.clone())
            .unwrap_or_else(|| "llama3.1".to_string());

        let mut messages: Vec<OllamaMessage> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for m in &request.messages {
            messages.push(OllamaMessage {
                role: match m.role {
                    super::types::ChatRole::User => "user".to_string(),
                    super::types::ChatRole::Assistant => "assistant".to_string(),
                    super::types::ChatRole::System => "system".to_string(),
                },
                content: m.content.clone(),
            });
        }

        let format = Some(
            request
                .response_schema
                .clone()
                .unwrap_or_else(|| serde_json::Value::String("json".to_string())),
        );

        let api_request = OllamaChatRequest {
            model: model.clone(),
            messages,
            stream: false,
            format,
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                stop: request.stop,
            }),
        };

        let url = format!("{}/api/chat", self.base_url());

        let response = self
            .http
            .post(&url)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider("ollama", format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("ollama", format!("failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaErrorBody>(&body) {
                return Err(Error::provider("ollama", error.error));
            }
            return Err(Error::provider(
                "ollama",
                format!("HTTP {status}: {body}"),
            ));
        }

        let api_response: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::provider("ollama", format!("failed to parse response: {e}")))?;

        let stop_reason = api_response.done_reason.as_deref().map(|r| match r {
            "stop" => StopReason::EndTurn,
            "length" => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        });

        let usage = TokenUsage {
            input_tokens: api_response.prompt_eval_count.unwrap_or(0),
            output_tokens: api_response.eval_count.unwrap_or(0),
            cache_read_tokens: None,
            cache_creation_tokens: None,
        };

        Ok(CompletionResponse {
            id: format!("ollama-{}", Utc::now().timestamp_millis()),
            model: api_response.model,
            content: api_response.message.content,
            stop_reason,
            usage,
            timestamp: Utc::now(),
            cost: Some(0.0),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .unwrap_or_else(|| "nomic-embed-text".to_string());

        let api_request = OllamaEmbedRequest {
            model: model.clone(),
            input: request.texts,
        };

        let url = format!("{}/api/embed", self.base_url());

        let response = self
            .http
            .post(&url)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider("ollama", format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("ollama", format!("failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaErrorBody>(&body) {
                return Err(Error::provider("ollama", error.error));
            }
            return Err(Error::provider(
                "ollama",
                format!("HTTP {status}: {body}"),
            ));
        }

        let api_response: OllamaEmbedResponse = serde_json::from_str(&body)
            .map_err(|e| Error::provider("ollama", format!("failed to parse response: {e}")))?;

        Ok(EmbeddingResponse {
            model,
            embeddings: api_response.embeddings,
            usage: TokenUsage {
                input_tokens: 0,
                output_tokens: 0,
                cache_read_tokens: None,
                cache_creation_tokens: None,
            },
        })
    }

    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn available_models(&self) -> Vec<ModelSpec> {
        vec![
            ModelSpec::ollama_flagship("llama3.1:70b"),
            ModelSpec::ollama_balanced("llama3.1"),
            ModelSpec::ollama_fast("llama3.2:3b"),
        ]
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url());
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<OllamaTagsResponse>()
                .await
                .map(|_| true)
                .unwrap_or(true),
            _ => false,
        }
    }
}

/// Deterministic mock client used for tests, demos, and offline runs.
///
/// Returns a fixed JSON payload (or one supplied via [`MockClient::with_response`])
/// for every call, and never performs network I/O.
pub struct MockClient {
    canned_response: String,
    always_fail: bool,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            canned_response: "{}".to_string(),
            always_fail: false,
        }
    }

    /// Set the JSON text returned by every `complete` call.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.canned_response = response.into();
        self
    }

    /// Make every call fail with a transport-style provider error, for
    /// exercising fallback/retry paths in tests.
    pub fn always_failing() -> Self {
        Self {
            canned_response: String::new(),
            always_fail: true,
        }
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if self.always_fail {
            return Err(Error::provider("mock", "mock provider configured to fail"));
        }

        Ok(CompletionResponse {
            id: format!("mock-{}", Utc::now().timestamp_millis()),
            model: request.model.unwrap_or_else(|| "mock-model".to_string()),
            content: self.canned_response.clone(),
            stop_reason: Some(StopReason::EndTurn),
            usage: TokenUsage {
                input_tokens: 0,
                output_tokens: 0,
                cache_read_tokens: None,
                cache_creation_tokens: None,
            },
            timestamp: Utc::now(),
            cost: Some(0.0),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        if self.always_fail {
            return Err(Error::provider("mock", "mock provider configured to fail"));
        }
        let embeddings = request.texts.iter().map(|_| vec![0.0_f32; 8]).collect();
        Ok(EmbeddingResponse {
            model: "mock-embedding".to_string(),
            embeddings,
            usage: TokenUsage {
                input_tokens: 0,
                output_tokens: 0,
                cache_read_tokens: None,
                cache_creation_tokens: None,
            },
        })
    }

    fn provider(&self) -> Provider {
        Provider::Mock
    }

    fn available_models(&self) -> Vec<ModelSpec> {
        vec![ModelSpec::mock()]
    }

    async fn health_check(&self) -> bool {
        !self.always_fail
    }
}

/// Gemini client.
#[cfg(feature = "gemini")]
pub struct GeminiClient {
    config: ClientConfig,
    http: Client,
}

#[cfg(feature = "gemini")]
impl GeminiClient {
    const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);

        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// Gemini API types
#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_settings: Option<Vec<GeminiSafetySetting>>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
struct GeminiSafetySetting {
    category: String,
    threshold: String,
}

#[cfg(feature = "gemini")]
impl From<&super::types::SafetySetting> for GeminiSafetySetting {
    fn from(setting: &super::types::SafetySetting) -> Self {
        use super::types::{SafetyCategory, SafetyThreshold};
        let category = match setting.category {
            SafetyCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
            SafetyCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
            SafetyCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            SafetyCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        };
        let threshold = match setting.threshold {
            SafetyThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
            SafetyThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            SafetyThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            SafetyThreshold::BlockNone => "BLOCK_NONE",
        };
        Self {
            category: category.to_string(),
            threshold: threshold.to_string(),
        }
    }
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: Option<u64>,
    #[allow(dead_code)]
    total_token_count: Option<u64>,
    cached_content_token_count: Option<u64>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[allow(dead_code)]
    status: Option<String>,
}

#[cfg(feature = "gemini")]
#[async_trait]
impl LLMClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .or(self.config.default_model.clone())
            .unwrap_or_else(|| "gemini-2.0-flash".to_string());

        let contents: Vec<GeminiContent> = request
            .messages
            .iter()
            .map(|m| GeminiContent {
                role: match m.role {
                    super::types::ChatRole::User => "user".to_string(),
                    super::types::ChatRole::Assistant => "model".to_string(),
                    super::types::ChatRole::System => "user".to_string(),
                },
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let system_instruction = request.system.map(|s| GeminiContent {
            role: "user".to_string(),
            parts: vec![GeminiPart { text: s }],
        });

        let generation_config = Some(GeminiGenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            stop_sequences: request.stop,
            response_mime_type: Some("application/json".to_string()),
            response_schema: request.response_schema,
        });

        let safety_settings = request
            .safety_settings
            .as_ref()
            .map(|settings| settings.iter().map(GeminiSafetySetting::from).collect());

        let api_request = GeminiRequest {
            contents,
            system_instruction,
            generation_config,
            safety_settings,
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url(),
            model,
            self.config.api_key
        );

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider("gemini", format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("gemini", format!("failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                return Err(Error::provider("gemini", error.error.message));
            }
            return Err(Error::provider("gemini", format!("HTTP {status}: {body}")));
        }

        let api_response: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| Error::provider("gemini", format!("failed to parse response: {e}")))?;

        let candidate = api_response
            .candidates
            .first()
            .ok_or_else(|| Error::provider("gemini", "no candidates in response"))?;

        let content = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.clone())
            .collect::<Vec<_>>()
            .join("");

        let stop_reason = candidate.finish_reason.as_deref().map(|r| match r {
            "STOP" => StopReason::EndTurn,
            "MAX_TOKENS" => StopReason::MaxTokens,
            "STOP_SEQUENCE" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        });

        let usage_metadata = api_response.usage_metadata.unwrap_or(GeminiUsageMetadata {
            prompt_token_count: 0,
            candidates_token_count: Some(0),
            total_token_count: Some(0),
            cached_content_token_count: None,
        });

        let usage = TokenUsage {
            input_tokens: usage_metadata.prompt_token_count,
            output_tokens: usage_metadata.candidates_token_count.unwrap_or(0),
            cache_read_tokens: usage_metadata.cached_content_token_count,
            cache_creation_tokens: None,
        };

        let model_spec = self
            .available_models()
            .into_iter()
            .find(|m| m.id == model || model.contains(&m.id))
            .unwrap_or_else(ModelSpec::gemini_2_0_flash);
        let cost = model_spec.calculate_cost(usage.input_tokens, usage.output_tokens);

        let id = format!("gemini-{}", Utc::now().timestamp_millis());

        Ok(CompletionResponse {
            id,
            model,
            content,
            stop_reason,
            usage,
            timestamp: Utc::now(),
            cost: Some(cost),
        })
    }

    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        Err(Error::provider(
            "gemini",
            "embedding not yet implemented for this provider",
        ))
    }

    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn available_models(&self) -> Vec<ModelSpec> {
        vec![
            ModelSpec::gemini_2_0_flash(),
            ModelSpec::gemini_1_5_pro(),
            ModelSpec::gemini_1_5_flash(),
        ]
    }

    async fn health_check(&self) -> bool {
        let url = format!(
            "{}/v1beta/models?key={}",
            self.base_url(),
            self.config.api_key
        );
        matches!(self.http.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

/// Multi-provider client that manages multiple LLM providers behind one facade.
pub struct MultiProviderClient {
    clients: HashMap<Provider, Arc<dyn LLMClient>>,
    default_provider: Provider,
}

impl MultiProviderClient {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            default_provider: Provider::Ollama,
        }
    }

    /// Add a client for a provider.
    pub fn with_client(mut self, client: Arc<dyn LLMClient>) -> Self {
        let provider = client.provider();
        self.clients.insert(provider, client);
        self
    }

    /// Set the default provider.
    pub fn with_default_provider(mut self, provider: Provider) -> Self {
        self.default_provider = provider;
        self
    }

    /// Get a client for a specific provider.
    pub fn get_client(&self, provider: Provider) -> Option<&Arc<dyn LLMClient>> {
        self.clients.get(&provider)
    }

    /// Get the default client.
    pub fn default_client(&self) -> Option<&Arc<dyn LLMClient>> {
        self.clients.get(&self.default_provider)
    }

    /// Complete using a specific provider.
    pub async fn complete_with(
        &self,
        provider: Provider,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        let client = self
            .clients
            .get(&provider)
            .ok_or_else(|| Error::provider(provider.to_string(), "no client registered"))?;
        client.complete(request).await
    }

    /// Complete using the default provider.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.complete_with(self.default_provider, request).await
    }

    /// Create embeddings using a specific provider.
    pub async fn embed_with(
        &self,
        provider: Provider,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let client = self
            .clients
            .get(&provider)
            .ok_or_else(|| Error::provider(provider.to_string(), "no client registered"))?;
        client.embed(request).await
    }

    /// List all available models across providers.
    pub fn all_models(&self) -> Vec<ModelSpec> {
        self.clients
            .values()
            .flat_map(|c| c.available_models())
            .collect()
    }
}

impl Default for MultiProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe client wrapper with cost tracking.
pub struct TrackedClient {
    inner: Arc<dyn LLMClient>,
    costs: Arc<RwLock<super::types::CostTracker>>,
}

impl TrackedClient {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            inner: client,
            costs: Arc::new(RwLock::new(super::types::CostTracker::new())),
        }
    }

    /// Complete and track costs.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.inner.complete(request).await?;

        let mut costs = self.costs.write().await;
        costs.record(&response.model, &response.usage, response.cost);

        Ok(response)
    }

    /// Get current cost summary.
    pub async fn get_costs(&self) -> super::types::CostTracker {
        self.costs.read().await.clone()
    }

    /// Reset cost tracking.
    pub async fn reset_costs(&self) {
        let mut costs = self.costs.write().await;
        *costs = super::types::CostTracker::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("test-key")
            .with_base_url("http://localhost:11434")
            .with_default_model("llama3.1")
            .with_timeout(60);

        assert_eq!(config.api_key, "test-key");
        assert_eq!(
            config.base_url,
            Some("http://localhost:11434".to_string())
        );
        assert_eq!(config.default_model, Some("llama3.1".to_string()));
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_multi_provider_client() {
        let client = MultiProviderClient::new().with_default_provider(Provider::Mock);

        assert!(client.default_client().is_none()); // No clients added yet
        assert_eq!(client.default_provider, Provider::Mock);
    }

    #[test]
    fn test_ollama_available_models() {
        let client = OllamaClient::new(ClientConfig::new("unused"));
        let models = client.available_models();

        assert_eq!(models.len(), 3);
        assert!(models.iter().all(|m| m.provider == Provider::Ollama));
    }

    #[tokio::test]
    async fn test_mock_client_returns_canned_response() {
        let client = MockClient::new().with_response(r#"{"answer":42}"#);
        let response = client
            .complete(CompletionRequest::new().with_message(super::super::types::ChatMessage::user("hi")))
            .await
            .expect("mock completion should succeed");
        assert_eq!(response.content, r#"{"answer":42}"#);
    }

    #[tokio::test]
    async fn test_mock_client_always_failing() {
        let client = MockClient::always_failing();
        let result = client
            .complete(CompletionRequest::new().with_message(super::super::types::ChatMessage::user("hi")))
            .await;
        assert!(result.is_err());
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_multi_provider_client_with_mock() {
        let client = MultiProviderClient::new()
            .with_client(Arc::new(MockClient::new().with_response("{}")))
            .with_default_provider(Provider::Mock);

        assert!(client.default_client().is_some());
        let response = client
            .complete(CompletionRequest::new().with_message(super::super::types::ChatMessage::user("hi")))
            .await
            .expect("default provider completion should succeed");
        assert_eq!(response.content, "{}");
    }

    #[test]
    fn ollama_request_carries_schema_object_when_present() {
        let schema = serde_json::json!({"type": "object", "properties": {}});
        let request = CompletionRequest::new()
            .with_message(super::super::types::ChatMessage::user("hi"))
            .with_response_schema(schema.clone());
        assert_eq!(request.response_schema, Some(schema));
    }

    #[test]
    fn ollama_request_falls_back_to_json_mode_without_a_schema() {
        let request = CompletionRequest::new();
        let format = request
            .response_schema
            .clone()
            .unwrap_or_else(|| serde_json::Value::String("json".to_string()));
        assert_eq!(format, serde_json::Value::String("json".to_string()));
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn gemini_safety_setting_maps_category_and_threshold_to_wire_strings() {
        use super::super::types::{SafetyCategory, SafetySetting, SafetyThreshold};

        let setting = SafetySetting::new(SafetyCategory::HateSpeech, SafetyThreshold::BlockOnlyHigh);
        let wire = GeminiSafetySetting::from(&setting);
        assert_eq!(wire.category, "HARM_CATEGORY_HATE_SPEECH");
        assert_eq!(wire.threshold, "BLOCK_ONLY_HIGH");
    }

    #[test]
    fn default_safety_settings_cover_the_boundary_directive_categories() {
        use super::super::types::{SafetyCategory, SafetySetting};

        let defaults = SafetySetting::defaults();
        assert_eq!(defaults.len(), 4);
        assert!(defaults.iter().any(|s| s.category == SafetyCategory::DangerousContent));
        assert!(defaults.iter().any(|s| s.category == SafetyCategory::Harassment));
    }
}
