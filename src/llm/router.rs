//! Request-scoped LLM router (C3).
//!
//! A `Router` is the single facade agents call through: it owns a primary
//! provider client, an optional fallback client, the structured-output
//! parser, and an optional response cache. It never mutates process-wide
//! state and never reads environment variables after construction — all of
//! that is resolved once, into `RouterConfig`, by the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::signature::{FieldSpec, Parser};

use super::cache::{CacheKey, ResponseCache};
use super::client::LLMClient;
use super::types::{ChatMessage, CompletionRequest, ModelTier, SafetySetting, TokenUsage};

/// Router selection policy for which provider(s) to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryProvider {
    /// Attempt the local provider first; fall back to cloud on failure.
    Ollama,
    /// Cloud only.
    Gemini,
    /// Prefer local when its health-check succeeds at construction time,
    /// otherwise cloud.
    Auto,
    /// Deterministic canned responses, for tests and offline runs.
    Mock,
}

/// Immutable router configuration, resolved once at construction time.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub primary_provider: PrimaryProvider,
    pub model_tier: ModelTier,
    pub fallback_enabled: bool,
    pub cache_enabled: bool,
    pub max_retries: u32,
    pub retry_initial_delay: Duration,
    pub retry_backoff_factor: f64,
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary_provider: PrimaryProvider::Ollama,
            model_tier: ModelTier::Balanced,
            fallback_enabled: true,
            cache_enabled: true,
            max_retries: 3,
            retry_initial_delay: Duration::from_millis(250),
            retry_backoff_factor: 2.0,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Aggregate call metrics for a Router instance, updated under a local mutex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterMetrics {
    pub api_calls: u64,
    pub cache_hits: u64,
    pub failed_requests: u64,
    pub fallback_invocations: u64,
    pub total_tokens: u64,
}

/// A hand-rolled cancellation handle.
///
/// The teacher's dependency set has no `tokio-util`, so this pairs an
/// `AtomicBool` flag with a `Notify` so any in-flight `select!` wakes
/// immediately once `cancel()` is called.
#[derive(Clone)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            canceled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped facade over the provider(s), cache, and parser.
pub struct Router {
    config: RouterConfig,
    primary: Arc<dyn LLMClient>,
    fallback: Option<Arc<dyn LLMClient>>,
    cache: Option<Arc<ResponseCache>>,
    parser: Parser,
    metrics: Mutex<RouterMetrics>,
}

impl Router {
    /// Construct a router. For `PrimaryProvider::Auto`, `primary`'s
    /// `health_check` is consulted once here: if it fails, `primary` and
    /// `fallback` are swapped so the healthy provider is tried first.
    pub async fn new(
        config: RouterConfig,
        primary: Arc<dyn LLMClient>,
        fallback: Option<Arc<dyn LLMClient>>,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        let (primary, fallback) = if config.primary_provider == PrimaryProvider::Auto {
            if primary.health_check().await {
                (primary, fallback)
            } else if let Some(fb) = fallback {
                (fb, Some(primary))
            } else {
                (primary, None)
            }
        } else {
            (primary, fallback)
        };

        Self {
            config,
            primary,
            fallback,
            cache,
            parser: Parser::new(),
            metrics: Mutex::new(RouterMetrics::default()),
        }
    }

    pub fn metrics_snapshot(&self) -> RouterMetricsHandle<'_> {
        RouterMetricsHandle { router: self }
    }

    /// Run `prompt` through the primary (and, on exhaustion, fallback)
    /// provider, validating the response against `schema`, and return the
    /// validated record plus the tokens actually spent (zero on cache hit).
    pub async fn generate_structured(
        &self,
        prompt: &str,
        schema_identifier: &str,
        schema: &[FieldSpec],
        temperature: f64,
        cancellation: Option<&CancellationToken>,
    ) -> Result<(Value, TokenUsage)> {
        if let Some(token) = cancellation {
            if token.is_canceled() {
                return Err(Error::Canceled);
            }
        }

        let mut attempted = Vec::new();
        let mut last_error = String::new();

        for client in self.provider_sequence() {
            let provider_name = client.provider().to_string();
            attempted.push(provider_name.clone());
            let cache_key = CacheKey::new(
                &provider_name,
                &self.config.model_tier.to_string(),
                schema_identifier,
                prompt,
                temperature,
            );

            if self.config.cache_enabled {
                if let Some(cache) = &self.cache {
                    if let Some((value, tokens)) = cache.get(&cache_key).await {
                        self.bump_cache_hit().await;
                        return Ok((value, tokens));
                    }
                }
            }

            let lock = if let Some(cache) = &self.cache {
                Some(cache.lock_key(&cache_key).await)
            } else {
                None
            };
            let _guard = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };

            // A sibling task may have filled the cache while we waited for the lock.
            if self.config.cache_enabled {
                if let Some(cache) = &self.cache {
                    if let Some((value, tokens)) = cache.get(&cache_key).await {
                        self.bump_cache_hit().await;
                        return Ok((value, tokens));
                    }
                }
            }

            match self
                .call_with_retry(client.as_ref(), prompt, schema, temperature, cancellation)
                .await
            {
                Ok((value, tokens)) => {
                    if self.config.cache_enabled {
                        if let Some(cache) = &self.cache {
                            let _ = cache.put(cache_key, value.clone(), tokens.clone()).await;
                        }
                    }
                    self.bump_success(tokens.total()).await;
                    return Ok((value, tokens));
                }
                Err(e) => {
                    last_error = e.to_string();
                    self.bump_fallback_if_not_first(attempted.len()).await;
                }
            }
        }

        self.bump_failure().await;
        Err(Error::all_providers_failed(attempted, last_error))
    }

    /// Batched variant: always returns exactly `expected_count` items,
    /// padding shortfalls with sentinel records (see `Parser::parse_batch`).
    pub async fn generate_structured_batch(
        &self,
        prompt: &str,
        schema_identifier: &str,
        item_schema: &[FieldSpec],
        expected_count: usize,
        temperature: f64,
        cancellation: Option<&CancellationToken>,
    ) -> Result<(Vec<Value>, TokenUsage)> {
        if let Some(token) = cancellation {
            if token.is_canceled() {
                return Err(Error::Canceled);
            }
        }

        let mut attempted = Vec::new();
        let mut last_error = String::new();

        for client in self.provider_sequence() {
            let provider_name = client.provider().to_string();
            attempted.push(provider_name.clone());
            let cache_key = CacheKey::new(
                &provider_name,
                &self.config.model_tier.to_string(),
                schema_identifier,
                prompt,
                temperature,
            );

            if self.config.cache_enabled {
                if let Some(cache) = &self.cache {
                    if let Some((value, tokens)) = cache.get(&cache_key).await {
                        if let Value::Array(items) = value {
                            self.bump_cache_hit().await;
                            return Ok((items, tokens));
                        }
                    }
                }
            }

            let response_schema = serde_json::json!({
                "type": "array",
                "items": object_schema_json(item_schema),
            });

            match self
                .call_raw_with_retry(client.as_ref(), prompt, temperature, Some(response_schema), cancellation)
                .await
            {
                Ok((raw_text, tokens)) => {
                    let items = self.parser.parse_batch(&raw_text, item_schema, expected_count);
                    let value = Value::Array(items.clone());
                    if self.config.cache_enabled {
                        if let Some(cache) = &self.cache {
                            let _ = cache.put(cache_key, value, tokens.clone()).await;
                        }
                    }
                    self.bump_success(tokens.total()).await;
                    return Ok((items, tokens));
                }
                Err(e) => {
                    last_error = e.to_string();
                    self.bump_fallback_if_not_first(attempted.len()).await;
                }
            }
        }

        self.bump_failure().await;
        Err(Error::all_providers_failed(attempted, last_error))
    }

    fn provider_sequence(&self) -> Vec<Arc<dyn LLMClient>> {
        let mut sequence = vec![Arc::clone(&self.primary)];
        if self.config.fallback_enabled {
            if let Some(fallback) = &self.fallback {
                sequence.push(Arc::clone(fallback));
            }
        }
        sequence
    }

    async fn call_with_retry(
        &self,
        client: &dyn LLMClient,
        prompt: &str,
        schema: &[FieldSpec],
        temperature: f64,
        cancellation: Option<&CancellationToken>,
    ) -> Result<(Value, TokenUsage)> {
        let response_schema = object_schema_json(schema);
        let composed = format!(
            "{prompt}\n\nRespond with JSON matching this schema:\n{response_schema}"
        );
        let (raw_text, tokens) = self
            .call_raw_with_retry(client, &composed, temperature, Some(response_schema), cancellation)
            .await?;

        self.parser
            .parse(&raw_text, schema)
            .map(|value| (value, tokens))
            .map_err(|e| Error::parse(e.kind, e.attempted_strategies, e.last_error))
    }

    /// Shared request-construction path for every provider call: folds the
    /// schema into both the prompt text (for providers without structured
    /// decoding support) and `response_schema` (for providers with it), and
    /// applies the same content-safety thresholds to every outgoing request
    /// regardless of provider or caller.
    async fn call_raw_with_retry(
        &self,
        client: &dyn LLMClient,
        prompt: &str,
        temperature: f64,
        response_schema: Option<Value>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<(String, TokenUsage)> {
        let mut attempt = 0;
        loop {
            let mut request = CompletionRequest::new()
                .with_message(ChatMessage::user(prompt))
                .with_temperature(temperature)
                .with_safety_settings(SafetySetting::defaults());
            if let Some(schema) = response_schema.clone() {
                request = request.with_response_schema(schema);
            }

            let call = self.invoke_with_timeout(client, request, cancellation);
            match call.await {
                Ok(response) => {
                    return Ok((response.content, response.usage));
                }
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    self.bump_failure().await;
                    let delay = self.backoff_delay(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn invoke_with_timeout(
        &self,
        client: &dyn LLMClient,
        request: CompletionRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<super::types::CompletionResponse> {
        let call = client.complete(request);

        let outcome = if let Some(token) = cancellation {
            tokio::select! {
                result = timeout(self.config.request_timeout, call) => result,
                _ = token.canceled() => return Err(Error::Canceled),
            }
        } else {
            timeout(self.config.request_timeout, call).await
        };

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::timeout(self.config.request_timeout.as_millis() as u64)),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.retry_backoff_factor.max(1.0).powi(attempt as i32);
        Duration::from_secs_f64(self.config.retry_initial_delay.as_secs_f64() * factor)
    }

    async fn bump_cache_hit(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.cache_hits += 1;
    }

    async fn bump_success(&self, tokens: u64) {
        let mut metrics = self.metrics.lock().await;
        metrics.api_calls += 1;
        metrics.total_tokens += tokens;
    }

    async fn bump_failure(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.failed_requests += 1;
    }

    async fn bump_fallback_if_not_first(&self, attempted_count: usize) {
        if attempted_count > 1 {
            let mut metrics = self.metrics.lock().await;
            metrics.fallback_invocations += 1;
        }
    }
}

/// A lightweight read accessor so callers don't need to hold the router's
/// internal mutex directly.
pub struct RouterMetricsHandle<'a> {
    router: &'a Router,
}

impl RouterMetricsHandle<'_> {
    pub async fn snapshot(&self) -> RouterMetrics {
        self.router.metrics.lock().await.clone()
    }
}

/// Build a top-level JSON Schema object from a record's field specs, for
/// providers that accept `response_schema` directly.
fn object_schema_json(fields: &[FieldSpec]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.clone(), f.field_type.to_json_schema()))
        .collect();
    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::MockClient;
    use crate::signature::FieldType;

    fn idea_schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("score", FieldType::Float),
            FieldSpec::new("comment", FieldType::String),
        ]
    }

    #[tokio::test]
    async fn generate_structured_returns_cached_value_on_second_call() {
        let client: Arc<dyn LLMClient> =
            Arc::new(MockClient::new().with_response(r#"{"score": 7.5, "comment": "ok"}"#));
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ResponseCache::new(dir.path()).await.unwrap());

        let router = Router::new(RouterConfig::default(), client, None, Some(cache)).await;

        let schema = idea_schema();
        let (value1, tokens1) = router
            .generate_structured("evaluate this", "Critic@1", &schema, 0.5, None)
            .await
            .unwrap();
        assert_eq!(value1["comment"], "ok");
        assert!(tokens1.total() == 0 || tokens1.input_tokens == 0);

        let (value2, _tokens2) = router
            .generate_structured("evaluate this", "Critic@1", &schema, 0.5, None)
            .await
            .unwrap();
        assert_eq!(value2, value1);

        let metrics = router.metrics_snapshot().snapshot().await;
        assert_eq!(metrics.cache_hits, 1);
    }

    #[tokio::test]
    async fn generate_structured_falls_back_to_secondary_provider() {
        let primary: Arc<dyn LLMClient> = Arc::new(MockClient::always_failing());
        let fallback: Arc<dyn LLMClient> =
            Arc::new(MockClient::new().with_response(r#"{"score": 9.0, "comment": "fallback"}"#));

        let config = RouterConfig {
            max_retries: 0,
            cache_enabled: false,
            ..RouterConfig::default()
        };
        let router = Router::new(config, primary, Some(fallback), None).await;

        let schema = idea_schema();
        let (value, _tokens) = router
            .generate_structured("evaluate this", "Critic@1", &schema, 0.5, None)
            .await
            .unwrap();
        assert_eq!(value["comment"], "fallback");

        let metrics = router.metrics_snapshot().snapshot().await;
        assert_eq!(metrics.fallback_invocations, 1);
    }

    #[tokio::test]
    async fn generate_structured_fails_when_all_providers_fail() {
        let primary: Arc<dyn LLMClient> = Arc::new(MockClient::always_failing());
        let fallback: Arc<dyn LLMClient> = Arc::new(MockClient::always_failing());

        let config = RouterConfig {
            max_retries: 0,
            cache_enabled: false,
            ..RouterConfig::default()
        };
        let router = Router::new(config, primary, Some(fallback), None).await;

        let schema = idea_schema();
        let err = router
            .generate_structured("evaluate this", "Critic@1", &schema, 0.5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed { .. }));
    }

    #[tokio::test]
    async fn generate_structured_batch_pads_shortfall() {
        let client: Arc<dyn LLMClient> = Arc::new(
            MockClient::new().with_response(r#"[{"score": 5.0, "comment": "one"}]"#),
        );
        let router = Router::new(
            RouterConfig {
                cache_enabled: false,
                ..RouterConfig::default()
            },
            client,
            None,
            None,
        )
        .await;

        let schema = idea_schema();
        let (items, _tokens) = router
            .generate_structured_batch("evaluate batch", "Critic@1", &schema, 3, 0.5, None)
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1]["error"], "parse_shortfall");
    }

    #[tokio::test]
    async fn cancellation_token_aborts_before_dispatch() {
        let client: Arc<dyn LLMClient> = Arc::new(MockClient::new().with_response("{}"));
        let router = Router::new(RouterConfig::default(), client, None, None).await;
        let token = CancellationToken::new();
        token.cancel();

        let schema = idea_schema();
        let err = router
            .generate_structured("x", "Critic@1", &schema, 0.5, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Canceled));
    }

    #[test]
    fn object_schema_json_marks_required_fields() {
        let schema = vec![
            FieldSpec::new("title", FieldType::String),
            FieldSpec::new("note", FieldType::String).optional(),
        ];
        let json = object_schema_json(&schema);
        let required = json["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "title");
    }

    /// Captures the last `CompletionRequest` it was handed instead of talking
    /// to a provider, so tests can inspect what the shared request-building
    /// path actually sent.
    struct RecordingClient {
        last_request: Mutex<Option<CompletionRequest>>,
        response: String,
    }

    impl RecordingClient {
        fn new(response: impl Into<String>) -> Self {
            Self {
                last_request: Mutex::new(None),
                response: response.into(),
            }
        }
    }

    #[async_trait::async_trait]
    impl LLMClient for RecordingClient {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<super::super::types::CompletionResponse> {
            *self.last_request.lock().await = Some(request);
            Ok(super::super::types::CompletionResponse {
                id: "recording-1".to_string(),
                model: "recording-model".to_string(),
                content: self.response.clone(),
                stop_reason: None,
                usage: TokenUsage::default(),
                timestamp: chrono::Utc::now(),
                cost: Some(0.0),
            })
        }

        async fn embed(
            &self,
            _request: crate::llm::EmbeddingRequest,
        ) -> Result<crate::llm::EmbeddingResponse> {
            Err(Error::provider("recording", "embed not supported"))
        }

        fn provider(&self) -> super::super::types::Provider {
            super::super::types::Provider::Mock
        }

        fn available_models(&self) -> Vec<crate::llm::ModelSpec> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn generate_structured_forwards_the_signature_schema_as_response_schema() {
        let recording = Arc::new(RecordingClient::new(r#"{"score": 8.0, "comment": "fine"}"#));
        let client: Arc<dyn LLMClient> = recording.clone();
        let router = Router::new(
            RouterConfig {
                cache_enabled: false,
                ..RouterConfig::default()
            },
            client,
            None,
            None,
        )
        .await;

        let schema = idea_schema();
        router
            .generate_structured("evaluate this", "Critic@1", &schema, 0.5, None)
            .await
            .unwrap();

        let sent = recording.last_request.lock().await.clone().unwrap();
        assert!(sent.response_schema.is_some());
        assert_eq!(sent.response_schema.unwrap()["type"], "object");
        assert_eq!(sent.safety_settings.unwrap().len(), 4);
    }
}
