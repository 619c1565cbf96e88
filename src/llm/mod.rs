//! LLM client abstraction with request-scoped routing.
//!
//! This module provides a unified interface for working with local and cloud
//! LLM providers (Ollama, Gemini, and a deterministic mock provider) behind a
//! single request-scoped [`Router`], with structured-output parsing, a
//! disk-persisted response cache, and batched per-stage execution.
//!
//! ## Example
//!
//! ```rust,ignore
//! use madspark_core::llm::{OllamaClient, ClientConfig, Router, RouterConfig};
//!
//! let client = OllamaClient::new(
//!     ClientConfig::new("unused").with_default_model("llama3.1")
//! );
//!
//! let router = Router::new(RouterConfig::default(), Arc::new(client), None);
//! let (value, tokens) = router.generate_structured(prompt, &schema, 0.7).await?;
//! ```

mod batch;
mod cache;
mod client;
mod router;
mod types;

pub use batch::{
    BatchConfig, BatchExecutor, BatchQueryResult, BatchedLLMQuery, BatchedQueryResults,
    DEFAULT_MAX_PARALLEL,
};
pub use cache::{CacheKey, CacheStats, CacheValue, ResponseCache};
pub use client::{
    ClientConfig, LLMClient, MockClient, MultiProviderClient, OllamaClient, TrackedClient,
};
#[cfg(feature = "gemini")]
pub use client::GeminiClient;
pub use router::{CancellationToken, PrimaryProvider, Router, RouterConfig, RouterMetrics};
pub use types::{
    CacheControl, ChatMessage, ChatRole, CompletionRequest, CompletionResponse, CostTracker,
    EmbeddingRequest, EmbeddingResponse, ModelCallTier, ModelCosts, ModelSpec, ModelTier,
    Provider, SafetyCategory, SafetySetting, SafetyThreshold, StopReason, TierBreakdown,
    TierCosts, TokenUsage,
};
