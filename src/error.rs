//! Error types for madspark-core.

use thiserror::Error;

/// Result type alias using madspark-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during workflow execution.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad request input (empty topic, N out of range, bad flag combination).
    /// No LLM calls are made before this is raised.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing credential or malformed config for an explicitly selected provider.
    /// Raised at Router construction, before any call is attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/timeout/5xx from a provider, after retries on that provider are exhausted.
    #[error("provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    /// All configured providers (primary + fallback) failed.
    #[error("all providers failed: attempted {attempted:?}, last error: {last_error}")]
    AllProvidersFailed {
        attempted: Vec<String>,
        last_error: String,
    },

    /// Structured-output parsing exhausted every strategy.
    #[error("parse error ({kind}): attempted {attempted_strategies:?}, last error: {last_error}")]
    Parse {
        kind: String,
        attempted_strategies: Vec<String>,
        last_error: String,
    },

    /// Schema validation rejected a decoded record outright (not a clampable field).
    #[error("validation error: {0}")]
    Validation(String),

    /// A cache value could not be serialized, or the on-disk store is unreadable.
    /// Callers degrade to no-cache for the affected operation rather than propagate this.
    #[error("cache error: {0}")]
    Cache(String),

    /// A required field was not of the type the cache's CacheValue contract allows
    /// (scalars, lists, maps, record dumps). The put() degrades to no-cache for this call.
    #[error("cache type error: value for key {key} is not a supported record shape")]
    CacheType { key: String },

    /// A stage of the workflow failed in a way that terminates the whole request
    /// (only S0 Generate and a total S1 Evaluate failure do this).
    #[error("workflow error at stage {stage}: {message}")]
    Workflow { stage: String, message: String },

    /// The request's cancellation handle fired; the caller receives a partial result.
    #[error("operation canceled")]
    Canceled,

    /// Operation timed out after its stage budget.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error talking to a provider.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Internal invariant violation — should not occur; indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn all_providers_failed(attempted: Vec<String>, last_error: impl Into<String>) -> Self {
        Self::AllProvidersFailed {
            attempted,
            last_error: last_error.into(),
        }
    }

    pub fn parse(
        kind: impl Into<String>,
        attempted_strategies: Vec<String>,
        last_error: impl Into<String>,
    ) -> Self {
        Self::Parse {
            kind: kind.into(),
            attempted_strategies,
            last_error: last_error.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    pub fn cache_type(key: impl Into<String>) -> Self {
        Self::CacheType { key: key.into() }
    }

    pub fn workflow(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Workflow {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error class should be retried by the Router's backoff loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::Timeout { .. } | Self::Transport(_) | Self::Parse { .. }
        )
    }
}
