//! # madspark-core
//!
//! A multi-agent idea-refinement pipeline: a fixed-stage workflow orchestrator
//! that generates, critiques, and iteratively improves candidate ideas for a
//! topic through a panel of specialized LLM-backed agents.
//!
//! ## Core Components
//!
//! - **Agents**: Generator, Critic, Advocate, Skeptic, Improver,
//!   DimensionEvaluator, LogicalInferenceEngine
//! - **Orchestrator**: drives the fixed stage pipeline over a candidate set
//! - **Executor**: bounded-concurrency per-candidate stage runner
//! - **LLM router**: provider selection, caching, retry/fallback
//!
//! ## Example
//!
//! ```rust,ignore
//! use madspark_core::{Orchestrator, OrchestratorConfig, WorkflowRequest};
//!
//! let request = WorkflowRequest::new("urban beekeeping", 3)?;
//! let config = OrchestratorConfig::default();
//! let outcome = Orchestrator::run(&router, &request, &config, None).await?;
//! ```

// Self-alias for derive macro support within the crate
extern crate self as madspark_core;

pub mod agents;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod reasoning_engine;
pub mod signature;

// Re-exports for convenience
pub use error::{Error, Result};
pub use llm::{
    BatchConfig, BatchExecutor, BatchQueryResult, BatchedLLMQuery, BatchedQueryResults,
    CancellationToken, ClientConfig, CompletionRequest, CompletionResponse, CostTracker,
    LLMClient, ModelCallTier, ModelSpec, ModelTier, OllamaClient, PrimaryProvider, Provider,
    Router, RouterConfig, RouterMetrics, SafetyCategory, SafetySetting, SafetyThreshold,
    TierBreakdown,
};
pub use agents::{
    Advocate, Critic, DimensionEvaluator, Generator, Improver, LogicalInferenceEngine, Skeptic,
};
pub use agents::types::{
    Advocacy, Bullet, Candidate, CausalLink, ContradictionPair, DimensionScore, DimensionWeights,
    Evaluation, Idea, ImprovedIdea, InferencePayload, InferenceResult, InferenceVariant,
    Skepticism, TemperaturePreset, WorkflowRequest,
};
pub use reasoning_engine::{normalize_inference, overall_score};
pub use orchestrator::{Orchestrator, OrchestratorConfig, WorkflowOutcome};
pub use executor::{
    Executor, ProgressBus, ProgressEvent, DEFAULT_STAGE_CONCURRENCY, PROGRESS_CHANNEL_CAPACITY,
};
pub use signature::{
    apply_defaults, validate_fields, validate_value, ExecutionLimits, ExecutionResult,
    FallbackConfig, FallbackExtractor, FallbackTrigger, FieldSpec, FieldType, HistoryEntry,
    HistoryEntryType, ParseError, ReplHistory, Signature, ValidationError, ValidationResult,
};
