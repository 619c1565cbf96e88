//! Data model shared by the agent functions and the orchestrator (§3).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_TOPIC_BYTES: usize = 4096;

/// Preset sampling temperatures exposed to callers instead of a raw float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperaturePreset {
    Conservative,
    Balanced,
    Creative,
    Wild,
}

impl TemperaturePreset {
    pub fn value(self) -> f64 {
        match self {
            Self::Conservative => 0.3,
            Self::Balanced => 0.7,
            Self::Creative => 0.9,
            Self::Wild => 1.2,
        }
    }
}

impl Default for TemperaturePreset {
    fn default() -> Self {
        Self::Balanced
    }
}

/// A validated, immutable workflow request. `WorkflowRequest::new` is the only
/// constructor and rejects malformed input before any LLM call is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub topic: String,
    pub context: Option<String>,
    pub num_top_candidates: u8,
    pub temperature_preset: TemperaturePreset,
    pub enhanced: bool,
    pub logical: bool,
    pub multidimensional: bool,
    pub novelty_threshold: f64,
}

impl WorkflowRequest {
    pub fn new(topic: impl Into<String>, num_top_candidates: u8) -> Result<Self> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(Error::invalid_input("topic must not be empty"));
        }
        if topic.len() > MAX_TOPIC_BYTES {
            return Err(Error::invalid_input(format!(
                "topic exceeds {MAX_TOPIC_BYTES} bytes"
            )));
        }
        if !(1..=5).contains(&num_top_candidates) {
            return Err(Error::invalid_input(
                "num_top_candidates must be between 1 and 5",
            ));
        }
        Ok(Self {
            topic,
            context: None,
            num_top_candidates,
            temperature_preset: TemperaturePreset::default(),
            enhanced: false,
            logical: false,
            multidimensional: true,
            novelty_threshold: 0.8,
        })
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_temperature_preset(mut self, preset: TemperaturePreset) -> Self {
        self.temperature_preset = preset;
        self
    }

    pub fn with_enhanced(mut self, enhanced: bool) -> Self {
        self.enhanced = enhanced;
        self
    }

    pub fn with_logical(mut self, logical: bool) -> Self {
        self.logical = logical;
        self
    }

    pub fn with_novelty_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::invalid_input("novelty_threshold must be in [0, 1]"));
        }
        self.novelty_threshold = threshold;
        Ok(self)
    }

    pub fn context_str(&self) -> &str {
        self.context.as_deref().unwrap_or("")
    }
}

/// One idea produced by the Generator. `index` is 0-based and unique within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub index: u32,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub category: String,
}

/// One Critic score for an Idea, matched by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub idea_index: u32,
    pub score: f64,
    pub critique: String,
}

/// A single bullet point inside an Advocacy or Skepticism record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub title: String,
    pub body: String,
}

/// Advocate output: strengths, opportunities, and concerns already addressed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Advocacy {
    #[serde(default)]
    pub strengths: Vec<Bullet>,
    #[serde(default)]
    pub opportunities: Vec<Bullet>,
    #[serde(default)]
    pub addressed_concerns: Vec<Bullet>,
}

/// Skeptic output: flaws, risks, and assumptions worth challenging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skepticism {
    #[serde(default)]
    pub critical_flaws: Vec<Bullet>,
    #[serde(default)]
    pub risks: Vec<Bullet>,
    #[serde(default)]
    pub questionable_assumptions: Vec<Bullet>,
    #[serde(default)]
    pub missing_considerations: Vec<Bullet>,
}

/// Improver output. The orchestrator concatenates `title` + `description`
/// into `improved_text` for downstream stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImprovedIdea {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub key_improvements: Vec<String>,
    #[serde(default)]
    pub implementation_steps: Vec<String>,
    #[serde(default)]
    pub differentiators: Vec<String>,
}

impl ImprovedIdea {
    pub fn improved_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.description)
    }
}

/// Seven named quality dimensions scored in [0, 10] by the Dimension Evaluator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionScore {
    pub feasibility: f64,
    pub innovation: f64,
    pub impact: f64,
    pub cost_effectiveness: f64,
    pub scalability: f64,
    pub risk_assessment: f64,
    pub timeline: f64,
}

/// Weights for `DimensionScore::overall`. Defaults to a uniform 1/7 each.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub feasibility: f64,
    pub innovation: f64,
    pub impact: f64,
    pub cost_effectiveness: f64,
    pub scalability: f64,
    pub risk_assessment: f64,
    pub timeline: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        let uniform = 1.0 / 7.0;
        Self {
            feasibility: uniform,
            innovation: uniform,
            impact: uniform,
            cost_effectiveness: uniform,
            scalability: uniform,
            risk_assessment: uniform,
            timeline: uniform,
        }
    }
}

impl DimensionScore {
    /// Weighted mean across the seven dimensions.
    pub fn overall(&self, weights: &DimensionWeights) -> f64 {
        let weighted_sum = self.feasibility * weights.feasibility
            + self.innovation * weights.innovation
            + self.impact * weights.impact
            + self.cost_effectiveness * weights.cost_effectiveness
            + self.scalability * weights.scalability
            + self.risk_assessment * weights.risk_assessment
            + self.timeline * weights.timeline;
        let weight_sum = weights.feasibility
            + weights.innovation
            + weights.impact
            + weights.cost_effectiveness
            + weights.scalability
            + weights.risk_assessment
            + weights.timeline;
        if weight_sum <= 0.0 {
            0.0
        } else {
            weighted_sum / weight_sum
        }
    }
}

/// Which logical-analysis variant the Logical Inference Engine performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceVariant {
    FullChain,
    Causal,
    Constraint,
    Contradiction,
    Implication,
}

/// A single cause/effect relationship identified by a `causal` analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalLink {
    pub cause: String,
    pub effect: String,
}

/// Two statements a `contradiction` analysis found to be in conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionPair {
    pub first: String,
    pub second: String,
}

/// The variant-specific structured payload an inference pass produces, keyed
/// on the `InferenceVariant` that was requested. Each variant's output is
/// structurally distinguishable rather than a reused plain string list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferencePayload {
    /// Ordered steps from premise to conclusion.
    FullChain { steps: Vec<String> },
    /// Cause/effect relationships the idea depends on.
    Causal { links: Vec<CausalLink> },
    /// Limiting conditions identified in the idea.
    Constraint { constraints: Vec<String> },
    /// Internal inconsistencies, as a conflicting-statement pair.
    Contradiction { conflicts: Vec<ContradictionPair> },
    /// A consequence the idea doesn't state directly, as antecedent/consequent.
    Implication { antecedent: String, consequent: String },
}

impl InferencePayload {
    /// An empty payload shaped for `variant`, used on failure.
    pub fn empty_for(variant: InferenceVariant) -> Self {
        match variant {
            InferenceVariant::FullChain => Self::FullChain { steps: Vec::new() },
            InferenceVariant::Causal => Self::Causal { links: Vec::new() },
            InferenceVariant::Constraint => Self::Constraint {
                constraints: Vec::new(),
            },
            InferenceVariant::Contradiction => Self::Contradiction {
                conflicts: Vec::new(),
            },
            InferenceVariant::Implication => Self::Implication {
                antecedent: String::new(),
                consequent: String::new(),
            },
        }
    }

    /// `true` if the payload carries no actual content, used by
    /// `normalize_inference` to decide whether an empty-chain result should
    /// be treated as a failure.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::FullChain { steps } => steps.is_empty(),
            Self::Causal { links } => links.is_empty(),
            Self::Constraint { constraints } => constraints.is_empty(),
            Self::Contradiction { conflicts } => conflicts.is_empty(),
            Self::Implication {
                antecedent,
                consequent,
            } => antecedent.is_empty() && consequent.is_empty(),
        }
    }
}

/// Result of a logical-inference pass over an idea's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub variant: InferenceVariant,
    pub conclusion: String,
    /// Normalized into [0, 1]; on failure this is 0.
    pub confidence: f64,
    pub payload: InferencePayload,
}

impl InferenceResult {
    /// A failed inference still produces a result: zero confidence, the
    /// error message carried as the conclusion, and an empty variant-shaped
    /// payload.
    pub fn failed(variant: InferenceVariant, message: impl Into<String>) -> Self {
        Self {
            variant,
            conclusion: message.into(),
            confidence: 0.0,
            payload: InferencePayload::empty_for(variant),
        }
    }
}

/// The unit the pipeline carries forward. Optional fields are present only
/// once their stage has run (either succeeded or produced its documented
/// fallback); absent means the stage was never requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub score: f64,
    pub critique: String,
    pub topic: String,
    pub context: String,
    pub advocacy: Option<Advocacy>,
    pub skepticism: Option<Skepticism>,
    pub improved_text: Option<String>,
    pub improved_score: Option<f64>,
    pub improved_critique: Option<String>,
    pub dimension_scores: Option<DimensionScore>,
    pub improved_dimension_scores: Option<DimensionScore>,
    pub logical_inference: Option<InferenceResult>,
}

impl Candidate {
    pub fn new(idea: &Idea, evaluation: &Evaluation, topic: &str, context: &str) -> Self {
        Self {
            text: format!("{}\n\n{}", idea.title, idea.description),
            score: evaluation.score,
            critique: evaluation.critique.clone(),
            topic: topic.to_string(),
            context: context.to_string(),
            advocacy: None,
            skepticism: None,
            improved_text: None,
            improved_score: None,
            improved_critique: None,
            dimension_scores: None,
            improved_dimension_scores: None,
            logical_inference: None,
        }
    }
}
