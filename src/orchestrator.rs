//! Workflow Orchestrator (C5): drives the fixed S0-S_end stage pipeline over
//! a candidate set. Generate/Evaluate/MultiDim/ReEvaluate stages issue one
//! batched Agent Function call covering every candidate; Advocate/Skeptic/
//! LogicalInference/Improve run as concurrent per-candidate tasks behind the
//! Async Executor's bounded semaphore. Field names are normalized only at the
//! wire boundary, and a `Candidate`'s `text` is never mutated in place once
//! it has been selected.

use std::collections::HashSet;
use std::time::Duration;

use crate::agents::types::{
    Candidate, DimensionWeights, Evaluation, Idea, InferenceVariant, TemperaturePreset,
    WorkflowRequest,
};
use crate::agents::{
    advocate::{self, AdvocateInputs},
    critic::{self, CriticInputs, CriticItem},
    dimension_evaluator::{self, DimensionEvaluatorInputs},
    generator::{self, GeneratorInputs},
    improver::{self, ImproverInputs},
    logical_inference::{self, LogicalInferenceInputs},
    skeptic::{self, SkepticInputs},
};
use crate::error::Result;
use crate::executor::{Executor, ProgressBus, DEFAULT_STAGE_CONCURRENCY};
use crate::llm::{CancellationToken, Router, RouterMetrics};

/// Per-stage timeouts, matching the central timeout table (§6 of the
/// requirements this pipeline implements).
const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const EVALUATE_TIMEOUT: Duration = Duration::from_secs(60);
const ADVOCATE_TIMEOUT: Duration = Duration::from_secs(90);
const SKEPTIC_TIMEOUT: Duration = Duration::from_secs(90);
const IMPROVE_TIMEOUT: Duration = Duration::from_secs(120);
const REEVAL_TIMEOUT: Duration = Duration::from_secs(60);
const MULTIDIM_TIMEOUT: Duration = Duration::from_secs(120);
const LOGICAL_TIMEOUT: Duration = Duration::from_secs(90);

/// Per-stage sampling temperatures and dimension-score weighting, resolved
/// once per request.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub generation_temperature: f64,
    pub critic_temperature: f64,
    pub advocate_temperature: f64,
    pub skeptic_temperature: f64,
    pub improver_temperature: f64,
    pub dimension_temperature: f64,
    pub inference_temperature: f64,
    pub dimension_weights: DimensionWeights,
}

impl OrchestratorConfig {
    pub fn from_preset(preset: TemperaturePreset) -> Self {
        let t = preset.value();
        Self {
            generation_temperature: t,
            critic_temperature: t,
            advocate_temperature: t,
            skeptic_temperature: t,
            improver_temperature: t,
            dimension_temperature: t,
            inference_temperature: t,
            dimension_weights: DimensionWeights::default(),
        }
    }

    pub fn with_dimension_weights(mut self, weights: DimensionWeights) -> Self {
        self.dimension_weights = weights;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_preset(TemperaturePreset::Balanced)
    }
}

/// Every candidate the pipeline produced, plus the Router's metrics
/// snapshot at the moment the request finished. `canceled` is set when the
/// caller's cancellation signal fired before every stage completed; in that
/// case `candidates` holds every candidate that completed through its last
/// successful stage.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub candidates: Vec<Candidate>,
    pub metrics: RouterMetrics,
    pub canceled: bool,
}

/// Deterministic multi-agent pipeline. Stateless: every call takes the
/// request-scoped `Router` and `WorkflowRequest` it needs and owns nothing
/// across calls.
pub struct Orchestrator;

impl Orchestrator {
    /// Run every stage in order with no progress reporting. See
    /// [`Self::run_with_progress`] for the full form.
    pub async fn run(
        router: &Router,
        request: &WorkflowRequest,
        config: &OrchestratorConfig,
        cancellation: Option<&CancellationToken>,
    ) -> Result<WorkflowOutcome> {
        Self::run_with_progress(router, request, config, cancellation, None).await
    }

    /// Run every stage in order. A total failure of S0 (Generate) or S1
    /// (Evaluate) is the only thing that ends the request early — every
    /// other stage degrades to its documented per-candidate fallback and
    /// keeps going. S0/S1/S3/S8/S9 are single batched calls (one API call
    /// covering every candidate); S4/S5/S6/S7 run as concurrent per-candidate
    /// tasks behind the Async Executor's bounded semaphore, matching the
    /// teacher's `BatchExecutor` concurrency model. `progress`, if given,
    /// receives one event per per-candidate task as it completes.
    pub async fn run_with_progress(
        router: &Router,
        request: &WorkflowRequest,
        config: &OrchestratorConfig,
        cancellation: Option<&CancellationToken>,
        progress: Option<&ProgressBus>,
    ) -> Result<WorkflowOutcome> {
        let topic = request.topic.clone();
        let context = request.context_str().to_string();
        let executor = Executor::new(DEFAULT_STAGE_CONCURRENCY);

        // S0: Generate
        let num_ideas = std::cmp::max(10, 2 * request.num_top_candidates as u32);
        let generator_inputs = GeneratorInputs {
            topic: topic.clone(),
            context: context.clone(),
            num_ideas,
        };
        let ideas = tokio::time::timeout(
            GENERATE_TIMEOUT,
            generator::call_batch(router, &generator_inputs, config.generation_temperature, cancellation),
        )
        .await
        .map_err(|_| crate::error::Error::timeout(GENERATE_TIMEOUT.as_millis() as u64))??;

        if ideas.is_empty() {
            return Ok(Self::empty_outcome(router, false).await);
        }

        // S1: Evaluate (Critic over the raw ideas)
        let critic_items: Vec<CriticItem> = ideas.iter().map(CriticItem::from_idea).collect();
        let critic_inputs = CriticInputs {
            ideas: critic_items,
            topic: topic.clone(),
            context: context.clone(),
        };
        let evaluations = match tokio::time::timeout(
            EVALUATE_TIMEOUT,
            critic::call_batch(router, &critic_inputs, "Critic@initial", config.critic_temperature, cancellation),
        )
        .await
        {
            Ok(Ok(evaluations)) => evaluations,
            Ok(Err(_)) | Err(_) => return Ok(Self::empty_outcome(router, false).await),
        };

        // S2: Select top-N by score with a novelty filter over the rest.
        let candidates = pair_ideas_with_evaluations(&ideas, &evaluations, &topic, &context);
        let mut candidates = select_top_candidates(
            candidates,
            request.num_top_candidates as usize,
            request.novelty_threshold,
        );

        if candidates.is_empty() {
            return Ok(Self::empty_outcome(router, false).await);
        }

        // S3: initial multi-dimensional scoring, always run.
        Self::score_dimensions(
            router,
            &mut candidates,
            "DimensionEvaluator@initial",
            config,
            cancellation,
            false,
        )
        .await;

        let mut canceled = cancellation.is_some_and(CancellationToken::is_canceled);

        // S4: Advocate, only when the request asked for the enhanced pass.
        if !canceled && request.enhanced {
            let tasks: Vec<_> = candidates
                .iter()
                .map(to_advocate_inputs)
                .map(|inputs| {
                    let router = router;
                    let temperature = config.advocate_temperature;
                    async move { advocate::call(router, &inputs, temperature, cancellation).await }
                })
                .collect();
            let results = executor
                .run_bounded("advocate", tasks, ADVOCATE_TIMEOUT, cancellation, progress)
                .await;
            for (candidate, result) in candidates.iter_mut().zip(results) {
                if let Some(Ok(advocacy)) = result {
                    candidate.advocacy = Some(advocacy);
                }
            }
            canceled = cancellation.is_some_and(CancellationToken::is_canceled);
        }

        // S5: Skeptic, same gate as Advocate.
        if !canceled && request.enhanced {
            let tasks: Vec<_> = candidates
                .iter()
                .map(to_skeptic_inputs)
                .map(|inputs| {
                    let router = router;
                    let temperature = config.skeptic_temperature;
                    async move { skeptic::call(router, &inputs, temperature, cancellation).await }
                })
                .collect();
            let results = executor
                .run_bounded("skeptic", tasks, SKEPTIC_TIMEOUT, cancellation, progress)
                .await;
            for (candidate, result) in candidates.iter_mut().zip(results) {
                if let Some(Ok(skepticism)) = result {
                    candidate.skepticism = Some(skepticism);
                }
            }
            canceled = cancellation.is_some_and(CancellationToken::is_canceled);
        }

        // S6: Logical inference, only when requested; never hard-fails.
        if !canceled && request.logical {
            let tasks: Vec<_> = candidates
                .iter()
                .map(|c| LogicalInferenceInputs {
                    idea_text: c.text.clone(),
                    topic: c.topic.clone(),
                    analysis_type: InferenceVariant::FullChain,
                })
                .map(|inputs| {
                    let router = router;
                    let temperature = config.inference_temperature;
                    async move { logical_inference::call(router, &inputs, temperature, cancellation).await }
                })
                .collect();
            let results = executor
                .run_bounded("logical_inference", tasks, LOGICAL_TIMEOUT, cancellation, progress)
                .await;
            for (candidate, result) in candidates.iter_mut().zip(results) {
                if let Some(inference) = result {
                    candidate.logical_inference = Some(inference);
                }
            }
            canceled = cancellation.is_some_and(CancellationToken::is_canceled);
        }

        // S7: Improve. The Improver receives the full critique/advocacy/
        // skepticism payload plus topic and context, per its contract.
        if !canceled {
            let tasks: Vec<_> = candidates
                .iter()
                .map(to_improver_inputs)
                .map(|inputs| {
                    let router = router;
                    let temperature = config.improver_temperature;
                    async move { improver::call(router, &inputs, temperature, cancellation).await }
                })
                .collect();
            let results = executor
                .run_bounded("improve", tasks, IMPROVE_TIMEOUT, cancellation, progress)
                .await;
            for (candidate, result) in candidates.iter_mut().zip(results) {
                if let Some(Ok(improved_idea)) = result {
                    candidate.improved_text = Some(improved_idea.improved_text());
                }
            }
            canceled = cancellation.is_some_and(CancellationToken::is_canceled);
        }

        if !canceled && candidates.iter().any(|c| c.improved_text.is_some()) {
            // S8: Re-evaluate the improved text with the Critic. `text`
            // itself is never overwritten; the improved view is built as a
            // temporary `CriticItem` list so the original candidate text
            // survives untouched alongside the new `improved_*` fields.
            let improved_items: Vec<CriticItem> = candidates
                .iter()
                .enumerate()
                .map(|(index, candidate)| CriticItem {
                    index: index as u32,
                    text: candidate
                        .improved_text
                        .clone()
                        .unwrap_or_else(|| candidate.text.clone()),
                })
                .collect();
            let reevaluation_inputs = CriticInputs {
                ideas: improved_items,
                topic: topic.clone(),
                context: context.clone(),
            };
            if let Ok(Ok(reevaluations)) = tokio::time::timeout(
                REEVAL_TIMEOUT,
                critic::call_batch(router, &reevaluation_inputs, "Critic@improved", config.critic_temperature, cancellation),
            )
            .await
            {
                for (candidate, evaluation) in candidates.iter_mut().zip(reevaluations) {
                    candidate.improved_score = Some(evaluation.score);
                    candidate.improved_critique = Some(evaluation.critique);
                }
            }

            // S9: improved-text multi-dimensional scoring. S3's scores stay
            // untouched on the same candidate.
            Self::score_dimensions(
                router,
                &mut candidates,
                "DimensionEvaluator@improved",
                config,
                cancellation,
                true,
            )
            .await;
        }

        let metrics = router.metrics_snapshot().snapshot().await;
        Ok(WorkflowOutcome { candidates, metrics, canceled })
    }

    async fn score_dimensions(
        router: &Router,
        candidates: &mut [Candidate],
        schema_identifier: &str,
        config: &OrchestratorConfig,
        cancellation: Option<&CancellationToken>,
        improved: bool,
    ) {
        let idea_texts: Vec<String> = candidates
            .iter()
            .map(|c| {
                if improved {
                    c.improved_text.clone().unwrap_or_else(|| c.text.clone())
                } else {
                    c.text.clone()
                }
            })
            .collect();
        let inputs = DimensionEvaluatorInputs {
            idea_texts,
            topic: candidates[0].topic.clone(),
            context: candidates[0].context.clone(),
        };
        if let Ok(scores) = dimension_evaluator::call_batch(
            router,
            &inputs,
            schema_identifier,
            config.dimension_temperature,
            cancellation,
        )
        .await
        {
            for (candidate, score) in candidates.iter_mut().zip(scores) {
                if improved {
                    candidate.improved_dimension_scores = score;
                } else {
                    candidate.dimension_scores = score;
                }
            }
        }
    }

    async fn empty_outcome(router: &Router, canceled: bool) -> WorkflowOutcome {
        WorkflowOutcome {
            candidates: Vec::new(),
            metrics: router.metrics_snapshot().snapshot().await,
            canceled,
        }
    }
}

fn pair_ideas_with_evaluations(
    ideas: &[Idea],
    evaluations: &[Evaluation],
    topic: &str,
    context: &str,
) -> Vec<Candidate> {
    ideas
        .iter()
        .map(|idea| {
            let evaluation = evaluations
                .iter()
                .find(|e| e.idea_index == idea.index)
                .cloned()
                .unwrap_or(Evaluation {
                    idea_index: idea.index,
                    score: 0.0,
                    critique: "unavailable".to_string(),
                });
            Candidate::new(idea, &evaluation, topic, context)
        })
        .collect()
}

/// Word-set Jaccard similarity between two idea texts, used as the novelty
/// filter in S2.
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Rank by score descending (ties keep the original, index-ascending
/// generation order via a stable sort), keep the top `n` while skipping any
/// candidate too similar to one already kept, then re-fill from the
/// remaining ranked candidates if the novelty filter left fewer than `n`.
fn select_top_candidates(
    mut ranked: Vec<Candidate>,
    n: usize,
    novelty_threshold: f64,
) -> Vec<Candidate> {
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected_indices: Vec<usize> = Vec::new();
    for (index, candidate) in ranked.iter().enumerate() {
        if selected_indices.len() >= n {
            break;
        }
        let too_similar = selected_indices
            .iter()
            .any(|&i| jaccard_similarity(&ranked[i].text, &candidate.text) >= novelty_threshold);
        if !too_similar {
            selected_indices.push(index);
        }
    }

    if selected_indices.len() < n {
        for index in 0..ranked.len() {
            if selected_indices.len() >= n {
                break;
            }
            if !selected_indices.contains(&index) {
                selected_indices.push(index);
            }
        }
    }

    selected_indices.sort_unstable();
    selected_indices
        .into_iter()
        .map(|i| ranked[i].clone())
        .collect()
}

fn to_advocate_inputs(candidate: &Candidate) -> AdvocateInputs {
    AdvocateInputs {
        candidate_text: candidate.text.clone(),
        critique: candidate.critique.clone(),
        topic: candidate.topic.clone(),
        context: candidate.context.clone(),
    }
}

fn to_skeptic_inputs(candidate: &Candidate) -> SkepticInputs {
    SkepticInputs {
        candidate_text: candidate.text.clone(),
        critique: candidate.critique.clone(),
        topic: candidate.topic.clone(),
        context: candidate.context.clone(),
    }
}

fn to_improver_inputs(candidate: &Candidate) -> ImproverInputs {
    ImproverInputs {
        candidate_text: candidate.text.clone(),
        critique: candidate.critique.clone(),
        topic: candidate.topic.clone(),
        context: candidate.context.clone(),
        advocacy: candidate.advocacy.clone(),
        skepticism: candidate.skepticism.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::Idea;
    use crate::llm::{ClientConfig, MockClient, RouterConfig};
    use std::sync::Arc;

    fn idea(index: u32, title: &str) -> Idea {
        Idea {
            index,
            title: title.to_string(),
            description: format!("description for {title}"),
            key_features: Vec::new(),
            category: "general".to_string(),
        }
    }

    fn evaluation(index: u32, score: f64) -> Evaluation {
        Evaluation {
            idea_index: index,
            score,
            critique: "fine".to_string(),
        }
    }

    #[test]
    fn select_top_candidates_ranks_by_score_desc_with_index_tiebreak() {
        let ideas = vec![idea(0, "alpha widget"), idea(1, "beta gadget"), idea(2, "gamma device")];
        let evaluations = vec![evaluation(0, 5.0), evaluation(1, 9.0), evaluation(2, 9.0)];
        let candidates = pair_ideas_with_evaluations(&ideas, &evaluations, "topic", "");

        let top = select_top_candidates(candidates, 2, 1.1);
        assert_eq!(top.len(), 2);
        assert!(top[0].text.contains("beta gadget"));
        assert!(top[1].text.contains("gamma device"));
    }

    #[test]
    fn select_top_candidates_filters_near_duplicates_then_refills() {
        let ideas = vec![
            idea(0, "solar powered urban rooftop garden network"),
            idea(1, "solar powered urban rooftop garden system"),
            idea(2, "community tool lending library"),
        ];
        let evaluations = vec![evaluation(0, 9.0), evaluation(1, 8.5), evaluation(2, 6.0)];
        let candidates = pair_ideas_with_evaluations(&ideas, &evaluations, "topic", "");

        let top = select_top_candidates(candidates, 2, 0.8);
        assert_eq!(top.len(), 2);
        assert!(top.iter().any(|c| c.text.contains("tool lending library")));
    }

    #[test]
    fn jaccard_similarity_of_identical_text_is_one() {
        assert_eq!(jaccard_similarity("a b c", "a b c"), 1.0);
    }

    #[tokio::test]
    async fn run_terminates_early_when_generator_exhausts_every_provider() {
        let client: Arc<dyn crate::llm::LLMClient> = Arc::new(MockClient::always_failing());
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
        let request = WorkflowRequest::new("urban beekeeping", 2).unwrap();
        let config = OrchestratorConfig::default();

        let outcome = Orchestrator::run(&router, &request, &config, None).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn run_produces_top_n_candidates_from_a_healthy_provider() {
        let ideas_response = serde_json::json!([
            {"index": 0, "title": "rooftop apiary kits", "description": "prefab hive kits for flat roofs", "key_features": [], "category": "hardware"},
            {"index": 1, "title": "community honey co-op", "description": "shared extraction equipment", "key_features": [], "category": "service"},
        ])
        .to_string();
        let client: Arc<dyn crate::llm::LLMClient> =
            Arc::new(MockClient::new().with_response(ideas_response));
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
        let request = WorkflowRequest::new("urban beekeeping", 2).unwrap();
        let config = OrchestratorConfig::default();

        let outcome = Orchestrator::run(&router, &request, &config, None)
            .await
            .unwrap();
        assert!(!outcome.candidates.is_empty());
        assert!(outcome.candidates.len() <= 2);
    }

    #[tokio::test]
    async fn run_populates_advocacy_and_skepticism_when_enhanced() {
        let ideas_response = serde_json::json!([
            {"index": 0, "title": "rooftop apiary kits", "description": "prefab hive kits for flat roofs", "key_features": [], "category": "hardware"},
            {"index": 1, "title": "community honey co-op", "description": "shared extraction equipment", "key_features": [], "category": "service"},
        ])
        .to_string();
        let client: Arc<dyn crate::llm::LLMClient> =
            Arc::new(MockClient::new().with_response(ideas_response));
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
        let request = WorkflowRequest::new("urban beekeeping", 2)
            .unwrap()
            .with_enhanced(true);
        let config = OrchestratorConfig::default();

        let outcome = Orchestrator::run(&router, &request, &config, None)
            .await
            .unwrap();
        assert!(!outcome.canceled);
        assert!(outcome
            .candidates
            .iter()
            .any(|c| c.advocacy.is_some() || c.skepticism.is_some()));
    }

    #[tokio::test]
    async fn run_with_progress_stops_early_and_flags_canceled() {
        let ideas_response = serde_json::json!([
            {"index": 0, "title": "rooftop apiary kits", "description": "prefab hive kits for flat roofs", "key_features": [], "category": "hardware"},
        ])
        .to_string();
        let client: Arc<dyn crate::llm::LLMClient> =
            Arc::new(MockClient::new().with_response(ideas_response));
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
        let request = WorkflowRequest::new("urban beekeeping", 1)
            .unwrap()
            .with_enhanced(true);
        let config = OrchestratorConfig::default();
        let cancellation = crate::llm::CancellationToken::new();
        cancellation.cancel();

        let outcome = Orchestrator::run_with_progress(&router, &request, &config, Some(&cancellation), None)
            .await
            .unwrap();
        assert!(outcome.canceled);
        for candidate in &outcome.candidates {
            assert!(candidate.advocacy.is_none());
            assert!(candidate.skepticism.is_none());
        }
    }

    #[test]
    fn client_config_still_usable_for_router_construction() {
        let _ = ClientConfig::new("http://localhost:11434");
    }
}
