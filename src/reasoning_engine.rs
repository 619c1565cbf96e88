//! Enhanced Reasoning Engine (C7): pure post-processing over already-parsed
//! agent records. No provider I/O happens here — everything in this module
//! runs after the Structured-Output Parser has already validated a record;
//! it only combines or normalizes fields the agent callers hand it.

use crate::agents::types::{
    DimensionScore, DimensionWeights, InferencePayload, InferenceResult, InferenceVariant,
};

/// Weighted mean across a `DimensionScore`'s seven fields. Exposed as a free
/// function (in addition to the inherent `DimensionScore::overall`) so
/// orchestrator code that only has the weights on hand doesn't need to know
/// which type owns the computation.
pub fn overall_score(score: &DimensionScore, weights: &DimensionWeights) -> f64 {
    score.overall(weights)
}

/// Turn a raw (conclusion, confidence, payload) triple from the Logical
/// Inference Engine into a validated `InferenceResult`.
///
/// Confidence is clamped into `[0, 1]` using the same discipline the Parser
/// (C1) applies to scores. An empty payload is only valid for the
/// `implication` variant's degenerate case (a direct consequence that needs
/// no antecedent/consequent text); for every other variant an empty payload
/// is treated as a failed inference.
pub fn normalize_inference(
    variant: InferenceVariant,
    conclusion: String,
    confidence: f64,
    payload: InferencePayload,
) -> InferenceResult {
    let confidence = confidence.clamp(0.0, 1.0);
    if payload.is_empty() && variant != InferenceVariant::Implication {
        return InferenceResult::failed(variant, "empty inference payload");
    }
    InferenceResult {
        variant,
        conclusion,
        confidence,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_score_is_uniform_mean_under_default_weights() {
        let score = DimensionScore {
            feasibility: 10.0,
            innovation: 0.0,
            impact: 10.0,
            cost_effectiveness: 0.0,
            scalability: 10.0,
            risk_assessment: 0.0,
            timeline: 10.0,
        };
        let overall = overall_score(&score, &DimensionWeights::default());
        assert!((overall - 40.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_inference_clamps_out_of_range_confidence() {
        let result = normalize_inference(
            InferenceVariant::Causal,
            "conclusion".to_string(),
            -0.3,
            InferencePayload::Causal {
                links: vec![crate::agents::types::CausalLink {
                    cause: "rain".into(),
                    effect: "flood".into(),
                }],
            },
        );
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn normalize_inference_allows_empty_payload_only_for_implication() {
        let causal = normalize_inference(
            InferenceVariant::Causal,
            "c".into(),
            0.9,
            InferencePayload::empty_for(InferenceVariant::Causal),
        );
        assert_eq!(causal.confidence, 0.0);

        let implication = normalize_inference(
            InferenceVariant::Implication,
            "c".into(),
            0.9,
            InferencePayload::Implication {
                antecedent: String::new(),
                consequent: String::new(),
            },
        );
        assert_eq!(implication.confidence, 0.9);
    }
}
