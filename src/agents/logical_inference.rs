//! Logical Inference Engine agent: reasons over a single idea's text under
//! one of five analysis modes. Provider/parse failure never propagates past
//! this module — it is folded into a zero-confidence `InferenceResult`
//! instead, matching the reasoning engine's failure contract.

use serde::{Deserialize, Serialize};

use crate::llm::{CancellationToken, Router};
use crate::reasoning_engine::normalize_inference;
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::{CausalLink, ContradictionPair, InferencePayload, InferenceResult, InferenceVariant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalInferenceInputs {
    pub idea_text: String,
    pub topic: String,
    pub analysis_type: InferenceVariant,
}

/// Parsed shape before the `variant` tag (known from the request, not the
/// model) is attached. Carries every variant's fields; only the ones
/// matching `analysis_type` are read when building the `InferencePayload`,
/// since the wire schema is the same for all five analysis modes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawInferenceResult {
    conclusion: String,
    confidence: f64,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    causal_links: Vec<CausalLink>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    contradiction: Option<ContradictionPair>,
    #[serde(default)]
    antecedent: String,
    #[serde(default)]
    consequent: String,
}

pub struct LogicalInferenceEngine;

impl Signature for LogicalInferenceEngine {
    type Inputs = LogicalInferenceInputs;
    type Outputs = RawInferenceResult;

    fn instructions() -> &'static str {
        "Perform the requested logical-analysis mode over the idea text: \
         full_chain walks every inferential step from premise to conclusion; \
         causal identifies cause/effect relationships the idea depends on; \
         constraint identifies limiting conditions; contradiction looks for \
         internal inconsistencies; implication draws out consequences the \
         idea doesn't state directly. Report your confidence in the \
         conclusion as a number in [0, 1]."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("idea_text", FieldType::String),
            FieldSpec::new("topic", FieldType::String),
            FieldSpec::new(
                "analysis_type",
                FieldType::enum_of(["full_chain", "causal", "constraint", "contradiction", "implication"]),
            ),
        ]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("conclusion", FieldType::String),
            FieldSpec::new("confidence", FieldType::Float).with_description("In [0, 1]"),
            FieldSpec::new("steps", FieldType::list(FieldType::String))
                .with_description("full_chain: ordered reasoning steps")
                .optional(),
            FieldSpec::new(
                "causal_links",
                FieldType::list(FieldType::object(vec![
                    FieldSpec::new("cause", FieldType::String),
                    FieldSpec::new("effect", FieldType::String),
                ])),
            )
            .with_description("causal: cause/effect pairs")
            .optional(),
            FieldSpec::new("constraints", FieldType::list(FieldType::String))
                .with_description("constraint: limiting conditions")
                .optional(),
            FieldSpec::new(
                "contradiction",
                FieldType::object(vec![
                    FieldSpec::new("first", FieldType::String),
                    FieldSpec::new("second", FieldType::String),
                ]),
            )
            .with_description("contradiction: the two conflicting statements")
            .optional(),
            FieldSpec::new("antecedent", FieldType::String)
                .with_description("implication: the stated premise")
                .optional(),
            FieldSpec::new("consequent", FieldType::String)
                .with_description("implication: the unstated consequence")
                .optional(),
        ]
    }
}

pub fn prompt(inputs: &LogicalInferenceInputs) -> String {
    finalize_prompt(LogicalInferenceEngine::to_prompt(inputs))
}

fn payload_for(variant: InferenceVariant, raw: &RawInferenceResult) -> InferencePayload {
    match variant {
        InferenceVariant::FullChain => InferencePayload::FullChain {
            steps: raw.steps.clone(),
        },
        InferenceVariant::Causal => InferencePayload::Causal {
            links: raw.causal_links.clone(),
        },
        InferenceVariant::Constraint => InferencePayload::Constraint {
            constraints: raw.constraints.clone(),
        },
        InferenceVariant::Contradiction => InferencePayload::Contradiction {
            conflicts: raw.contradiction.clone().into_iter().collect(),
        },
        InferenceVariant::Implication => InferencePayload::Implication {
            antecedent: raw.antecedent.clone(),
            consequent: raw.consequent.clone(),
        },
    }
}

fn normalize(variant: InferenceVariant, raw: RawInferenceResult) -> InferenceResult {
    let payload = payload_for(variant, &raw);
    normalize_inference(variant, raw.conclusion, raw.confidence, payload)
}

pub async fn call(
    router: &Router,
    inputs: &LogicalInferenceInputs,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> InferenceResult {
    let variant = inputs.analysis_type;
    let text = prompt(inputs);
    let schema = LogicalInferenceEngine::output_fields();
    let result = router
        .generate_structured(&text, "LogicalInferenceEngine@1", &schema, temperature, cancellation)
        .await;

    match result {
        Ok((value, _tokens)) => match serde_json::from_value::<RawInferenceResult>(value) {
            Ok(raw) => normalize(variant, raw),
            Err(e) => InferenceResult::failed(variant, e.to_string()),
        },
        Err(e) => InferenceResult::failed(variant, e.to_string()),
    }
}

pub fn prompt_batch(items: &[LogicalInferenceInputs]) -> String {
    let mut base = String::new();
    base.push_str("## Task\n\n");
    base.push_str(LogicalInferenceEngine::instructions());
    base.push_str("\n\n## Ideas\n\n");
    for (i, item) in items.iter().enumerate() {
        base.push_str(&format!(
            "[{i}] Topic: {}\nAnalysis type: {:?}\nIdea: {}\n\n",
            item.topic, item.analysis_type, item.idea_text
        ));
    }
    base.push_str("## Required Output\n\nRespond with a JSON array, one object per idea index above, each with conclusion, confidence, and whichever variant-specific fields its analysis type calls for (steps, causal_links, constraints, contradiction, or antecedent/consequent).\n");
    finalize_prompt(base)
}

/// A batch failure (provider exhaustion or a total parse miss) folds into a
/// zero-confidence result for every item, same as the single-item `call`.
pub async fn call_batch(
    router: &Router,
    items: &[LogicalInferenceInputs],
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Vec<InferenceResult> {
    let text = prompt_batch(items);
    let schema = LogicalInferenceEngine::output_fields();
    match router
        .generate_structured_batch(&text, "LogicalInferenceEngine@1", &schema, items.len(), temperature, cancellation)
        .await
    {
        Ok((values, _tokens)) => items
            .iter()
            .zip(values.iter())
            .map(|(item, v)| match serde_json::from_value::<RawInferenceResult>(v.clone()) {
                Ok(raw) => normalize(item.analysis_type, raw),
                Err(e) => InferenceResult::failed(item.analysis_type, e.to_string()),
            })
            .collect(),
        Err(e) => items
            .iter()
            .map(|item| InferenceResult::failed(item.analysis_type, e.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_confidence_into_unit_interval() {
        let raw = RawInferenceResult {
            conclusion: "ok".into(),
            confidence: 1.4,
            causal_links: vec![CausalLink {
                cause: "demand rises".into(),
                effect: "price rises".into(),
            }],
            ..Default::default()
        };
        let result = normalize(InferenceVariant::Causal, raw);
        assert_eq!(result.confidence, 1.0);
        assert!(matches!(result.payload, InferencePayload::Causal { ref links } if links.len() == 1));
    }

    #[test]
    fn normalize_rejects_empty_payload_unless_implication() {
        let raw = RawInferenceResult {
            conclusion: "ok".into(),
            confidence: 0.8,
            ..Default::default()
        };
        // Causal has no content in `raw` at all: treated as a failed inference.
        let result = normalize(InferenceVariant::Causal, raw.clone());
        assert_eq!(result.confidence, 0.0);

        // Implication's degenerate empty-payload case is not a failure.
        let implied = normalize(InferenceVariant::Implication, raw);
        assert_eq!(implied.confidence, 0.8);
    }

    #[test]
    fn normalize_builds_variant_specific_payload_for_full_chain() {
        let raw = RawInferenceResult {
            conclusion: "works end to end".into(),
            confidence: 0.6,
            steps: vec!["premise".into(), "inference".into(), "conclusion".into()],
            ..Default::default()
        };
        let result = normalize(InferenceVariant::FullChain, raw);
        match result.payload {
            InferencePayload::FullChain { steps } => assert_eq!(steps.len(), 3),
            other => panic!("expected FullChain payload, got {other:?}"),
        }
    }
}
