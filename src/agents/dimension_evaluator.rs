//! Dimension Evaluator agent: scores a batch of idea texts across seven
//! fixed quality dimensions. Runs twice per request (S3 initial, S9
//! improved) regardless of which other optional stages are enabled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::llm::{CancellationToken, Router};
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::DimensionScore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionEvaluatorInputs {
    pub idea_texts: Vec<String>,
    pub topic: String,
    pub context: String,
}

pub struct DimensionEvaluator;

impl Signature for DimensionEvaluator {
    type Inputs = DimensionEvaluatorInputs;
    type Outputs = DimensionScore;

    fn instructions() -> &'static str {
        "Score each idea on seven dimensions, each 0-10: feasibility \
         (can it realistically be built), innovation (how novel it is), \
         impact (how much value it creates), cost_effectiveness, \
         scalability, risk_assessment (10 = low risk), and timeline \
         (10 = fast to deliver)."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("idea_texts", FieldType::list(FieldType::String)),
            FieldSpec::new("topic", FieldType::String),
            FieldSpec::new("context", FieldType::String).optional(),
        ]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("feasibility", FieldType::Float),
            FieldSpec::new("innovation", FieldType::Float),
            FieldSpec::new("impact", FieldType::Float),
            FieldSpec::new("cost_effectiveness", FieldType::Float),
            FieldSpec::new("scalability", FieldType::Float),
            FieldSpec::new("risk_assessment", FieldType::Float),
            FieldSpec::new("timeline", FieldType::Float),
        ]
    }
}

pub fn prompt(inputs: &DimensionEvaluatorInputs) -> String {
    let mut base = String::new();
    base.push_str("## Task\n\n");
    base.push_str(DimensionEvaluator::instructions());
    base.push_str("\n\n## Topic\n\n");
    base.push_str(&inputs.topic);
    if !inputs.context.is_empty() {
        base.push_str("\n\n## Context\n\n");
        base.push_str(&inputs.context);
    }
    base.push_str("\n\n## Ideas\n\n");
    for (i, text) in inputs.idea_texts.iter().enumerate() {
        base.push_str(&format!("[{i}] {text}\n\n"));
    }
    base.push_str(
        "## Required Output\n\nRespond with a JSON array, one object per idea \
         index above, each with feasibility, innovation, impact, \
         cost_effectiveness, scalability, risk_assessment, and timeline.\n",
    );
    finalize_prompt(base)
}

fn score_from_value(value: &Value) -> Option<DimensionScore> {
    serde_json::from_value(value.clone()).ok()
}

/// Per-candidate failure leaves that candidate's score absent rather than
/// substituting a fabricated value — callers treat `None` as "stage not run
/// for this candidate".
pub async fn call_batch(
    router: &Router,
    inputs: &DimensionEvaluatorInputs,
    schema_identifier: &str,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<Option<DimensionScore>>> {
    let text = prompt(inputs);
    let schema = DimensionEvaluator::output_fields();
    let expected_count = inputs.idea_texts.len();
    let (items, _tokens) = router
        .generate_structured_batch(&text, schema_identifier, &schema, expected_count, temperature, cancellation)
        .await?;
    Ok(items.iter().map(score_from_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::DimensionWeights;

    #[test]
    fn score_from_value_rejects_malformed_record() {
        let bad = serde_json::json!({"error": "parse_shortfall"});
        assert!(score_from_value(&bad).is_none());
    }

    #[test]
    fn score_from_value_accepts_full_record() {
        let good = serde_json::json!({
            "feasibility": 7.0, "innovation": 8.0, "impact": 6.0,
            "cost_effectiveness": 5.0, "scalability": 9.0,
            "risk_assessment": 4.0, "timeline": 7.0
        });
        let score = score_from_value(&good).unwrap();
        let overall = score.overall(&DimensionWeights::default());
        assert!((0.0..=10.0).contains(&overall));
    }
}
