//! Advocate agent: argues for a single candidate idea.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{CancellationToken, Router};
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::Advocacy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvocateInputs {
    pub candidate_text: String,
    pub critique: String,
    pub topic: String,
    pub context: String,
}

pub struct Advocate;

fn bullet_list_type() -> FieldType {
    FieldType::list(FieldType::object(vec![
        FieldSpec::new("title", FieldType::String),
        FieldSpec::new("body", FieldType::String),
    ]))
}

impl Signature for Advocate {
    type Inputs = AdvocateInputs;
    type Outputs = Advocacy;

    fn instructions() -> &'static str {
        "Make the strongest honest case for this idea. Identify its real \
         strengths, the opportunities it opens up, and which points from its \
         critique are actually already addressed by the idea as written. Do \
         not invent strengths the idea does not have."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("candidate_text", FieldType::String),
            FieldSpec::new("critique", FieldType::String),
            FieldSpec::new("topic", FieldType::String),
            FieldSpec::new("context", FieldType::String).optional(),
        ]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("strengths", bullet_list_type()),
            FieldSpec::new("opportunities", bullet_list_type()),
            FieldSpec::new("addressed_concerns", bullet_list_type()),
        ]
    }
}

pub fn prompt(inputs: &AdvocateInputs) -> String {
    finalize_prompt(Advocate::to_prompt(inputs))
}

pub async fn call(
    router: &Router,
    inputs: &AdvocateInputs,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Advocacy> {
    let text = prompt(inputs);
    let schema = Advocate::output_fields();
    let (value, _tokens) = router
        .generate_structured(&text, "Advocate@1", &schema, temperature, cancellation)
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// One API call covering every candidate in the batch, honoring the
/// orchestrator's "O(1) calls per stage" invariant instead of one call per
/// candidate.
pub fn prompt_batch(items: &[AdvocateInputs]) -> String {
    let mut base = String::new();
    base.push_str("## Task\n\n");
    base.push_str(Advocate::instructions());
    base.push_str("\n\n## Candidates\n\n");
    for (i, item) in items.iter().enumerate() {
        base.push_str(&format!(
            "[{i}] Topic: {}\nContext: {}\nCandidate: {}\nCritique: {}\n\n",
            item.topic, item.context, item.candidate_text, item.critique
        ));
    }
    base.push_str("## Required Output\n\nRespond with a JSON array, one advocacy object per candidate index above, each with strengths, opportunities, and addressed_concerns.\n");
    finalize_prompt(base)
}

pub async fn call_batch(
    router: &Router,
    items: &[AdvocateInputs],
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<Advocacy>> {
    let text = prompt_batch(items);
    let schema = Advocate::output_fields();
    let (values, _tokens) = router
        .generate_structured_batch(&text, "Advocate@1", &schema, items.len(), temperature, cancellation)
        .await?;
    Ok(values
        .iter()
        .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_candidate_text() {
        let inputs = AdvocateInputs {
            candidate_text: "a rooftop garden network".into(),
            critique: "logistics unclear".into(),
            topic: "urban farming".into(),
            context: String::new(),
        };
        assert!(prompt(&inputs).contains("rooftop garden network"));
    }
}
