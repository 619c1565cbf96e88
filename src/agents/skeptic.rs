//! Skeptic agent: challenges a single candidate idea.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{CancellationToken, Router};
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::Skepticism;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkepticInputs {
    pub candidate_text: String,
    pub critique: String,
    pub topic: String,
    pub context: String,
}

pub struct Skeptic;

fn bullet_list_type() -> FieldType {
    FieldType::list(FieldType::object(vec![
        FieldSpec::new("title", FieldType::String),
        FieldSpec::new("body", FieldType::String),
    ]))
}

impl Signature for Skeptic {
    type Inputs = SkepticInputs;
    type Outputs = Skepticism;

    fn instructions() -> &'static str {
        "Challenge this idea as rigorously as you can. Surface its critical \
         flaws, concrete risks, assumptions that may not hold, and anything \
         important the idea overlooks. Be specific; generic skepticism is \
         not useful."
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
            FieldSpec::new("critical_flaws", bullet_list_type()),
            FieldSpec::new("risks", bullet_list_type()),
            FieldSpec::new("questionable_assumptions", bullet_list_type()),
            FieldSpec::new("missing_considerations", bullet_list_type()),
        ]
    }
}

pub fn prompt(inputs: &SkepticInputs) -> String {
    finalize_prompt(Skeptic::to_prompt(inputs))
}

pub async fn call(
    router: &Router,
    inputs: &SkepticInputs,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Skepticism> {
    let text = prompt(inputs);
    let schema = Skeptic::output_fields();
    let (value, _tokens) = router
        .generate_structured(&text, "Skeptic@1", &schema, temperature, cancellation)
        .await?;
    Ok(serde_json::from_value(value)?)
}

pub fn prompt_batch(items: &[SkepticInputs]) -> String {
    let mut base = String::new();
    base.push_str("## Task\n\n");
    base.push_str(Skeptic::instructions());
    base.push_str("\n\n## Candidates\n\n");
    for (i, item) in items.iter().enumerate() {
        base.push_str(&format!(
            "[{i}] Topic: {}\nContext: {}\nCandidate: {}\nCritique: {}\n\n",
            item.topic, item.context, item.candidate_text, item.critique
        ));
    }
    base.push_str("## Required Output\n\nRespond with a JSON array, one skepticism object per candidate index above, each with critical_flaws, risks, questionable_assumptions, and missing_considerations.\n");
    finalize_prompt(base)
}

pub async fn call_batch(
    router: &Router,
    items: &[SkepticInputs],
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<Skepticism>> {
    let text = prompt_batch(items);
    let schema = Skeptic::output_fields();
    let (values, _tokens) = router
        .generate_structured_batch(&text, "Skeptic@1", &schema, items.len(), temperature, cancellation)
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
    fn prompt_includes_critique() {
        let inputs = SkepticInputs {
            candidate_text: "idea".into(),
            critique: "unclear logistics".into(),
            topic: "topic".into(),
            context: String::new(),
        };
        assert!(prompt(&inputs).contains("unclear logistics"));
    }
}
