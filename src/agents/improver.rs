//! Improver agent: rewrites a candidate in light of its full critique,
//! advocacy, and skepticism.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{CancellationToken, Router};
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::{Advocacy, ImprovedIdea, Skepticism};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImproverInputs {
    pub candidate_text: String,
    pub critique: String,
    pub topic: String,
    pub context: String,
    pub advocacy: Option<Advocacy>,
    pub skepticism: Option<Skepticism>,
}

pub struct Improver;

impl Signature for Improver {
    type Inputs = ImproverInputs;
    type Outputs = ImprovedIdea;

    fn instructions() -> &'static str {
        "Rewrite this idea into a stronger version. Keep what the advocacy \
         identified as genuine strengths, address the critique's concerns \
         and the skepticism's flaws and risks directly, and stay on the same \
         topic. Do not hedge the idea into vagueness; make it more concrete, \
         not less."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("candidate_text", FieldType::String),
            FieldSpec::new("critique", FieldType::String),
            FieldSpec::new("topic", FieldType::String),
            FieldSpec::new("context", FieldType::String).optional(),
            FieldSpec::new("advocacy", FieldType::custom("Advocacy")).optional(),
            FieldSpec::new("skepticism", FieldType::custom("Skepticism")).optional(),
        ]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("title", FieldType::String),
            FieldSpec::new("description", FieldType::String),
            FieldSpec::new("key_improvements", FieldType::list(FieldType::String)),
            FieldSpec::new("implementation_steps", FieldType::list(FieldType::String)),
            FieldSpec::new("differentiators", FieldType::list(FieldType::String)),
        ]
    }
}

pub fn prompt(inputs: &ImproverInputs) -> String {
    finalize_prompt(Improver::to_prompt(inputs))
}

pub async fn call(
    router: &Router,
    inputs: &ImproverInputs,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<ImprovedIdea> {
    let text = prompt(inputs);
    let schema = Improver::output_fields();
    let (value, _tokens) = router
        .generate_structured(&text, "Improver@1", &schema, temperature, cancellation)
        .await?;
    Ok(serde_json::from_value(value)?)
}

pub fn prompt_batch(items: &[ImproverInputs]) -> String {
    let mut base = String::new();
    base.push_str("## Task\n\n");
    base.push_str(Improver::instructions());
    base.push_str("\n\n## Candidates\n\n");
    for (i, item) in items.iter().enumerate() {
        base.push_str(&format!(
            "[{i}] Topic: {}\nContext: {}\nCandidate: {}\nCritique: {}\n",
            item.topic, item.context, item.candidate_text, item.critique
        ));
        if let Some(advocacy) = &item.advocacy {
            base.push_str(&format!(
                "Advocacy: {}\n",
                serde_json::to_string(advocacy).unwrap_or_default()
            ));
        }
        if let Some(skepticism) = &item.skepticism {
            base.push_str(&format!(
                "Skepticism: {}\n",
                serde_json::to_string(skepticism).unwrap_or_default()
            ));
        }
        base.push('\n');
    }
    base.push_str("## Required Output\n\nRespond with a JSON array, one improved-idea object per candidate index above, each with title, description, key_improvements, implementation_steps, and differentiators.\n");
    finalize_prompt(base)
}

pub async fn call_batch(
    router: &Router,
    items: &[ImproverInputs],
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<ImprovedIdea>> {
    let text = prompt_batch(items);
    let schema = Improver::output_fields();
    let (values, _tokens) = router
        .generate_structured_batch(&text, "Improver@1", &schema, items.len(), temperature, cancellation)
        .await?;
    Ok(values
        .iter()
        .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
        .collect())
}
