//! Critic agent: scores a batch of ideas (by index) against a topic/context.
//!
//! Used twice by the orchestrator: once over the raw Generator output (S1)
//! and once over the Improver's rewritten text (S8, under a different
//! schema identifier so the two never share a cache entry).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::llm::{CancellationToken, Router};
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::{Evaluation, Idea};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticInputs {
    pub ideas: Vec<CriticItem>,
    pub topic: String,
    pub context: String,
}

/// Index + text view of an idea, independent of whether it came from the
/// Generator (`Idea`) or is the Improver's rewritten text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticItem {
    pub index: u32,
    pub text: String,
}

impl CriticItem {
    pub fn from_idea(idea: &Idea) -> Self {
        Self {
            index: idea.index,
            text: format!("{}\n\n{}", idea.title, idea.description),
        }
    }
}

pub struct Critic;

impl Signature for Critic {
    type Inputs = CriticInputs;
    type Outputs = Evaluation;

    fn instructions() -> &'static str {
        "Critically evaluate each idea on its merit for the given topic and \
         context. Score harshly but fairly on a 0-10 scale; a 10 means \
         exceptional and immediately actionable, a 0 means fundamentally \
         unworkable. Justify every score with one or two sentences of critique."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("ideas", FieldType::list(FieldType::custom("CriticItem")))
                .with_description("Ideas to evaluate, each with its index and text"),
            FieldSpec::new("topic", FieldType::String),
            FieldSpec::new("context", FieldType::String).optional(),
        ]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("idea_index", FieldType::Integer)
                .with_description("Matches the index of the idea being scored"),
            FieldSpec::new("score", FieldType::Float).with_description("0-10 quality score"),
            FieldSpec::new("critique", FieldType::String).with_description("Justification for the score"),
        ]
    }
}

pub fn prompt(inputs: &CriticInputs) -> String {
    let mut base = String::new();
    base.push_str("## Task\n\n");
    base.push_str(Critic::instructions());
    base.push_str("\n\n## Topic\n\n");
    base.push_str(&inputs.topic);
    if !inputs.context.is_empty() {
        base.push_str("\n\n## Context\n\n");
        base.push_str(&inputs.context);
    }
    base.push_str("\n\n## Ideas\n\n");
    for item in &inputs.ideas {
        base.push_str(&format!("[{}] {}\n\n", item.index, item.text));
    }
    base.push_str("## Required Output\n\nRespond with a JSON array, one object per idea index, each with idea_index, score, and critique.\n");
    finalize_prompt(base)
}

/// The documented partial-failure fallback for a Critic item: a visible zero
/// score with a critique string that marks the result as degraded.
fn evaluation_from_value(index: u32, value: &Value) -> Evaluation {
    serde_json::from_value(value.clone()).unwrap_or(Evaluation {
        idea_index: index,
        score: 0.0,
        critique: "unavailable".to_string(),
    })
}

pub async fn call_batch(
    router: &Router,
    inputs: &CriticInputs,
    schema_identifier: &str,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<Evaluation>> {
    let text = prompt(inputs);
    let schema = Critic::output_fields();
    let expected_count = inputs.ideas.len();
    let (items, _tokens) = router
        .generate_structured_batch(&text, schema_identifier, &schema, expected_count, temperature, cancellation)
        .await?;
    Ok(inputs
        .ideas
        .iter()
        .zip(items.iter())
        .map(|(item, v)| evaluation_from_value(item.index, v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_from_value_defaults_on_bad_shape() {
        let bad = serde_json::json!({"error": "parse_shortfall"});
        let eval = evaluation_from_value(3, &bad);
        assert_eq!(eval.idea_index, 3);
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.critique, "unavailable");
    }

    #[test]
    fn prompt_lists_every_idea_index() {
        let inputs = CriticInputs {
            ideas: vec![
                CriticItem { index: 0, text: "a".into() },
                CriticItem { index: 1, text: "b".into() },
            ],
            topic: "topic".into(),
            context: String::new(),
        };
        let text = prompt(&inputs);
        assert!(text.contains("[0] a"));
        assert!(text.contains("[1] b"));
    }
}
