//! Generator agent: topic + context → a batch of candidate ideas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::llm::{CancellationToken, Router};
use crate::signature::{FieldSpec, FieldType, Signature};

use super::finalize_prompt;
use super::types::Idea;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorInputs {
    pub topic: String,
    pub context: String,
    pub num_ideas: u32,
}

pub struct Generator;

impl Signature for Generator {
    type Inputs = GeneratorInputs;
    type Outputs = Idea;

    fn instructions() -> &'static str {
        "Brainstorm distinct, concrete ideas that address the topic, using the \
         supporting context where it narrows or sharpens the idea. Every idea must \
         be actionable, not a restatement of the topic."
    }

    fn input_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("topic", FieldType::String).with_description("The subject to brainstorm about"),
            FieldSpec::new("context", FieldType::String)
                .with_description("Supporting context or constraints")
                .optional(),
            FieldSpec::new("num_ideas", FieldType::Integer)
                .with_description("How many distinct ideas to produce"),
        ]
    }

    fn output_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("index", FieldType::Integer).with_description("0-based position in the batch"),
            FieldSpec::new("title", FieldType::String).with_description("Short idea title"),
            FieldSpec::new("description", FieldType::String).with_description("One-paragraph description"),
            FieldSpec::new("key_features", FieldType::list(FieldType::String))
                .with_description("Notable features or differentiators"),
            FieldSpec::new("category", FieldType::String).with_description("A short category label"),
        ]
    }
}

/// Build the full prompt for a Generator call.
pub fn prompt(inputs: &GeneratorInputs) -> String {
    let base = Generator::to_prompt(inputs);
    finalize_prompt(base)
}

fn idea_from_value(index: usize, value: &Value) -> Idea {
    serde_json::from_value(value.clone()).unwrap_or_else(|_| Idea {
        index: index as u32,
        title: "(unavailable)".to_string(),
        description: value
            .get("partial_text")
            .and_then(Value::as_str)
            .unwrap_or("generator response could not be parsed")
            .to_string(),
        key_features: Vec::new(),
        category: "unknown".to_string(),
    })
}

/// Generate exactly `inputs.num_ideas` ideas. Shortfalls are padded by the
/// Router's batch parser and converted here into placeholder ideas.
pub async fn call_batch(
    router: &Router,
    inputs: &GeneratorInputs,
    temperature: f64,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<Idea>> {
    let text = prompt(inputs);
    let schema = Generator::output_fields();
    let (items, _tokens) = router
        .generate_structured_batch(
            &text,
            "Generator@1",
            &schema,
            inputs.num_ideas as usize,
            temperature,
            cancellation,
        )
        .await?;
    Ok(items
        .iter()
        .enumerate()
        .map(|(i, v)| idea_from_value(i, v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_language_and_topic() {
        let inputs = GeneratorInputs {
            topic: "urban beekeeping".to_string(),
            context: String::new(),
            num_ideas: 5,
        };
        let text = prompt(&inputs);
        assert!(text.contains("urban beekeeping"));
        assert!(text.contains("## Language"));
    }

    #[test]
    fn idea_from_value_falls_back_on_sentinel() {
        let sentinel = serde_json::json!({"error": "parse_shortfall", "partial_text": "oops"});
        let idea = idea_from_value(2, &sentinel);
        assert_eq!(idea.index, 2);
        assert_eq!(idea.description, "oops");
    }
}
