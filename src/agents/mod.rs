//! Agent Functions (C4): typed per-role prompt builders bound to the
//! structured-output schema vocabulary from `crate::signature`.
//!
//! Every agent is a pair of pure functions — `prompt(inputs) -> String` and
//! `schema() -> Vec<FieldSpec>` — plus a thin `call`/`call_batch` that hands
//! both to a [`Router`](crate::llm::Router). None of them talk to a provider
//! directly; that stays the Router's job.

pub mod advocate;
pub mod critic;
pub mod dimension_evaluator;
pub mod generator;
pub mod improver;
pub mod logical_inference;
pub mod skeptic;
pub mod types;

pub use advocate::Advocate;
pub use critic::Critic;
pub use dimension_evaluator::DimensionEvaluator;
pub use generator::Generator;
pub use improver::Improver;
pub use logical_inference::LogicalInferenceEngine;
pub use skeptic::Skeptic;

/// Every agent prompt closes with the same two directives, applied uniformly
/// rather than hard-coded per agent: stay in the requester's language, and
/// respect the same content boundaries regardless of role.
fn finalize_prompt(mut prompt: String) -> String {
    prompt.push_str(LANGUAGE_DIRECTIVE);
    prompt.push_str(SAFETY_DIRECTIVE);
    prompt
}

const LANGUAGE_DIRECTIVE: &str = "\n\n## Language\n\nRespond in the same natural language as the input topic. If the topic is written in French, answer in French; if in Japanese, answer in Japanese; and so on.\n";

const SAFETY_DIRECTIVE: &str = "\n## Boundaries\n\nDecline to elaborate on ideas that are primarily about causing physical harm, building weapons, or inciting hatred; for any other topic, explore the idea space fully and honestly.\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_prompt_appends_both_directives_once() {
        let out = finalize_prompt("base".to_string());
        assert!(out.starts_with("base"));
        assert_eq!(out.matches("## Language").count(), 1);
        assert_eq!(out.matches("## Boundaries").count(), 1);
    }
}
