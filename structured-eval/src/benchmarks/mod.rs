//! Benchmark definitions
//!
//! A [`Benchmark`] owns everything dataset-specific: how examples are read,
//! how a prompt is built, which response shape the model must produce and how
//! that response is judged. The runner only ever sees this trait.

pub mod augment;
pub mod gsm8k;
pub mod loader;
pub mod mcq;
pub mod qa;

pub use augment::{robust_items, sampled_items, shuffle_options, SAMPLE_ID_KEY};
pub use gsm8k::{parse_final_answer, Gsm8kBenchmark, Gsm8kResponse};
pub use loader::read_jsonl;
pub use mcq::{McqBenchmark, McqResponse};
pub use qa::{JudgeVerdict, JudgedQaBenchmark, QaResponse};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::EvalResult;
use crate::providers::ResponseSchema;

/// A raw dataset record. Its schema belongs to the benchmark that loaded it.
pub type Example = Map<String, Value>;

/// Outcome of judging one response.
///
/// Each variant serializes to its natural JSON form: a boolean, a string, or
/// an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Evaluation {
    /// Right or wrong
    Binary(bool),
    /// One label out of a fixed set, e.g. `correct` / `incorrect` / `rejected`
    Category(String),
    /// Multi-field judgement, e.g. a verdict with the judge's reasoning
    Structured(Map<String, Value>),
}

pub const CATEGORY_CORRECT: &str = "correct";
pub const CATEGORY_INCORRECT: &str = "incorrect";
pub const CATEGORY_REJECTED: &str = "rejected";

impl Evaluation {
    /// Map the outcome onto correctness, when it has a meaning there
    pub fn is_correct(&self) -> Option<bool> {
        match self {
            Evaluation::Binary(b) => Some(*b),
            Evaluation::Category(label) => Some(label == CATEGORY_CORRECT),
            Evaluation::Structured(fields) => fields.get("correct").and_then(Value::as_bool),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Evaluation::Category(label) if label == CATEGORY_REJECTED)
    }
}

/// A pluggable evaluation task.
///
/// `evaluate` is async for every benchmark so the runner can drive judges
/// that call a model the same way as plain comparisons.
#[async_trait]
pub trait Benchmark: Send + Sync + 'static {
    /// Structured response the model is asked to produce
    type Response: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Lowercase identifier (e.g. `mcq`, `gsm8k`)
    fn name(&self) -> &str;

    /// Read every example in `path`, failing on the first malformed record
    fn load(&self, path: &Path) -> EvalResult<Vec<Example>>;

    /// Build the prompt for one example
    fn format_prompt(&self, example: &Example) -> EvalResult<String>;

    /// Schema the model must answer in
    fn response_schema(&self) -> ResponseSchema;

    /// Judge `response` against the gold answer in `example`.
    ///
    /// Returns `Err(EvalError::Evaluation)` when judging itself could not
    /// complete; a wrong answer is `Ok` with a negative outcome.
    async fn evaluate(&self, response: &Self::Response, example: &Example)
        -> EvalResult<Evaluation>;
}

/// Identifier of an example: its `id` field as text, if present
pub fn example_id(example: &Example) -> Option<String> {
    match example.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fetch a required string field, for prompt formatting
pub(crate) fn require_str<'a>(example: &'a Example, field: &str) -> EvalResult<&'a str> {
    example
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::error::EvalError::Format(format!("missing string field '{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluation_natural_encoding() {
        assert_eq!(serde_json::to_string(&Evaluation::Binary(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&Evaluation::Category("rejected".into())).unwrap(),
            "\"rejected\""
        );

        let mut fields = Map::new();
        fields.insert("correct".into(), json!(false));
        fields.insert("reasoning".into(), json!("off by one"));
        assert_eq!(
            serde_json::to_string(&Evaluation::Structured(fields)).unwrap(),
            r#"{"correct":false,"reasoning":"off by one"}"#
        );
    }

    #[test]
    fn test_evaluation_decodes_to_same_variant() {
        let binary: Evaluation = serde_json::from_str("false").unwrap();
        assert_eq!(binary, Evaluation::Binary(false));

        let category: Evaluation = serde_json::from_str("\"correct\"").unwrap();
        assert_eq!(category, Evaluation::Category("correct".into()));

        let structured: Evaluation = serde_json::from_str(r#"{"correct":true}"#).unwrap();
        assert!(matches!(structured, Evaluation::Structured(_)));
    }

    #[test]
    fn test_is_correct() {
        assert_eq!(Evaluation::Binary(true).is_correct(), Some(true));
        assert_eq!(Evaluation::Category("correct".into()).is_correct(), Some(true));
        assert_eq!(Evaluation::Category("rejected".into()).is_correct(), Some(false));
        assert!(Evaluation::Category("rejected".into()).is_rejected());

        let mut fields = Map::new();
        fields.insert("score".into(), json!(3));
        assert_eq!(Evaluation::Structured(fields).is_correct(), None);
    }

    #[test]
    fn test_example_id() {
        let text: Example = serde_json::from_value(json!({"id": "q1"})).unwrap();
        let number: Example = serde_json::from_value(json!({"id": 17})).unwrap();
        let missing: Example = serde_json::from_value(json!({"question": "?"})).unwrap();

        assert_eq!(example_id(&text).as_deref(), Some("q1"));
        assert_eq!(example_id(&number).as_deref(), Some("17"));
        assert_eq!(example_id(&missing), None);
    }
}
