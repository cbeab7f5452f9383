//! Multiple-choice question benchmark
//!
//! Records look like
//! `{"id": "q1", "question": "...", "options": ["..", ".."], "answer_idx": 2}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

use super::{loader, require_str, Benchmark, Evaluation, Example};
use crate::error::{EvalError, EvalResult};
use crate::providers::ResponseSchema;

const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const DEFAULT_TEMPLATE: &str = "You will be given a question and multiple answer options.
Choose the single best option and reply with the letter.

Question:
{question}

Options:
{options_block}

Reply with just the letter (A, B, C, ...).";

/// Structured response for multiple-choice questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqResponse {
    /// Single letter answer choice
    pub answer: String,
}

/// Multiple-choice benchmark with a binary outcome
#[derive(Debug, Clone)]
pub struct McqBenchmark {
    template: String,
}

impl Default for McqBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

impl McqBenchmark {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Use a custom template with `{question}` and `{options_block}` placeholders
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Validate one record; also used for shuffled variants
    pub fn validate(example: &Example) -> Result<(), String> {
        example
            .get("question")
            .and_then(Value::as_str)
            .ok_or("missing string field 'question'")?;
        let options = example
            .get("options")
            .and_then(Value::as_array)
            .ok_or("'options' must be a list")?;
        if options.len() < 2 {
            return Err(format!("expected at least 2 options, got {}", options.len()));
        }
        if options.len() > LETTERS.len() {
            return Err(format!("at most {} options are supported", LETTERS.len()));
        }
        if options.iter().any(|o| !o.is_string()) {
            return Err("every option must be a string".to_string());
        }
        let answer_idx = example
            .get("answer_idx")
            .and_then(Value::as_u64)
            .ok_or("'answer_idx' must be a non-negative integer")?;
        if answer_idx as usize >= options.len() {
            return Err(format!(
                "answer_idx {} out of range for {} options",
                answer_idx,
                options.len()
            ));
        }
        Ok(())
    }
}

/// Render options as `A. first\nB. second ...`
pub fn options_block(options: &[Value]) -> String {
    options
        .iter()
        .zip(LETTERS.chars())
        .map(|(opt, letter)| format!("{}. {}", letter, opt.as_str().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Position of an answer letter, if it is a single letter A-Z
pub fn letter_to_index(letter: &str) -> Option<usize> {
    let letter = letter.trim().to_uppercase();
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => LETTERS.find(c),
        _ => None,
    }
}

#[async_trait]
impl Benchmark for McqBenchmark {
    type Response = McqResponse;

    fn name(&self) -> &str {
        "mcq"
    }

    fn load(&self, path: &Path) -> EvalResult<Vec<Example>> {
        loader::read_jsonl(path, Self::validate)
    }

    fn format_prompt(&self, example: &Example) -> EvalResult<String> {
        let question = require_str(example, "question")?;
        let options = example
            .get("options")
            .and_then(Value::as_array)
            .ok_or_else(|| EvalError::Format("missing list field 'options'".to_string()))?;

        Ok(self
            .template
            .replace("{question}", question)
            .replace("{options_block}", &options_block(options)))
    }

    fn response_schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "mcq_response",
            json!({
                "type": "object",
                "properties": {
                    "answer": {
                        "type": "string",
                        "description": "Single letter answer choice (A, B, C, D, etc.)"
                    }
                },
                "required": ["answer"],
                "additionalProperties": false
            }),
        )
    }

    async fn evaluate(&self, response: &McqResponse, example: &Example) -> EvalResult<Evaluation> {
        let gold = example
            .get("answer_idx")
            .and_then(Value::as_u64)
            .ok_or_else(|| EvalError::Evaluation("example has no 'answer_idx'".to_string()))?;

        let correct = letter_to_index(&response.answer) == Some(gold as usize);
        Ok(Evaluation::Binary(correct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Example {
        serde_json::from_value(json!({
            "id": "q1",
            "question": "What is 2+2?",
            "options": ["3", "4", "5", "22"],
            "answer_idx": 1
        }))
        .unwrap()
    }

    #[test]
    fn test_format_prompt() {
        let prompt = McqBenchmark::new().format_prompt(&example()).unwrap();
        assert!(prompt.contains("What is 2+2?"));
        assert!(prompt.contains("A. 3\nB. 4\nC. 5\nD. 22"));
    }

    #[test]
    fn test_custom_template() {
        let bench = McqBenchmark::new().with_template("Q: {question}\n{options_block}");
        let prompt = bench.format_prompt(&example()).unwrap();
        assert_eq!(prompt, "Q: What is 2+2?\nA. 3\nB. 4\nC. 5\nD. 22");
    }

    #[test]
    fn test_format_prompt_missing_field() {
        let mut ex = example();
        ex.remove("question");
        assert!(matches!(
            McqBenchmark::new().format_prompt(&ex),
            Err(EvalError::Format(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(McqBenchmark::validate(&example()).is_ok());

        let mut one_option = example();
        one_option.insert("options".into(), json!(["only"]));
        assert!(McqBenchmark::validate(&one_option).is_err());

        let mut out_of_range = example();
        out_of_range.insert("answer_idx".into(), json!(4));
        assert!(McqBenchmark::validate(&out_of_range).is_err());

        let mut not_int = example();
        not_int.insert("answer_idx".into(), json!("1"));
        assert!(McqBenchmark::validate(&not_int).is_err());
    }

    #[test]
    fn test_letter_to_index() {
        assert_eq!(letter_to_index("A"), Some(0));
        assert_eq!(letter_to_index(" c "), Some(2));
        assert_eq!(letter_to_index("AB"), None);
        assert_eq!(letter_to_index(""), None);
        assert_eq!(letter_to_index("7"), None);
    }

    #[tokio::test]
    async fn test_evaluate() {
        let bench = McqBenchmark::new();
        let right = McqResponse { answer: "B".into() };
        let wrong = McqResponse { answer: "A".into() };
        let junk = McqResponse { answer: "maybe".into() };

        assert_eq!(bench.evaluate(&right, &example()).await.unwrap(), Evaluation::Binary(true));
        assert_eq!(bench.evaluate(&wrong, &example()).await.unwrap(), Evaluation::Binary(false));
        assert_eq!(bench.evaluate(&junk, &example()).await.unwrap(), Evaluation::Binary(false));
    }
}
