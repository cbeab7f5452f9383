//! GSM8K math word-problem benchmark
//!
//! Records look like `{"id": "p1", "question": "...", "answer": "42"}`; the
//! gold answer may be an integer or an integer-valued string and an optional
//! `solution` is carried through untouched.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

use super::{
    loader, require_str, Benchmark, Evaluation, Example, CATEGORY_CORRECT, CATEGORY_INCORRECT,
    CATEGORY_REJECTED,
};
use crate::error::{EvalError, EvalResult};
use crate::providers::ResponseSchema;

const DEFAULT_TEMPLATE: &str = "Solve the following math word problem. Think step by step, then provide the final numeric answer.

{question}

Provide your reasoning and the final answer.";

const STRICT_TEMPLATE: &str = "Solve the following math word problem. Think step by step, then provide the final numeric answer.

{question}

Provide your reasoning and the final answer. Your reasoning must end with a line of the form 'Final Answer: <integer>'.";

const FINAL_ANSWER_PATTERN: &str = r"(?i)Final Answer:\s*([+-]?[0-9]+)";
const STRICT_FINAL_ANSWER_PATTERN: &str = r"(?i)Final Answer:\s*([+-]?[0-9]+)\s*\.?\s*$";

/// Structured response for GSM8K problems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gsm8kResponse {
    /// Step-by-step solution process
    pub reasoning: String,
    /// The numeric answer to the problem
    pub final_answer: i64,
}

/// GSM8K benchmark.
///
/// The default grading is binary. Strict grading additionally requires the
/// reasoning to end with `Final Answer: <int>` matching `final_answer`, and
/// grades into `correct` / `incorrect` / `rejected`.
#[derive(Debug, Clone)]
pub struct Gsm8kBenchmark {
    template: String,
    strict: bool,
}

impl Default for Gsm8kBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

impl Gsm8kBenchmark {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            strict: false,
        }
    }

    /// Format-strict grading with its matching prompt
    pub fn strict() -> Self {
        Self {
            template: STRICT_TEMPLATE.to_string(),
            strict: true,
        }
    }

    /// Use a custom template with a `{question}` placeholder
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    fn validate(example: &Example) -> Result<(), String> {
        example
            .get("question")
            .and_then(Value::as_str)
            .ok_or("missing string field 'question'")?;
        gold_answer(example).map(|_| ())
    }
}

/// Gold answer of an example as an integer
pub fn gold_answer(example: &Example) -> Result<i64, String> {
    match example.get("answer") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| format!("answer {} is not an integer", n)),
        Some(Value::String(s)) => s
            .trim()
            .replace(',', "")
            .parse::<i64>()
            .map_err(|_| format!("answer '{}' is not an integer", s)),
        Some(_) => Err("'answer' must be an integer or a string".to_string()),
        None => Err("missing field 'answer'".to_string()),
    }
}

/// Extract the integer after `Final Answer:` anywhere in `text`
pub fn parse_final_answer(text: &str) -> Option<i64> {
    let re = Regex::new(FINAL_ANSWER_PATTERN).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Extract the integer from a `Final Answer:` line that ends `text`
fn parse_trailing_final_answer(text: &str) -> Option<i64> {
    let re = Regex::new(STRICT_FINAL_ANSWER_PATTERN).ok()?;
    re.captures(text.trim_end())?.get(1)?.as_str().parse().ok()
}

#[async_trait]
impl Benchmark for Gsm8kBenchmark {
    type Response = Gsm8kResponse;

    fn name(&self) -> &str {
        if self.strict {
            "gsm8k_strict"
        } else {
            "gsm8k"
        }
    }

    fn load(&self, path: &Path) -> EvalResult<Vec<Example>> {
        loader::read_jsonl(path, Self::validate)
    }

    fn format_prompt(&self, example: &Example) -> EvalResult<String> {
        let question = require_str(example, "question")?;
        Ok(self.template.replace("{question}", question))
    }

    fn response_schema(&self) -> ResponseSchema {
        ResponseSchema::new(
            "gsm8k_response",
            json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": "Step-by-step solution process"
                    },
                    "final_answer": {
                        "type": "integer",
                        "description": "The numeric answer to the problem"
                    }
                },
                "required": ["reasoning", "final_answer"],
                "additionalProperties": false
            }),
        )
    }

    async fn evaluate(&self, response: &Gsm8kResponse, example: &Example) -> EvalResult<Evaluation> {
        let gold = gold_answer(example).map_err(EvalError::Evaluation)?;
        let correct = response.final_answer == gold;

        if !self.strict {
            return Ok(Evaluation::Binary(correct));
        }

        let label = match parse_trailing_final_answer(&response.reasoning) {
            Some(stated) if stated == response.final_answer => {
                if correct {
                    CATEGORY_CORRECT
                } else {
                    CATEGORY_INCORRECT
                }
            }
            _ => CATEGORY_REJECTED,
        };
        Ok(Evaluation::Category(label.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(answer: Value) -> Example {
        serde_json::from_value(json!({
            "id": "p1",
            "question": "Janet has 3 apples and buys 4 more. How many does she have?",
            "answer": answer
        }))
        .unwrap()
    }

    fn response(reasoning: &str, final_answer: i64) -> Gsm8kResponse {
        Gsm8kResponse {
            reasoning: reasoning.to_string(),
            final_answer,
        }
    }

    #[test]
    fn test_gold_answer_forms() {
        assert_eq!(gold_answer(&example(json!("7"))), Ok(7));
        assert_eq!(gold_answer(&example(json!(7))), Ok(7));
        assert_eq!(gold_answer(&example(json!("1,200"))), Ok(1200));
        assert!(gold_answer(&example(json!("seven"))).is_err());
        assert!(gold_answer(&example(json!(7.5))).is_err());
    }

    #[test]
    fn test_parse_final_answer() {
        assert_eq!(parse_final_answer("3 + 4 = 7\nFinal Answer: 7"), Some(7));
        assert_eq!(parse_final_answer("final answer: -12 apples"), Some(-12));
        assert_eq!(parse_final_answer("the answer is 7"), None);
    }

    #[test]
    fn test_format_prompt() {
        let prompt = Gsm8kBenchmark::new().format_prompt(&example(json!("7"))).unwrap();
        assert!(prompt.contains("Janet has 3 apples"));
        assert!(!prompt.contains("{question}"));

        let strict = Gsm8kBenchmark::strict().format_prompt(&example(json!("7"))).unwrap();
        assert!(strict.contains("Final Answer: <integer>"));
    }

    #[tokio::test]
    async fn test_evaluate_binary() {
        let bench = Gsm8kBenchmark::new();
        let ex = example(json!("7"));
        assert_eq!(
            bench.evaluate(&response("3+4", 7), &ex).await.unwrap(),
            Evaluation::Binary(true)
        );
        assert_eq!(
            bench.evaluate(&response("3+4", 8), &ex).await.unwrap(),
            Evaluation::Binary(false)
        );
    }

    #[tokio::test]
    async fn test_evaluate_strict() {
        let bench = Gsm8kBenchmark::strict();
        let ex = example(json!(7));

        let graded = |r: Gsm8kResponse| {
            let bench = bench.clone();
            let ex = ex.clone();
            async move { bench.evaluate(&r, &ex).await.unwrap() }
        };

        assert_eq!(
            graded(response("3 + 4 = 7\nFinal Answer: 7", 7)).await,
            Evaluation::Category("correct".into())
        );
        assert_eq!(
            graded(response("3 + 5 = 8\nFinal Answer: 8", 8)).await,
            Evaluation::Category("incorrect".into())
        );
        // missing the closing line
        assert_eq!(
            graded(response("3 + 4 = 7", 7)).await,
            Evaluation::Category("rejected".into())
        );
        // line disagrees with the structured field
        assert_eq!(
            graded(response("Final Answer: 6", 7)).await,
            Evaluation::Category("rejected".into())
        );
    }

    #[tokio::test]
    async fn test_evaluate_without_gold_is_an_error() {
        let mut ex = example(json!("7"));
        ex.remove("answer");
        let err = Gsm8kBenchmark::new()
            .evaluate(&response("", 7), &ex)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Evaluation(_)));
    }

    #[test]
    fn test_names() {
        assert_eq!(Gsm8kBenchmark::new().name(), "gsm8k");
        assert_eq!(Gsm8kBenchmark::strict().name(), "gsm8k_strict");
        assert!(Gsm8kBenchmark::strict().is_strict());
    }
}
