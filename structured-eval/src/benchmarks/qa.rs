//! Open-ended question answering graded by an LLM judge
//!
//! Records look like `{"id": "...", "question": "...", "reference": "..."}`.
//! Judging suspends on a second structured call to an injected judge model,
//! so a judge failure is an evaluation error, never a wrong answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;

use super::{loader, require_str, Benchmark, Evaluation, Example};
use crate::error::{EvalError, EvalResult};
use crate::providers::{ResponseSchema, StructuredModel};

const DEFAULT_TEMPLATE: &str = "Answer the following question concisely.

Question:
{question}";

const JUDGE_INSTRUCTION: &str = "You are an expert evaluator comparing a predicted answer to a reference answer.

Decide whether the predicted answer is semantically correct: it conveys the same essential information as the reference, even if worded differently.
- Focus on meaning, not exact wording
- Case and punctuation differences don't matter
- Partial answers that contain the key information are correct";

/// Structured response for open questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResponse {
    pub answer: String,
}

/// Structured output requested from the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Whether the predicted answer is semantically correct
    pub correct: bool,
    /// Brief reasoning for the judgment
    pub reasoning: String,
}

impl JudgeVerdict {
    pub fn schema() -> ResponseSchema {
        ResponseSchema::new(
            "judge_verdict",
            json!({
                "type": "object",
                "properties": {
                    "correct": {
                        "type": "boolean",
                        "description": "True if the predicted answer is semantically correct"
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "Brief explanation of why the answer is correct or incorrect"
                    }
                },
                "required": ["correct", "reasoning"],
                "additionalProperties": false
            }),
        )
    }

    fn into_evaluation(self) -> Evaluation {
        let mut fields = Map::new();
        fields.insert("correct".to_string(), Value::Bool(self.correct));
        fields.insert("reasoning".to_string(), Value::String(self.reasoning));
        Evaluation::Structured(fields)
    }
}

/// Judged QA benchmark with a structured outcome
pub struct JudgedQaBenchmark {
    judge: Arc<dyn StructuredModel>,
    template: String,
}

impl JudgedQaBenchmark {
    pub fn new(judge: Arc<dyn StructuredModel>) -> Self {
        Self {
            judge,
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Use a custom template with a `{question}` placeholder
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn validate(example: &Example) -> Result<(), String> {
        for field in ["question", "reference"] {
            example
                .get(field)
                .and_then(Value::as_str)
                .ok_or_else(|| format!("missing string field '{}'", field))?;
        }
        Ok(())
    }

    fn judge_prompt(question: &str, reference: &str, predicted: &str) -> String {
        format!(
            "{}\n\nQuestion: {}\n\nReference: {}\n\nPredicted: {}\n\nIs the predicted answer semantically correct?",
            JUDGE_INSTRUCTION, question, reference, predicted
        )
    }
}

#[async_trait]
impl Benchmark for JudgedQaBenchmark {
    type Response = QaResponse;

    fn name(&self) -> &str {
        "qa"
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
            "qa_response",
            json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "string", "description": "Concise answer to the question"}
                },
                "required": ["answer"],
                "additionalProperties": false
            }),
        )
    }

    async fn evaluate(&self, response: &QaResponse, example: &Example) -> EvalResult<Evaluation> {
        let question = require_str(example, "question")
            .map_err(|e| EvalError::Evaluation(e.to_string()))?;
        let reference = require_str(example, "reference")
            .map_err(|e| EvalError::Evaluation(e.to_string()))?;

        let prompt = Self::judge_prompt(question, reference, &response.answer);
        let raw = self
            .judge
            .produce_structured(&prompt, &JudgeVerdict::schema())
            .await
            .map_err(|e| EvalError::Evaluation(format!("judge call failed: {}", e)))?;

        let verdict: JudgeVerdict = serde_json::from_value(raw)
            .map_err(|e| EvalError::Evaluation(format!("malformed judge output: {}", e)))?;

        Ok(verdict.into_evaluation())
    }
}
