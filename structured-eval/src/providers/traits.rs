//! Model-calling capability used by the runner and by judging benchmarks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Shape descriptor for structured decoding.
///
/// `schema` is a JSON Schema object; `name` identifies it to providers that
/// require a named schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Names of the properties the schema marks as required
    pub fn required_fields(&self) -> Vec<&str> {
        self.schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Something that can answer a prompt with a value matching a schema.
///
/// Implementations are injected into the runner; the runner treats every
/// error opaquely as "this call failed" and never retries.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    /// Provider or model identifier used in logs and summaries
    fn name(&self) -> &str;

    /// Produce a structured value for `prompt` conforming to `schema`
    async fn produce_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> ProviderResult<Value>;
}
