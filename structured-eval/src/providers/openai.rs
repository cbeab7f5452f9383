//! OpenAI-compatible chat-completions client with structured outputs
//!
//! Works against any endpoint that accepts `response_format` with a
//! `json_schema`; the defaults point at xAI's Grok API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use super::traits::{Message, ProviderError, ProviderResult, ResponseSchema, StructuredModel};
use crate::config::ProviderSettings;

/// Chat-completions client producing schema-constrained JSON
pub struct OpenAIClient {
    name: String,
    api_key: String,
    base_url: String,
    http_client: Client,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    timeout_ms: Option<u64>,
    system_prompt: Option<String>,
}

impl OpenAIClient {
    /// Create a client with default settings and an explicit API key
    pub fn new(api_key: String) -> Self {
        let settings = ProviderSettings::default();
        Self {
            name: settings.name,
            api_key,
            base_url: settings.base_url,
            http_client: Client::new(),
            model: settings.model,
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
            timeout_ms: None,
            system_prompt: None,
        }
    }

    /// Create from settings, reading the API key from `settings.api_key_env`
    pub fn from_settings(settings: &ProviderSettings) -> ProviderResult<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| ProviderError::Config(format!("{} not set", settings.api_key_env)))?;

        let mut client = Self::new(api_key)
            .with_base_url(settings.base_url.clone())
            .with_model(settings.model.clone())
            .with_temperature(settings.temperature)
            .with_timeout(Duration::from_millis(settings.timeout_ms))?;
        client.name = settings.name.clone();
        client.top_p = settings.top_p;
        client.max_tokens = settings.max_tokens;
        Ok(client)
    }

    /// Create from environment using default settings
    pub fn from_env() -> ProviderResult<Self> {
        Self::from_settings(&ProviderSettings::default())
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Bound every request; an expired request fails with `ProviderError::Timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> ProviderResult<Self> {
        self.http_client = Client::builder().timeout(timeout).build()?;
        self.timeout_ms = Some(timeout.as_millis() as u64);
        Ok(self)
    }

    /// Prepend a system message to every request
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn classify(&self, err: reqwest::Error) -> ProviderError {
        match self.timeout_ms {
            Some(timeout_ms) if err.is_timeout() => ProviderError::Timeout { timeout_ms },
            _ => ProviderError::Http(err),
        }
    }

    fn build_request(&self, prompt: &str, schema: &ResponseSchema) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt));

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: schema.name.clone(),
                    schema: schema.schema.clone(),
                    strict: true,
                },
            },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Decode the assistant content of a structured-output completion
fn decode_content(message: &ChoiceMessage) -> ProviderResult<Value> {
    if let Some(refusal) = &message.refusal {
        return Err(ProviderError::Parse(format!("model refused: {}", refusal)));
    }
    let content = message
        .content
        .as_deref()
        .ok_or_else(|| ProviderError::Parse("empty message content".to_string()))?;
    serde_json::from_str(content.trim())
        .map_err(|e| ProviderError::Parse(format!("invalid structured output: {}", e)))
}

#[async_trait]
impl StructuredModel for OpenAIClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> ProviderResult<Value> {
        let start = Instant::now();
        let body = self.build_request(prompt, schema);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse = response.json().await.map_err(|e| self.classify(e))?;
        let choice = api_response
            .choices
            .first()
            .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

        let value = decode_content(&choice.message)?;
        tracing::debug!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "structured completion received"
        );
        Ok(value)
    }
}
