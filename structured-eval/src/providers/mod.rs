//! Model provider implementations

pub mod openai;
pub mod traits;

pub use openai::OpenAIClient;
pub use traits::{Message, ProviderError, ProviderResult, ResponseSchema, StructuredModel};

use crate::config::Config;
use std::sync::Arc;

/// Create the configured structured-output provider
pub fn create_provider(config: &Config) -> ProviderResult<Arc<dyn StructuredModel>> {
    let client = OpenAIClient::from_settings(&config.provider)?;
    tracing::info!(
        "Using provider {} (model {})",
        config.provider.name,
        client.model()
    );
    Ok(Arc::new(client))
}
