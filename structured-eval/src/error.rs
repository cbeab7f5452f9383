//! Error taxonomy for evaluation runs

use std::path::PathBuf;

use crate::providers::ProviderError;

/// Errors raised while loading, prompting, calling the model or judging.
///
/// Only [`EvalError::Dataset`] and output-file [`EvalError::Io`] errors abort
/// a run. Everything raised after dispatch is caught at the item boundary and
/// recorded as text in the item's `metadata.error`.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("dataset error in {}: {message}", path.display())]
    Dataset { path: PathBuf, message: String },

    #[error("prompt format error: {0}")]
    Format(String),

    #[error("model call failed: {0}")]
    ModelCall(#[from] ProviderError),

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("unit panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvalError {
    pub fn dataset(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Dataset {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
