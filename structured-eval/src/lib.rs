//! Concurrent structured-output evaluation of LLMs
//!
//! This crate runs a model over a benchmark dataset, asks for answers in a
//! fixed JSON schema, judges every answer and persists one record per item.
//!
//! # Features
//!
//! - Multiple-choice, GSM8K (baseline and format-strict) and judge-graded QA
//!   benchmarks behind one [`benchmarks::Benchmark`] trait
//! - Bounded-concurrency runner where a failing item never aborts the run
//! - Option-shuffle augmentation for robustness runs
//! - Accuracy with Wilson intervals and per-group robustness summaries
//! - JSONL results and JSON run summaries
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use structured_eval::{
//!     benchmarks::McqBenchmark,
//!     providers::OpenAIClient,
//!     runner::{EvaluationRunner, RunnerConfig},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = Arc::new(OpenAIClient::from_env()?);
//!     let runner = EvaluationRunner::new(model, RunnerConfig::default());
//!
//!     let results = runner
//!         .run_benchmark(Arc::new(McqBenchmark::new()), "data/mcq.jsonl", None)
//!         .await?;
//!     println!("{} items, {} errors", results.len(), results.error_count());
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod benchmarks;
pub mod config;
pub mod error;
pub mod providers;
pub mod reporting;
pub mod results;
pub mod runner;

pub use config::Config;
pub use error::{EvalError, EvalResult};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{AccuracySummary, GroupSummary, NullPolicy};
    pub use crate::benchmarks::{
        Benchmark, Evaluation, Example, Gsm8kBenchmark, JudgedQaBenchmark, McqBenchmark,
    };
    pub use crate::config::Config;
    pub use crate::error::{EvalError, EvalResult};
    pub use crate::providers::{
        create_provider, ProviderError, ProviderResult, ResponseSchema, StructuredModel,
    };
    pub use crate::reporting::{print_console_report, RunSummary};
    pub use crate::results::{EvaluationItem, EvaluationResults};
    pub use crate::runner::{EvaluationRunner, ProgressCallback, RunnerConfig};
}
