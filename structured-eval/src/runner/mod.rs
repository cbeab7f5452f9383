//! Evaluation execution engine

pub mod executor;
pub mod progress;

pub use executor::{prepare_item, prepare_items, EvaluationRunner, RunnerConfig};
pub use progress::{ConsoleProgress, NoOpProgress, ProgressCallback};
