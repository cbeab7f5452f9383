//! Bounded-concurrency evaluation runner

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use super::progress::{NoOpProgress, ProgressCallback};
use crate::benchmarks::{example_id, Benchmark, Example};
use crate::config::RunnerSettings;
use crate::error::{EvalError, EvalResult};
use crate::providers::{ProviderError, StructuredModel};
use crate::results::{EvaluationItem, EvaluationResults};

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of units in flight at once
    pub max_parallel: usize,
    /// Bound on each model call and each judge call of a unit
    pub call_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            call_timeout: None,
        }
    }
}

impl From<&RunnerSettings> for RunnerConfig {
    fn from(settings: &RunnerSettings) -> Self {
        Self {
            max_parallel: settings.max_parallel,
            call_timeout: settings.call_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Drives a benchmark against a model with at most `max_parallel` units in
/// flight. Per-item failures are recorded on the item and never abort the run.
pub struct EvaluationRunner {
    model: Arc<dyn StructuredModel>,
    config: RunnerConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl EvaluationRunner {
    /// Create a new runner; `max_parallel` below 1 is raised to 1
    pub fn new(model: Arc<dyn StructuredModel>, mut config: RunnerConfig) -> Self {
        if config.max_parallel == 0 {
            tracing::warn!("max_parallel of 0 requested, using 1");
            config.max_parallel = 1;
        }
        Self {
            model,
            config,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Report completions to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Load `dataset_path`, evaluate one item per example and, when
    /// `output_path` is given, write the results there as JSONL.
    ///
    /// Only dataset and output-file errors are returned; item failures end up
    /// in the returned collection.
    pub async fn run_benchmark<B: Benchmark>(
        &self,
        benchmark: Arc<B>,
        dataset_path: impl AsRef<Path>,
        output_path: Option<&Path>,
    ) -> EvalResult<EvaluationResults<B::Response>> {
        let examples = benchmark.load(dataset_path.as_ref())?;
        let items = prepare_items(benchmark.as_ref(), examples);
        self.run_items(benchmark, items, output_path).await
    }

    /// Evaluate pre-built items, e.g. augmented variants
    pub async fn run_items<B: Benchmark>(
        &self,
        benchmark: Arc<B>,
        items: Vec<EvaluationItem<B::Response>>,
        output_path: Option<&Path>,
    ) -> EvalResult<EvaluationResults<B::Response>> {
        // create the output before any model call so a bad path fails early
        let output = output_path.map(std::fs::File::create).transpose()?;

        let total = items.len();
        tracing::info!(
            "Evaluating {} items of {} with max_parallel={}",
            total,
            benchmark.name(),
            self.config.max_parallel
        );
        self.progress.on_start(benchmark.name(), total);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(
            items,
            benchmark.clone(),
            self.model.clone(),
            Arc::new(Semaphore::new(self.config.max_parallel)),
            self.config.call_timeout,
            tx,
        ));

        let mut results = EvaluationResults::new();
        while let Some(item) = rx.recv().await {
            self.progress.on_item_complete(&item.item_id, !item.is_error());
            results.add(item);
            self.progress.on_progress(results.len(), total);
        }

        if let Err(e) = dispatcher.await {
            tracing::error!("Dispatcher task failed: {}", e);
        }
        if results.len() != total {
            tracing::error!("{} of {} items were lost", total - results.len(), total);
        }

        tracing::info!(
            "Finished {}: {} items, {} errors",
            benchmark.name(),
            results.len(),
            results.error_count()
        );

        if let Some(file) = output {
            results.write_jsonl(file)?;
            if let Some(path) = output_path {
                tracing::info!("Results written to {}", path.display());
            }
        }

        Ok(results)
    }
}

/// Build one item per example, keyed by the example's `id`.
///
/// Prompts are formatted here, before any model call; an example that cannot
/// be formatted becomes an errored item that is never dispatched.
pub fn prepare_items<B: Benchmark>(
    benchmark: &B,
    examples: Vec<Example>,
) -> Vec<EvaluationItem<B::Response>> {
    examples
        .into_iter()
        .enumerate()
        .map(|(idx, example)| {
            let id = example_id(&example).unwrap_or_else(|| format!("item_{}", idx));
            prepare_item(benchmark, example, id.clone(), Some(id))
        })
        .collect()
}

/// Build a single item, recording a format failure on it instead of failing
pub fn prepare_item<B: Benchmark>(
    benchmark: &B,
    example: Example,
    item_id: String,
    group_id: Option<String>,
) -> EvaluationItem<B::Response> {
    match benchmark.format_prompt(&example) {
        Ok(prompt) => EvaluationItem::new(item_id, group_id, example, prompt),
        Err(e) => {
            tracing::warn!("Could not format prompt for {}: {}", item_id, e);
            let mut item = EvaluationItem::new(item_id, group_id, example, String::new());
            item.record_error(e);
            item
        }
    }
}

/// Admit items one at a time, in submission order, as permits free up
async fn dispatch<B: Benchmark>(
    items: Vec<EvaluationItem<B::Response>>,
    benchmark: Arc<B>,
    model: Arc<dyn StructuredModel>,
    semaphore: Arc<Semaphore>,
    call_timeout: Option<Duration>,
    tx: mpsc::UnboundedSender<EvaluationItem<B::Response>>,
) {
    for item in items {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!("Admission semaphore closed, stopping dispatch");
                break;
            }
        };

        // already failed at formatting; still takes its turn so order holds
        if item.is_error() {
            let _ = tx.send(item);
            drop(permit);
            continue;
        }

        let benchmark = benchmark.clone();
        let model = model.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let item = run_unit(model.as_ref(), benchmark.as_ref(), item, call_timeout).await;
            // hand the item over before freeing the slot
            let _ = tx.send(item);
            drop(permit);
        });
    }
}

/// Prompt, then judge, one item. Never fails: errors land in `metadata.error`.
///
/// A model-call failure leaves both `parsed_response` and `evaluation` empty.
/// A judge failure keeps the decoded `parsed_response` and leaves only
/// `evaluation` empty, so persisted records can carry a response next to an
/// error.
async fn run_unit<B: Benchmark>(
    model: &dyn StructuredModel,
    benchmark: &B,
    mut item: EvaluationItem<B::Response>,
    call_timeout: Option<Duration>,
) -> EvaluationItem<B::Response> {
    tracing::debug!("Starting {}", item.item_id);

    let produced = isolate(bounded(
        call_timeout,
        produce_response::<B>(model, benchmark, &item.prompt),
    ))
    .await;

    let response = match produced {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Item {} failed: {}", item.item_id, e);
            item.record_error(e);
            return item;
        }
    };

    let judged = isolate(bounded(call_timeout, benchmark.evaluate(&response, &item.example))).await;
    item.parsed_response = Some(response);

    match judged {
        Ok(evaluation) => item.evaluation = Some(evaluation),
        Err(e) => {
            tracing::warn!("Evaluation of {} failed: {}", item.item_id, e);
            item.record_error(e);
        }
    }
    item
}

async fn produce_response<B: Benchmark>(
    model: &dyn StructuredModel,
    benchmark: &B,
    prompt: &str,
) -> EvalResult<B::Response> {
    let schema = benchmark.response_schema();
    let value = model.produce_structured(prompt, &schema).await?;

    if let Some(missing) = schema
        .required_fields()
        .into_iter()
        .find(|field| value.get(field).is_none())
    {
        return Err(EvalError::ModelCall(ProviderError::Parse(format!(
            "response does not match schema: missing required field '{}'",
            missing
        ))));
    }
    serde_json::from_value(value).map_err(|e| {
        EvalError::ModelCall(ProviderError::Parse(format!(
            "response does not match schema: {}",
            e
        )))
    })
}

async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> EvalResult<T>
where
    F: Future<Output = EvalResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| {
                Err(EvalError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })
            }),
        None => fut.await,
    }
}

/// Turn a panic inside `fut` into an error for this unit only
async fn isolate<T, F>(fut: F) -> EvalResult<T>
where
    F: Future<Output = EvalResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(EvalError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::McqBenchmark;
    use serde_json::json;

    fn mcq(value: serde_json::Value) -> Example {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_prepare_items_ids() {
        let examples = vec![
            mcq(json!({"id": "q1", "question": "?", "options": ["a", "b"], "answer_idx": 0})),
            mcq(json!({"question": "?", "options": ["a", "b"], "answer_idx": 1})),
            mcq(json!({"id": 3, "question": "?", "options": ["a", "b"], "answer_idx": 1})),
        ];
        let items = prepare_items(&McqBenchmark::new(), examples);

        assert_eq!(items[0].item_id, "q1");
        assert_eq!(items[0].group_id.as_deref(), Some("q1"));
        assert_eq!(items[1].item_id, "item_1");
        assert_eq!(items[2].item_id, "3");
        assert!(items.iter().all(|i| !i.prompt.is_empty() && !i.is_error()));
    }

    #[test]
    fn test_format_failure_becomes_item_error() {
        let examples = vec![mcq(json!({"id": "broken", "options": ["a", "b"], "answer_idx": 0}))];
        let items = prepare_items(&McqBenchmark::new(), examples);

        assert_eq!(items.len(), 1);
        assert!(items[0].error().unwrap().contains("prompt format error"));
        assert!(items[0].parsed_response.is_none());
    }

    #[test]
    fn test_zero_parallel_is_raised() {
        struct Never;
        #[async_trait::async_trait]
        impl StructuredModel for Never {
            fn name(&self) -> &str {
                "never"
            }
            async fn produce_structured(
                &self,
                _prompt: &str,
                _schema: &crate::providers::ResponseSchema,
            ) -> crate::providers::ProviderResult<serde_json::Value> {
                Err(ProviderError::Config("unused".into()))
            }
        }

        let runner = EvaluationRunner::new(
            Arc::new(Never),
            RunnerConfig {
                max_parallel: 0,
                call_timeout: None,
            },
        );
        assert_eq!(runner.config().max_parallel, 1);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, EvalError>(1)
        };
        let err = bounded(Some(Duration::from_millis(10)), slow).await.unwrap_err();
        assert!(matches!(err, EvalError::Timeout { timeout_ms: 10 }));
    }

    #[tokio::test]
    async fn test_isolate_catches_panic() {
        let err = isolate(async {
            if true {
                panic!("kaboom");
            }
            Ok::<u8, EvalError>(0)
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "unit panicked: kaboom");
    }
}
