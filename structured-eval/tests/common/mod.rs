//! Shared test doubles for runner integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use structured_eval::providers::{ProviderError, ProviderResult, ResponseSchema, StructuredModel};

/// What the scripted model does for a matching prompt
#[derive(Clone)]
pub enum Step {
    Reply(Value),
    Fail,
    Panic,
    /// The n-th matching call gets the n-th step, the last one repeats
    Turns(Vec<Step>),
}

/// A model whose answers are chosen by substring match on the prompt.
///
/// Records the order calls started in and the largest number of calls
/// that were in flight at once.
pub struct ScriptedModel {
    rules: Vec<(String, Step, Duration)>,
    fallback: Step,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(fallback: Step) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::new(Step::Fail)
    }

    /// Answer `step` to prompts containing `needle`
    pub fn on(mut self, needle: &str, step: Step) -> Self {
        self.rules.push((needle.to_string(), step, Duration::ZERO));
        self
    }

    /// Like `on`, after sleeping for `delay`
    pub fn on_after(mut self, needle: &str, step: Step, delay: Duration) -> Self {
        self.rules.push((needle.to_string(), step, delay));
        self
    }

    /// Sleep this long in every call without its own delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn produce_structured(
        &self,
        prompt: &str,
        _schema: &ResponseSchema,
    ) -> ProviderResult<Value> {
        let (needle, step, delay) = self
            .rules
            .iter()
            .find(|(needle, _, _)| prompt.contains(needle.as_str()))
            .map(|(n, s, d)| (n.clone(), s.clone(), *d))
            .unwrap_or_else(|| (String::new(), self.fallback.clone(), Duration::ZERO));
        let delay = if delay.is_zero() { self.delay } else { delay };

        let step = {
            let mut started = self.started.lock().unwrap();
            let turn = started.iter().filter(|n| **n == needle).count();
            started.push(needle);
            match step {
                Step::Turns(steps) => steps
                    .get(turn)
                    .or_else(|| steps.last())
                    .cloned()
                    .unwrap_or(Step::Fail),
                other => other,
            }
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Step::Reply(value) => Ok(value),
            Step::Fail => Err(ProviderError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            }),
            Step::Panic => panic!("scripted panic"),
            Step::Turns(_) => unreachable!("turns are resolved above"),
        }
    }
}

/// Write `records` as a JSONL file inside `dir`
pub fn write_dataset(dir: &Path, name: &str, records: &[Value]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for record in records {
        writeln!(file, "{}", record).unwrap();
    }
    path
}

/// Parse every line of a JSONL output file
pub fn read_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
