//! Evaluation items and the completion-ordered result collection

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::benchmarks::{Evaluation, Example};
use crate::error::{EvalError, EvalResult};

/// Metadata key holding the failure text of an errored item
pub const ERROR_KEY: &str = "error";

/// One unit of evaluation work and its result.
///
/// Serialized field order is fixed, so a record written, read back and
/// written again is byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationItem<R> {
    pub item_id: String,
    /// Links variants of the same question; `None` when ungrouped
    pub group_id: Option<String>,
    pub example: Example,
    pub prompt: String,
    /// Error text and per-item provenance such as `shuffle_id`
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub parsed_response: Option<R>,
    pub evaluation: Option<Evaluation>,
}

impl<R> EvaluationItem<R> {
    /// Create an unpopulated item
    pub fn new(
        item_id: impl Into<String>,
        group_id: Option<String>,
        example: Example,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            group_id,
            example,
            prompt: prompt.into(),
            metadata: Map::new(),
            parsed_response: None,
            evaluation: None,
        }
    }

    /// Failure text, if the item errored
    pub fn error(&self) -> Option<&str> {
        self.metadata.get(ERROR_KEY).and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.metadata.contains_key(ERROR_KEY)
    }

    pub(crate) fn record_error(&mut self, error: impl Display) {
        self.metadata
            .insert(ERROR_KEY.to_string(), Value::String(error.to_string()));
    }
}

/// Finished items in the order they completed.
///
/// Append-only; a `group_id` index is maintained on every `add` so grouped
/// lookups do not scan the whole collection.
#[derive(Debug, Clone)]
pub struct EvaluationResults<R> {
    items: Vec<EvaluationItem<R>>,
    groups: IndexMap<String, Vec<usize>>,
}

impl<R> Default for EvaluationResults<R> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            groups: IndexMap::new(),
        }
    }
}

impl<R> EvaluationResults<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished item
    pub fn add(&mut self, item: EvaluationItem<R>) {
        if let Some(group_id) = &item.group_id {
            self.groups
                .entry(group_id.clone())
                .or_default()
                .push(self.items.len());
        }
        self.items.push(item);
    }

    /// All items sharing `group_id`, in append order; empty for unknown groups
    pub fn get_by_group(&self, group_id: &str) -> Vec<&EvaluationItem<R>> {
        self.groups
            .get(group_id)
            .map(|indices| indices.iter().map(|&i| &self.items[i]).collect())
            .unwrap_or_default()
    }

    /// Group ids in order of first appearance
    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn items(&self) -> &[EvaluationItem<R>] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvaluationItem<R>> {
        self.items.iter()
    }

    /// Number of added items, failed ones included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_error()).count()
    }
}

impl<R: Serialize> EvaluationResults<R> {
    /// Write one JSON record per line, in append order
    pub fn write_jsonl<W: Write>(&self, writer: W) -> EvalResult<()> {
        let mut writer = BufWriter::new(writer);
        for item in &self.items {
            serde_json::to_writer(&mut writer, item)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the collection to `path` as JSONL, replacing any existing file
    pub fn persist(&self, path: impl AsRef<Path>) -> EvalResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_jsonl(file)
    }
}

impl<R: DeserializeOwned> EvaluationResults<R> {
    /// Rebuild a collection from JSONL records
    pub fn from_jsonl_str(content: &str) -> Result<Self, String> {
        let mut results = Self::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let item: EvaluationItem<R> =
                serde_json::from_str(line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
            results.add(item);
        }
        Ok(results)
    }

    /// Reload a persisted results file
    pub fn load_jsonl(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EvalError::dataset(path, format!("cannot read file: {}", e)))?;
        Self::from_jsonl_str(&content).map_err(|msg| EvalError::dataset(path, msg))
    }
}

impl<'a, R> IntoIterator for &'a EvaluationResults<R> {
    type Item = &'a EvaluationItem<R>;
    type IntoIter = std::slice::Iter<'a, EvaluationItem<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
