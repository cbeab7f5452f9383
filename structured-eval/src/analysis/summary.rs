//! Failure-aware aggregation over evaluation results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::metrics::{majority_vote, wilson_ci, Z_95};
use crate::benchmarks::{Example, SAMPLE_ID_KEY};
use crate::results::{EvaluationItem, EvaluationResults};

/// How items without a correctness outcome enter accuracy.
///
/// Such items are errored ones and ones whose evaluation has no notion of
/// correct (e.g. a structured verdict missing `correct`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NullPolicy {
    /// Leave them out of the denominator
    #[default]
    Exclude,
    /// Count them as wrong answers
    CountAsWrong,
}

impl NullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NullPolicy::Exclude => "exclude",
            NullPolicy::CountAsWrong => "count-as-wrong",
        }
    }
}

impl fmt::Display for NullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NullPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclude" => Ok(NullPolicy::Exclude),
            "count-as-wrong" | "count_as_wrong" => Ok(NullPolicy::CountAsWrong),
            other => Err(format!(
                "unknown null policy '{}', expected exclude or count-as-wrong",
                other
            )),
        }
    }
}

fn outcome<R>(item: &EvaluationItem<R>) -> Option<bool> {
    item.evaluation.as_ref().and_then(|e| e.is_correct())
}

/// Tally of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub total: usize,
    /// Denominator of `accuracy` under the chosen policy
    pub scored: usize,
    pub correct: usize,
    pub errored: usize,
    /// Completed without error but carrying no correctness outcome
    pub ungradable: usize,
    pub accuracy: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Share of all items graded `rejected`
    pub reject_rate: f64,
    pub error_rate: f64,
}

impl AccuracySummary {
    pub fn from_results<R>(results: &EvaluationResults<R>, policy: NullPolicy) -> Self {
        let total = results.len();
        let mut graded = 0;
        let mut correct = 0;
        let mut errored = 0;
        let mut ungradable = 0;
        let mut rejected = 0;

        for item in results {
            if item.is_error() {
                errored += 1;
                continue;
            }
            if item.evaluation.as_ref().is_some_and(|e| e.is_rejected()) {
                rejected += 1;
            }
            match outcome(item) {
                Some(ok) => {
                    graded += 1;
                    if ok {
                        correct += 1;
                    }
                }
                None => ungradable += 1,
            }
        }

        let scored = match policy {
            NullPolicy::Exclude => graded,
            NullPolicy::CountAsWrong => total,
        };
        let accuracy = ratio(correct, scored);
        let (ci_low, ci_high) = wilson_ci(accuracy, scored, Z_95);

        Self {
            total,
            scored,
            correct,
            errored,
            ungradable,
            accuracy,
            ci_low,
            ci_high,
            reject_rate: ratio(rejected, total),
            error_rate: ratio(errored, total),
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Accuracy of one group of variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAccuracy {
    pub group_id: String,
    pub items: usize,
    pub scored: usize,
    pub correct: usize,
    /// `None` when nothing in the group could be scored
    pub accuracy: Option<f64>,
}

/// Accuracy of items whose gold option sits at one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAccuracy {
    pub scored: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// Robustness view over grouped items, e.g. shuffled variants of a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub groups: Vec<GroupAccuracy>,
    /// Mean of the per-group accuracies that exist
    pub mean_accuracy: f64,
    /// Population variance of the per-group accuracies
    pub accuracy_variance: f64,
    pub worst: Option<GroupAccuracy>,
    /// Groups answered correctly in every scored variant
    pub all_correct_fraction: f64,
    /// Groups where strictly more than half of the scored variants are
    /// correct; an even split is not a majority
    pub majority_correct_fraction: f64,
    /// Accuracy keyed by the gold option index (`answer_idx`) of each item
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_position: BTreeMap<usize, PositionAccuracy>,
}

impl GroupSummary {
    pub fn from_results<R>(results: &EvaluationResults<R>, policy: NullPolicy) -> Self {
        let mut groups = Vec::new();
        let mut all_correct = 0;
        let mut majority_correct = 0;
        let mut positions: BTreeMap<usize, (usize, usize)> = BTreeMap::new();

        for group_id in results.group_ids() {
            let members = results.get_by_group(group_id);
            let mut scored = 0;
            let mut correct = 0;

            for item in &members {
                let ok = match (outcome(item), policy) {
                    (Some(ok), _) => ok,
                    (None, NullPolicy::CountAsWrong) => false,
                    (None, NullPolicy::Exclude) => continue,
                };
                scored += 1;
                if ok {
                    correct += 1;
                }
                if let Some(pos) = item.example.get("answer_idx").and_then(Value::as_u64) {
                    let slot = positions.entry(pos as usize).or_default();
                    slot.0 += 1;
                    if ok {
                        slot.1 += 1;
                    }
                }
            }

            if scored > 0 && correct == scored {
                all_correct += 1;
            }
            if correct * 2 > scored {
                majority_correct += 1;
            }

            groups.push(GroupAccuracy {
                group_id: group_id.to_string(),
                items: members.len(),
                scored,
                correct,
                accuracy: (scored > 0).then(|| ratio(correct, scored)),
            });
        }

        let accuracies: Vec<f64> = groups.iter().filter_map(|g| g.accuracy).collect();
        let (mean_accuracy, accuracy_variance) = mean_and_variance(&accuracies);
        let worst = groups
            .iter()
            .filter(|g| g.accuracy.is_some())
            .min_by(|a, b| {
                a.accuracy
                    .partial_cmp(&b.accuracy)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();

        let per_position = positions
            .into_iter()
            .map(|(pos, (scored, correct))| {
                (
                    pos,
                    PositionAccuracy {
                        scored,
                        correct,
                        accuracy: ratio(correct, scored),
                    },
                )
            })
            .collect();

        Self {
            all_correct_fraction: ratio(all_correct, groups.len()),
            majority_correct_fraction: ratio(majority_correct, groups.len()),
            groups,
            mean_accuracy,
            accuracy_variance,
            worst,
            per_position,
        }
    }
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// Majority-voted answer of one group of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupVote {
    pub group_id: String,
    /// Parsed answers in sample order; failed or unparsed samples are absent
    pub votes: Vec<String>,
    pub voted: Option<String>,
    pub gold: Option<String>,
    pub correct: bool,
}

/// Self-consistency accuracy: one voted answer per group against the gold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub groups: Vec<GroupVote>,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl VoteSummary {
    /// Vote on the response field `field` within every group.
    ///
    /// Samples are ordered by `sample_id` (then `item_id`) before voting, so
    /// the tie-break does not depend on completion order. A group without
    /// any usable vote counts as wrong.
    pub fn from_results<R, G>(results: &EvaluationResults<R>, field: &str, gold_of: G) -> Self
    where
        R: Serialize,
        G: Fn(&Example) -> Option<String>,
    {
        let mut groups = Vec::new();

        for group_id in results.group_ids() {
            let mut members = results.get_by_group(group_id);
            members.sort_by_key(|item| {
                (
                    item.metadata.get(SAMPLE_ID_KEY).and_then(Value::as_u64),
                    item.item_id.clone(),
                )
            });

            let votes: Vec<String> = members
                .iter()
                .filter(|item| !item.is_error())
                .filter_map(|item| item.parsed_response.as_ref())
                .filter_map(|response| serde_json::to_value(response).ok())
                .filter_map(|value| value.get(field).and_then(vote_text))
                .collect();

            let voted = majority_vote(&votes);
            let gold = members.first().and_then(|item| gold_of(&item.example));
            let correct = matches!((&voted, &gold), (Some(v), Some(g)) if v == g);

            groups.push(GroupVote {
                group_id: group_id.to_string(),
                votes,
                voted,
                gold,
                correct,
            });
        }

        let total = groups.len();
        let correct = groups.iter().filter(|g| g.correct).count();
        let accuracy = ratio(correct, total);
        let (ci_low, ci_high) = wilson_ci(accuracy, total, Z_95);

        Self {
            groups,
            total,
            correct,
            accuracy,
            ci_low,
            ci_high,
        }
    }
}

fn vote_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}
