//! Option-order augmentation for multiple-choice robustness runs

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde_json::Value;

use super::{example_id, Benchmark, Example};
use crate::results::EvaluationItem;
use crate::runner::prepare_item;

/// Return a copy of `example` with its options permuted and `answer_idx`
/// pointing at the same option content.
///
/// Examples without an `options` list are returned unchanged.
pub fn shuffle_options(example: &Example, seed: u64) -> Example {
    let mut out = example.clone();
    let Some(options) = example.get("options").and_then(Value::as_array) else {
        return out;
    };
    let gold = example.get("answer_idx").and_then(Value::as_u64);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..options.len()).collect();
    order.shuffle(&mut rng);

    let shuffled: Vec<Value> = order.iter().map(|&i| options[i].clone()).collect();
    out.insert("options".to_string(), Value::Array(shuffled));

    if let Some(gold) = gold {
        if let Some(new_idx) = order.iter().position(|&old| old as u64 == gold) {
            out.insert("answer_idx".to_string(), Value::from(new_idx));
        }
    }
    out
}

/// Build `num_shuffles` shuffled variants per example.
///
/// Variants share the source example's id as `group_id`, get
/// `"{id}#shuffle{k}"` as `item_id` and record `shuffle_id` and the permutation
/// seed in their metadata.
pub fn robust_items<B: Benchmark>(
    benchmark: &B,
    examples: &[Example],
    num_shuffles: usize,
    seed: u64,
) -> Vec<EvaluationItem<B::Response>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut items = Vec::with_capacity(examples.len() * num_shuffles);

    for (idx, example) in examples.iter().enumerate() {
        let group_id = example_id(example).unwrap_or_else(|| format!("item_{}", idx));
        for k in 0..num_shuffles {
            let variant_seed = rng.next_u64();
            let variant = shuffle_options(example, variant_seed);
            let mut item = prepare_item(
                benchmark,
                variant,
                format!("{}#shuffle{}", group_id, k),
                Some(group_id.clone()),
            );
            item.metadata.insert("shuffle_id".to_string(), Value::from(k));
            item.metadata
                .insert("shuffle_seed".to_string(), Value::from(variant_seed));
            items.push(item);
        }
    }
    items
}

/// Build `samples` identical items per example for self-consistency voting.
///
/// Samples share the source example's id as `group_id`, get
/// `"{id}#sample{k}"` as `item_id` and record `sample_id` in their metadata.
pub fn sampled_items<B: Benchmark>(
    benchmark: &B,
    examples: &[Example],
    samples: usize,
) -> Vec<EvaluationItem<B::Response>> {
    let mut items = Vec::with_capacity(examples.len() * samples);
    for (idx, example) in examples.iter().enumerate() {
        let group_id = example_id(example).unwrap_or_else(|| format!("item_{}", idx));
        for k in 0..samples {
            let mut item = prepare_item(
                benchmark,
                example.clone(),
                format!("{}#sample{}", group_id, k),
                Some(group_id.clone()),
            );
            item.metadata.insert(SAMPLE_ID_KEY.to_string(), Value::from(k));
            items.push(item);
        }
    }
    items
}

/// Metadata key marking self-consistency samples
pub const SAMPLE_ID_KEY: &str = "sample_id";
