//! Results reporting

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{AccuracySummary, GroupSummary, NullPolicy, VoteSummary};

/// JSON summary of one run, written next to the results file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: String,
    pub benchmark: String,
    pub mode: String,
    pub model: String,
    pub null_policy: NullPolicy,
    pub summary: AccuracySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<GroupSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<VoteSummary>,
    pub results_file: String,
}

impl RunSummary {
    /// Stamp a summary with a fresh run id and the current time
    pub fn new(
        benchmark: impl Into<String>,
        mode: impl Into<String>,
        model: impl Into<String>,
        null_policy: NullPolicy,
        summary: AccuracySummary,
        results_file: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            run_id: now.format("%Y%m%d-%H%M%S").to_string(),
            timestamp: now.to_rfc3339(),
            benchmark: benchmark.into(),
            mode: mode.into(),
            model: model.into(),
            null_policy,
            summary,
            groups: None,
            votes: None,
            results_file: results_file.into(),
        }
    }

    pub fn with_groups(mut self, groups: GroupSummary) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn with_votes(mut self, votes: VoteSummary) -> Self {
        self.votes = Some(votes);
        self
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Generate a console report
pub fn print_console_report(run: &RunSummary) {
    let s = &run.summary;

    println!("\n=== {} ({}) Results ===\n", run.benchmark, run.mode);
    println!("Model:   {}", run.model);
    println!("Results: {}", run.results_file);
    println!("Policy:  {}\n", run.null_policy);

    println!("Accuracy:");
    println!("{:-<50}", "");
    println!(
        "  {:.3} ({}/{})  95% CI [{:.3}, {:.3}]",
        s.accuracy, s.correct, s.scored, s.ci_low, s.ci_high
    );
    println!(
        "  Items: {}, errored: {} ({:.1}%), ungradable: {}",
        s.total,
        s.errored,
        s.error_rate * 100.0,
        s.ungradable
    );
    if s.reject_rate > 0.0 {
        println!("  Rejected: {:.1}%", s.reject_rate * 100.0);
    }

    if let Some(groups) = &run.groups {
        println!("\nRobustness ({} groups):", groups.groups.len());
        println!("{:-<50}", "");
        println!("  Mean group accuracy: {:.3}", groups.mean_accuracy);
        println!("  All variants correct: {:.1}%", groups.all_correct_fraction * 100.0);
        println!(
            "  Majority correct:     {:.1}%",
            groups.majority_correct_fraction * 100.0
        );
        println!("  Variance:             {:.4}", groups.accuracy_variance);
        if let Some(worst) = &groups.worst {
            println!(
                "  Worst group: {} ({}/{})",
                worst.group_id, worst.correct, worst.scored
            );
        }
        if !groups.per_position.is_empty() {
            println!("  By gold position:");
            for (pos, acc) in &groups.per_position {
                println!(
                    "    {}: {:.3} ({}/{})",
                    position_label(*pos),
                    acc.accuracy,
                    acc.correct,
                    acc.scored
                );
            }
        }
    }

    if let Some(votes) = &run.votes {
        println!("\nSelf-consistency ({} questions):", votes.total);
        println!("{:-<50}", "");
        println!(
            "  Voted accuracy: {:.3} ({}/{})  95% CI [{:.3}, {:.3}]",
            votes.accuracy, votes.correct, votes.total, votes.ci_low, votes.ci_high
        );
    }

    println!("\n{:=<50}", "");
}

fn position_label(pos: usize) -> String {
    u8::try_from(pos)
        .ok()
        .filter(|p| *p < 26)
        .map(|p| char::from(b'A' + p).to_string())
        .unwrap_or_else(|| pos.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::{Evaluation, Example};
    use crate::results::{EvaluationItem, EvaluationResults};

    fn results() -> EvaluationResults<serde_json::Value> {
        let mut results = EvaluationResults::new();
        for (id, ok) in [("a", true), ("b", false)] {
            let mut item = EvaluationItem::new(id, Some(id.to_string()), Example::new(), "p");
            item.evaluation = Some(Evaluation::Binary(ok));
            results.add(item);
        }
        results
    }

    #[test]
    fn test_summary_written_as_json() {
        let results = results();
        let run = RunSummary::new(
            "mcq",
            "robust",
            "grok-beta",
            NullPolicy::CountAsWrong,
            AccuracySummary::from_results(&results, NullPolicy::CountAsWrong),
            "out.jsonl",
        )
        .with_groups(GroupSummary::from_results(&results, NullPolicy::CountAsWrong));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        run.write_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["benchmark"], "mcq");
        assert_eq!(value["null_policy"], "count-as-wrong");
        assert_eq!(value["summary"]["accuracy"], 0.5);
        assert_eq!(value["groups"]["groups"].as_array().unwrap().len(), 2);
        assert!(chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_groups_omitted_when_absent() {
        let run = RunSummary::new(
            "gsm8k",
            "baseline",
            "m",
            NullPolicy::Exclude,
            AccuracySummary::from_results(&results(), NullPolicy::Exclude),
            "out.jsonl",
        );
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("groups").is_none());
    }

    #[test]
    fn test_votes_serialized_when_present() {
        let mut results = EvaluationResults::<serde_json::Value>::new();
        let mut item = EvaluationItem::new("p#sample0", Some("p".to_string()), Example::new(), "p");
        item.example.insert("answer".into(), serde_json::json!("4"));
        item.parsed_response = Some(serde_json::json!({"final_answer": 4}));
        results.add(item);

        let votes = VoteSummary::from_results(&results, "final_answer", |ex| {
            ex.get("answer").and_then(|v| v.as_str()).map(String::from)
        });
        let run = RunSummary::new(
            "gsm8k",
            "self-consistency",
            "m",
            NullPolicy::Exclude,
            AccuracySummary::from_results(&results, NullPolicy::Exclude),
            "out.jsonl",
        )
        .with_votes(votes);

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["votes"]["correct"], 1);
        assert_eq!(json["votes"]["groups"][0]["voted"], "4");
    }

    #[test]
    fn test_position_label() {
        assert_eq!(position_label(0), "A");
        assert_eq!(position_label(3), "D");
        assert_eq!(position_label(30), "30");
    }
}
