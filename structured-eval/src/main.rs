//! Structured-output evaluation CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use structured_eval::{
    analysis::{AccuracySummary, GroupSummary, NullPolicy, VoteSummary},
    benchmarks::{
        gsm8k::gold_answer, robust_items, sampled_items, Benchmark, Example, Gsm8kBenchmark,
        JudgedQaBenchmark, McqBenchmark, SAMPLE_ID_KEY,
    },
    config::Config,
    providers::create_provider,
    reporting::{print_console_report, RunSummary},
    results::EvaluationResults,
    runner::{EvaluationRunner, ProgressCallback, RunnerConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BenchmarkKind {
    /// Multiple-choice questions
    Mcq,
    /// Grade-school math word problems
    Gsm8k,
    /// Open questions graded by a judge model
    Qa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// One item per example
    Baseline,
    /// Shuffled-option variants per example (mcq only)
    Robust,
    /// Format-strict grading (gsm8k only)
    Strict,
    /// Majority vote over repeated samples (gsm8k only)
    SelfConsistency,
}

impl BenchmarkKind {
    fn as_str(&self) -> &'static str {
        match self {
            BenchmarkKind::Mcq => "mcq",
            BenchmarkKind::Gsm8k => "gsm8k",
            BenchmarkKind::Qa => "qa",
        }
    }
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Robust => "robust",
            Mode::Strict => "strict",
            Mode::SelfConsistency => "self-consistency",
        }
    }
}

#[derive(Parser)]
#[command(name = "structured-eval")]
#[command(about = "Evaluate LLMs on benchmarks using structured outputs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark and write per-item results as JSONL
    Run {
        #[arg(value_enum)]
        benchmark: BenchmarkKind,

        #[arg(value_enum)]
        mode: Mode,

        /// Dataset file (JSONL)
        input: PathBuf,

        /// Results file (JSONL)
        output: PathBuf,

        /// Maximum number of items in flight
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Shuffled variants per question in robust mode
        #[arg(long)]
        num_shuffles: Option<usize>,

        /// Seed for option shuffling
        #[arg(long)]
        seed: Option<u64>,

        /// Samples per question in self-consistency mode
        #[arg(long)]
        samples: Option<usize>,

        /// Bound on each model and judge call, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Also write a JSON run summary to this path
        #[arg(long)]
        summary: Option<PathBuf>,

        /// How errored items enter accuracy
        #[arg(long)]
        null_policy: Option<NullPolicy>,
    },

    /// Summarize an existing results file
    Analyze {
        /// Results file (JSONL)
        input: PathBuf,

        /// How errored items enter accuracy
        #[arg(long)]
        null_policy: Option<NullPolicy>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/eval.toml")]
        output: PathBuf,
    },
}

/// Progress bar driven by runner callbacks
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_start(&self, benchmark: &str, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message(format!("Evaluating {}...", benchmark));
    }

    fn on_item_complete(&self, _item_id: &str, success: bool) {
        if !success {
            self.bar.set_message("(some failures)");
        }
    }

    fn on_progress(&self, completed: usize, total: usize) {
        self.bar.set_position(completed as u64);
        if completed == total {
            self.bar.finish_with_message("Complete");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("structured_eval=debug,info")
    } else {
        EnvFilter::new("structured_eval=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            benchmark,
            mode,
            input,
            output,
            max_parallel,
            num_shuffles,
            seed,
            samples,
            timeout_ms,
            summary,
            null_policy,
        } => {
            let mut config = config;
            if let Some(n) = max_parallel {
                config.runner.max_parallel = n;
            }
            if let Some(k) = num_shuffles {
                config.runner.num_shuffles = k;
            }
            if let Some(s) = seed {
                config.runner.seed = s;
            }
            if let Some(n) = samples {
                config.runner.samples = n;
            }
            if timeout_ms.is_some() {
                config.runner.call_timeout_ms = timeout_ms;
            }
            if let Some(policy) = null_policy {
                config.runner.null_policy = policy;
            }
            run_benchmark(&config, benchmark, mode, &input, &output, summary.as_deref()).await?;
        }

        Commands::Analyze { input, null_policy } => {
            analyze_results(&input, null_policy.unwrap_or(config.runner.null_policy))?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

async fn run_benchmark(
    config: &Config,
    benchmark: BenchmarkKind,
    mode: Mode,
    input: &Path,
    output: &Path,
    summary_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let supported = matches!(
        (benchmark, mode),
        (BenchmarkKind::Mcq, Mode::Baseline)
            | (BenchmarkKind::Mcq, Mode::Robust)
            | (BenchmarkKind::Gsm8k, Mode::Baseline)
            | (BenchmarkKind::Gsm8k, Mode::Strict)
            | (BenchmarkKind::Gsm8k, Mode::SelfConsistency)
            | (BenchmarkKind::Qa, Mode::Baseline)
    );
    if !supported {
        eprintln!(
            "Error: unsupported combination {} {}",
            benchmark.as_str(),
            mode.as_str()
        );
        std::process::exit(1);
    }

    println!("=== Structured Eval ===");
    println!("Benchmark: {} ({})", benchmark.as_str(), mode.as_str());
    println!("Model:     {}", config.provider.model);
    println!("Input:     {}", input.display());
    println!();

    let model = create_provider(config)?;
    let runner_config = RunnerConfig::from(&config.runner);
    let runner = EvaluationRunner::new(model.clone(), runner_config)
        .with_progress(Arc::new(BarProgress::new()?));

    let report = Report {
        config,
        benchmark,
        mode,
        output,
        summary_path,
    };

    match (benchmark, mode) {
        (BenchmarkKind::Mcq, Mode::Robust) => {
            let bench = Arc::new(McqBenchmark::new());
            let examples = bench.load(input)?;
            let items = robust_items(
                bench.as_ref(),
                &examples,
                config.runner.num_shuffles,
                config.runner.seed,
            );
            println!(
                "{} questions x {} shuffles",
                examples.len(),
                config.runner.num_shuffles
            );
            let results = runner.run_items(bench, items, Some(output)).await?;
            report.emit(&results, View::Grouped)?;
        }
        (BenchmarkKind::Mcq, _) => {
            let results = runner
                .run_benchmark(Arc::new(McqBenchmark::new()), input, Some(output))
                .await?;
            report.emit(&results, View::Plain)?;
        }
        (BenchmarkKind::Gsm8k, Mode::SelfConsistency) => {
            let bench = Arc::new(Gsm8kBenchmark::new());
            let examples = bench.load(input)?;
            let items = sampled_items(bench.as_ref(), &examples, config.runner.samples);
            println!(
                "{} questions x {} samples",
                examples.len(),
                config.runner.samples
            );
            let results = runner.run_items(bench, items, Some(output)).await?;
            report.emit(&results, View::Voted)?;
        }
        (BenchmarkKind::Gsm8k, Mode::Strict) => {
            let results = runner
                .run_benchmark(Arc::new(Gsm8kBenchmark::strict()), input, Some(output))
                .await?;
            report.emit(&results, View::Plain)?;
        }
        (BenchmarkKind::Gsm8k, _) => {
            let results = runner
                .run_benchmark(Arc::new(Gsm8kBenchmark::new()), input, Some(output))
                .await?;
            report.emit(&results, View::Plain)?;
        }
        (BenchmarkKind::Qa, _) => {
            let results = runner
                .run_benchmark(Arc::new(JudgedQaBenchmark::new(model)), input, Some(output))
                .await?;
            report.emit(&results, View::Plain)?;
        }
    }

    Ok(())
}

/// Extra summaries attached to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Plain,
    /// Shuffled variants grouped per question
    Grouped,
    /// Samples voted per question
    Voted,
}

/// Gold answer of a GSM8K record, as vote text
fn gsm8k_gold(example: &Example) -> Option<String> {
    gold_answer(example).ok().map(|g| g.to_string())
}

/// What a finished run is reported as
struct Report<'a> {
    config: &'a Config,
    benchmark: BenchmarkKind,
    mode: Mode,
    output: &'a Path,
    summary_path: Option<&'a Path>,
}

impl Report<'_> {
    fn emit<R: serde::Serialize>(
        &self,
        results: &EvaluationResults<R>,
        view: View,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let policy = self.config.runner.null_policy;
        let mut run = RunSummary::new(
            self.benchmark.as_str(),
            self.mode.as_str(),
            self.config.provider.model.as_str(),
            policy,
            AccuracySummary::from_results(results, policy),
            self.output.display().to_string(),
        );
        match view {
            View::Plain => {}
            View::Grouped => run = run.with_groups(GroupSummary::from_results(results, policy)),
            View::Voted => {
                run = run.with_votes(VoteSummary::from_results(results, "final_answer", gsm8k_gold))
            }
        }

        print_console_report(&run);

        if let Some(path) = self.summary_path {
            run.write_to_file(path)?;
            println!("Summary written to: {}", path.display());
        }
        Ok(())
    }
}

fn analyze_results(input: &Path, policy: NullPolicy) -> Result<(), Box<dyn std::error::Error>> {
    let results = EvaluationResults::<serde_json::Value>::load_jsonl(input)?;
    let grouped = results
        .group_ids()
        .any(|group| results.get_by_group(group).len() > 1);

    let name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());

    let mut run = RunSummary::new(
        name,
        "analyze",
        "unknown",
        policy,
        AccuracySummary::from_results(&results, policy),
        input.display().to_string(),
    );
    let sampled = results
        .iter()
        .any(|item| item.metadata.contains_key(SAMPLE_ID_KEY));
    if sampled {
        run = run.with_votes(VoteSummary::from_results(&results, "final_answer", gsm8k_gold));
    } else if grouped {
        run = run.with_groups(GroupSummary::from_results(&results, policy));
    }

    print_console_report(&run);
    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

