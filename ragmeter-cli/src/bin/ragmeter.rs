use clap::{Parser, Subcommand};
use ragmeter_cli::config::{parse_output_type, partial_show_secret, resolve_api_key, ConfigError};
use ragmeter_core::aggregate;
use ragmeter_core::config::EvalConfig;
use ragmeter_core::error::{AggregateError, EvalError};
use ragmeter_core::pipeline::EvalPipeline;
use ragmeter_core::report::RunSummary;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "RAG evaluation runner and aggregator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Judge API key (overrides the env var named in the config)
    #[arg(long, short = 'k', env = "RAGMETER_API_KEY", global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation against the configured backend
    Run(RunArgs),

    /// Aggregate historical runs into a longitudinal report
    Aggregate(AggregateArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Artifact types to write (json, csv, html); defaults to the config
    #[arg(long = "output-type")]
    output_types: Vec<String>,

    /// Also grade the labeled judge-validation set
    #[arg(long)]
    run_judge_validation: bool,
}

#[derive(Parser)]
struct AggregateArgs {
    /// Directory containing run subdirectories with summary.json files
    #[arg(long, default_value = "eval_outputs")]
    eval_results_dir: PathBuf,

    /// Output directory for the store, report and charts
    #[arg(long, default_value = "docs")]
    output_dir: PathBuf,

    /// Remote index base URL; when set, summaries are fetched instead
    /// of read from eval-results-dir
    #[arg(long)]
    source_url: Option<String>,

    /// Maximum number of remote runs to fetch
    #[arg(long, default_value_t = 10)]
    max_runs: usize,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

fn print_summary(summary: &RunSummary) {
    println!("\n{}", "=".repeat(60));
    println!("Evaluation Run: {}", summary.run.evaluation_run_name);
    println!("{}", "=".repeat(60));
    for (metric, stats) in &summary.metrics {
        println!(
            "{metric}: mean={:.4} std={:.4} median={:.4} ci=[{:.4}, {:.4}]",
            stats.mean, stats.std, stats.median, stats.ci_lower, stats.ci_upper
        );
    }
    if let Some(validation) = &summary.judge_validation {
        println!("\nJudge Validation ({})", validation.judge_model);
        println!("  Samples: {}", validation.n_samples);
        match validation.accuracy_vs_human {
            Some(accuracy) => println!("  Accuracy vs Human: {accuracy:.4}"),
            None => println!("  Accuracy vs Human: N/A (no human scores available)"),
        }
    }
    println!("{}\n", "=".repeat(60));
}

async fn run_evaluation(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = EvalConfig::from_file(&cli.config)?;

    if !args.output_types.is_empty() {
        config.outputs.types = args
            .output_types
            .iter()
            .map(|t| parse_output_type(t))
            .collect::<Result<_, _>>()?;
    }
    if !args.run_judge_validation {
        config.judge_validation = None;
    }

    let api_key = resolve_api_key(cli.api_key.clone(), &config.judge.api_key_env)?;
    debug!(api_key = %partial_show_secret(&api_key), "resolved judge credentials");
    std::env::set_var(&config.judge.api_key_env, api_key.expose_secret());

    info!(run_name = %config.run.evaluation_run_name, "starting evaluation");
    let summary = EvalPipeline::from_config(config)?.run().await?;
    print_summary(&summary);
    Ok(())
}

async fn run_aggregation(args: &AggregateArgs) -> Result<(), CliError> {
    let outcome = match &args.source_url {
        Some(url) => aggregate::aggregate_remote_results(url, args.max_runs, &args.output_dir).await?,
        None => aggregate::aggregate_local_results(&args.eval_results_dir, &args.output_dir)?,
    };
    println!(
        "Aggregated {} run(s); report: {}",
        outcome.num_runs,
        outcome.report_path.display()
    );
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Run(args) => run_evaluation(cli, args).await,
        Commands::Aggregate(args) => run_aggregation(args).await,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
