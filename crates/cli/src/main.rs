//! Vegcast command line interface
//!
//! One subcommand per pipeline stage, `run` for stages 1-4 in order and
//! `train` for the boosted-tree model.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vegcast_pipeline::{
    engineer_market, engineer_weather, merge, preprocess_market, preprocess_weather, run_all, split_market,
    split_weather, PipelineConfig, SplitRole, StageReport,
};
use vegcast_trainer::{train_crop, TrainJob, TrainingParams};

#[derive(Parser)]
#[command(name = "vegcast")]
#[command(about = "Leakage-free feature pipeline and trainer for vegetable price forecasting", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Crop label used in every file name
    #[arg(long, global = true)]
    crop: Option<String>,

    /// Root of the data layout (raw_data/, processed_data/)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Process files one at a time
    #[arg(long, global = true)]
    sequential: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut the raw market table into season files
    SplitMarket,
    /// Cut every weather station file into season files
    SplitWeather,
    /// Collapse market seasons to one row per date
    PreprocessMarket,
    /// Average station readings to one row per date
    PreprocessWeather,
    /// Derive lagged market features
    EngineerMarket,
    /// Derive lagged weather features
    EngineerWeather,
    /// Join market and weather features and write train/valid/test
    Merge,
    /// Run every stage from split to merge
    Run,
    /// Train the forecasting model on the merged splits
    Train(TrainCommand),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct TrainCommand {
    /// Output directory for model, hash, predictions and metrics
    #[arg(short, long, default_value = "models")]
    output: PathBuf,

    /// Number of boosting trees
    #[arg(long, default_value = "300")]
    trees: usize,

    /// Maximum tree depth
    #[arg(long, default_value = "6")]
    max_depth: usize,

    /// Minimum samples per leaf
    #[arg(long, default_value = "20")]
    min_samples_leaf: usize,

    /// Learning rate
    #[arg(long, default_value = "0.05")]
    learning_rate: f64,

    /// Split candidates per feature and node
    #[arg(long, default_value = "64")]
    max_thresholds: usize,

    /// Stop after this many rounds without validation improvement (0 = never)
    #[arg(long, default_value = "30")]
    early_stopping_rounds: usize,
}

impl TrainCommand {
    fn params(&self) -> TrainingParams {
        TrainingParams {
            num_trees: self.trees,
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            learning_rate: self.learning_rate,
            max_thresholds: self.max_thresholds,
            early_stopping_rounds: self.early_stopping_rounds,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.verbose, std::env::var("RUST_LOG").ok()))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::SplitMarket => report(split_market(&config).context("split-market failed")?),
        Commands::SplitWeather => report(split_weather(&config).context("split-weather failed")?),
        Commands::PreprocessMarket => report(preprocess_market(&config).context("preprocess-market failed")?),
        Commands::PreprocessWeather => report(preprocess_weather(&config).context("preprocess-weather failed")?),
        Commands::EngineerMarket => report(engineer_market(&config).context("engineer-market failed")?),
        Commands::EngineerWeather => report(engineer_weather(&config).context("engineer-weather failed")?),
        Commands::Merge => {
            let merged = merge(&config).context("merge failed")?;
            for role in SplitRole::ALL {
                info!("{}: seasons {:?}", role, merged.seasons(role));
            }
            report(merged.stage)
        }
        Commands::Run => {
            let summary = run_all(&config).context("pipeline run failed")?;
            for stage in &summary.stages {
                info!(
                    "{:<20} {:>4} written {:>4} skipped",
                    stage.stage,
                    stage.written.len(),
                    stage.skipped.len()
                );
            }
            report(summary.merge.stage)
        }
        Commands::Train(cmd) => train(&config, cmd),
        Commands::Config => {
            let toml = config.to_toml_string().context("Failed to serialize configuration")?;
            print!("{}", toml);
            Ok(())
        }
    }
}

/// `--verbose` forces debug output; otherwise `RUST_LOG` applies, then info.
fn log_filter(verbose: bool, rust_log: Option<String>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Configuration file (or defaults) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(root) = &cli.data_root {
        config = config.with_data_root(root);
    }
    if let Some(crop) = &cli.crop {
        config.crop = crop.clone();
    }
    if cli.sequential {
        config.parallel.enabled = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn report(stage: StageReport) -> Result<()> {
    info!(
        "[{}] {} file(s) written, {} unit(s) skipped",
        stage.stage,
        stage.written.len(),
        stage.skipped.len()
    );
    for label in &stage.skipped {
        warn!("[{}] skipped {}", stage.stage, label);
    }
    Ok(())
}

fn train(config: &PipelineConfig, cmd: &TrainCommand) -> Result<()> {
    info!("Vegcast trainer v{}", vegcast_trainer::VERSION);
    info!("═══════════════════════════════════════════");

    let job = TrainJob::from_pipeline(config, &cmd.output);
    let params = cmd.params();
    info!("Training configuration:");
    info!("  Trees: {}", params.num_trees);
    info!("  Max depth: {}", params.max_depth);
    info!("  Min samples per leaf: {}", params.min_samples_leaf);
    info!("  Learning rate: {}", params.learning_rate);
    info!("  Early stopping rounds: {}", params.early_stopping_rounds);

    let outcome = train_crop(&job, params)
        .with_context(|| format!("Training failed for crop {}", job.crop))?;

    let summary = serde_json::to_string_pretty(&outcome.test).context("Failed to serialize metrics")?;
    info!("═══════════════════════════════════════════");
    info!("✓ Training completed successfully");
    info!("  Trees: {}", outcome.trees);
    info!("  Model: {}", outcome.paths.model.display());
    info!("  Hash: {} ({})", outcome.paths.hash.display(), outcome.model_hash);
    info!("  Predictions: {}", outcome.paths.predictions.display());
    println!("{}", summary);
    Ok(())
}
