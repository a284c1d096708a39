use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use microyield::config::EngineConfig;
use microyield::corpus::read_synthetic_jsonl;
use microyield::daily_log::DailyLog;
use microyield::seed::SeedProfile;
use microyield::{RetrainTrigger, YieldEngine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "microyield", about = "Microgreens yield prediction engine")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the synthetic bootstrap corpus (JSON lines, once)
    ImportSynthetic {
        /// One `{seed_type, <features>, final_yield}` object per line
        path: PathBuf,
    },
    /// Retrain and promote now, regardless of the trigger
    Train,
    /// Show the active version, corpus size and retrain state
    Status,
    /// Predict the yield of a crop in progress
    Predict {
        /// Seed profile (JSON file)
        #[arg(long)]
        seed: PathBuf,
        /// Daily logs (JSON array file)
        #[arg(long)]
        logs: PathBuf,
        /// Number of trays
        #[arg(long, default_value_t = 1)]
        units: u32,
    },
    /// Record a completed harvest
    RecordHarvest {
        /// Seed profile (JSON file)
        #[arg(long)]
        seed: PathBuf,
        /// Daily logs (JSON array file)
        #[arg(long)]
        logs: PathBuf,
        /// Harvested grams for one tray
        #[arg(long = "yield")]
        final_yield: f64,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir.clone_from(dir);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    microyield::logging::init(cli.verbose);

    let engine = YieldEngine::open(load_config(&cli)?).context("failed to open engine")?;

    match cli.command {
        Commands::ImportSynthetic { path } => {
            let file =
                File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
            let samples = read_synthetic_jsonl(BufReader::new(file))?;
            let count = engine.import_synthetic(samples)?;
            println!("imported {count} synthetic samples");
        }
        Commands::Train => {
            let outcome = engine.retrain_now()?;
            println!("promoted {}", outcome.version);
            print_json(&outcome.report)?;
        }
        Commands::Status => print_json(&engine.status()?)?,
        Commands::Predict { seed, logs, units } => {
            let seed: SeedProfile = read_json(&seed)?;
            let logs: Vec<DailyLog> = read_json(&logs)?;
            print_json(&engine.predict_or_degraded(&seed, &logs, units)?)?;
        }
        Commands::RecordHarvest {
            seed,
            logs,
            final_yield,
        } => {
            let seed: SeedProfile = read_json(&seed)?;
            let logs: Vec<DailyLog> = read_json(&logs)?;
            let receipt = engine.record_harvest(&seed, &logs, final_yield).await?;
            println!("recorded harvest ({} real samples)", receipt.real_samples);
            match receipt.retrain {
                RetrainTrigger::NotDue {
                    new_samples,
                    threshold,
                } => println!("retrain not due ({new_samples}/{threshold} new samples)"),
                RetrainTrigger::AlreadyRunning => println!("retrain already running"),
                RetrainTrigger::CheckFailed(reason) => {
                    println!("could not evaluate retrain trigger: {reason}");
                }
                // The process would exit under a background retrain, so wait for it here.
                RetrainTrigger::Scheduled(handle) => match handle.wait().await {
                    Ok(outcome) => println!("retrained and promoted {}", outcome.version),
                    Err(e) => println!("retrain failed, active model unchanged: {e}"),
                },
            }
        }
    }

    Ok(())
}
