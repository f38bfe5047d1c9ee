use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shiftline::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "shiftline",
    version,
    about = "Shift-aware capacity scheduling for field service jobs",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to SHIFTLINE_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and optionally load workers
    InitDb {
        /// JSON file with an array of workers
        #[arg(short, long)]
        workers: Option<PathBuf>,
    },

    /// List bookable window starts
    Slots {
        /// Range start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Range end (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,

        /// Required skill (defaults to the configured default skill)
        #[arg(short, long)]
        skill: Option<String>,
    },

    /// Show workers and their tasks in a range
    Roster {
        /// Range start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Range end (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,
    },

    /// Allocate a job to a window, creating the job if needed
    Allocate {
        /// Job (process instance) id
        #[arg(short, long)]
        job: String,

        /// Device id, required when the job does not exist yet
        #[arg(short, long)]
        device: Option<String>,

        /// Requested window start (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,

        /// Required skill (defaults to the job's skill)
        #[arg(short, long)]
        skill: Option<String>,
    },

    /// Move a job to a new window
    Reschedule {
        /// Job id
        #[arg(short, long)]
        job: String,

        /// New window start (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,
    },

    /// Place a job in the first available window of the auto-schedule range
    AutoSchedule {
        /// Job id
        #[arg(short, long)]
        job: String,
    },

    /// Reconcile a bulk submission
    Batch {
        /// JSON file with an array of proposals
        #[arg(short, long)]
        file: PathBuf,

        /// Apply conflicting changes immediately
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(config.logging.format.as_str());
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = shiftline::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let print_metrics = cli.metrics;
    if let Err(e) = run(cli.command, config).await {
        if let Some((category, recoverable)) = shiftline::error::classify(&e) {
            tracing::error!(category = category.as_str(), recoverable, "{e:#}");
        }
        return Err(e);
    }

    if print_metrics {
        let text = shiftline::metrics::encode_metrics()
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
        print!("{text}");
    }

    Ok(())
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::InitDb { workers } => {
            tracing::info!(workers = ?workers, "Starting init-db command");
            commands::init_db(&config, workers.as_deref()).await?;
        }

        Commands::Slots { from, to, skill } => {
            tracing::info!(from = %from, to = %to, skill = ?skill, "Starting slots command");
            commands::slots(config, from, to, skill).await?;
        }

        Commands::Roster { from, to } => {
            tracing::info!(from = %from, to = %to, "Starting roster command");
            commands::roster(config, from, to).await?;
        }

        Commands::Allocate {
            job,
            device,
            at,
            skill,
        } => {
            tracing::info!(job = %job, device = ?device, at = %at, "Starting allocate command");
            commands::allocate(config, job, device, at, skill).await?;
        }

        Commands::Reschedule { job, at } => {
            tracing::info!(job = %job, at = %at, "Starting reschedule command");
            commands::reschedule(config, job, at).await?;
        }

        Commands::AutoSchedule { job } => {
            tracing::info!(job = %job, "Starting auto-schedule command");
            commands::auto_schedule(config, job).await?;
        }

        Commands::Batch { file, confirm } => {
            tracing::info!(file = %file.display(), confirm, "Starting batch command");
            commands::batch(config, &file, confirm).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("shiftline=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("shiftline={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
