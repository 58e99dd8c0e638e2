//! CLI argument parsing and command dispatch

mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use streambench_core::{Profile, ProfileOverrides, ProfileResolver};

#[derive(Parser)]
#[command(name = "streambench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive load against a backend and report metrics
    Run {
        /// Which side of the broker to load
        #[arg(short, long, value_enum, default_value_t = Mode::Both)]
        mode: Mode,

        /// Print the final report as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Synthetic mode: per-operation latency in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,

        /// Synthetic mode: fraction of operations that fail
        #[arg(long, default_value_t = 0.0)]
        failure_ratio: f64,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// List built-in profiles
    Profiles,
    /// Resolve a configuration and print it as JSON
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Backend driven by `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Publish into the in-memory broker
    Produce,
    /// Drain a pre-filled in-memory broker
    Consume,
    /// Producers and consumers sharing one broker
    Both,
    /// Fixed-latency operation with no broker
    Synthetic,
}

/// Profile selection and command-line overrides
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Profile name (built in, or `<name>.json` in a profile directory)
    #[arg(short, long, env = "STREAMBENCH_PROFILE", default_value = "balanced")]
    pub profile: String,

    /// Directory searched for profile definitions
    #[arg(long, env = "STREAMBENCH_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// External JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Target operations per second (0 = unbounded)
    #[arg(short, long)]
    pub rate: Option<u64>,

    /// Total operations (0 = unbounded)
    #[arg(short = 'n', long)]
    pub total: Option<u64>,

    /// Payload size in bytes
    #[arg(long)]
    pub payload_size: Option<usize>,

    /// Compression codec (none, lz4, zlib, zstd, snappy)
    #[arg(long)]
    pub compression: Option<String>,

    /// Subscription mode (exclusive, shared, failover, key-shared)
    #[arg(long)]
    pub subscription: Option<String>,

    /// Queue / backlog size
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// Test duration in seconds (0 = until stopped)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Warm-up in seconds
    #[arg(long)]
    pub warmup: Option<u64>,

    /// Snapshot interval in milliseconds
    #[arg(long)]
    pub metrics_interval_ms: Option<u64>,

    /// Disable producer batching
    #[arg(long)]
    pub no_batching: bool,

    /// Append snapshots as JSON lines to this file
    #[arg(long)]
    pub export: Option<PathBuf>,
}

impl ConfigArgs {
    fn overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            workers: self.workers,
            rate: self.rate,
            total_operations: self.total,
            payload_size: self.payload_size,
            batching_enabled: self.no_batching.then_some(false),
            compression: self.compression.clone(),
            subscription: self.subscription.clone(),
            queue_size: self.queue_size,
            duration_secs: self.duration,
            warmup_secs: self.warmup,
            metrics_interval_ms: self.metrics_interval_ms,
            export_enabled: self.export.as_ref().map(|_| true),
            export_path: self.export.clone(),
            ..Default::default()
        }
    }

    /// Resolve the profile with file, environment and flag overrides
    pub fn resolve(&self) -> Result<streambench_core::Configuration> {
        let mut resolver = ProfileResolver::new(&self.profile);
        if let Some(dir) = &self.profile_dir {
            resolver = resolver.search_dir(dir);
        }
        if let Some(file) = &self.config {
            resolver = resolver.file(file);
        }
        resolver
            .env(std::env::vars())
            .context("Failed to read environment overrides")?
            .overrides(self.overrides())
            .resolve()
            .with_context(|| format!("Failed to resolve profile `{}`", self.profile))
    }
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            mode,
            json,
            latency_ms,
            failure_ratio,
            config,
        } => {
            let config = config.resolve()?;
            let options = run::RunOptions {
                mode,
                json,
                latency: std::time::Duration::from_millis(latency_ms),
                failure_ratio,
            };
            run::execute(config, options).await
        }
        Commands::Profiles => {
            for profile in Profile::ALL {
                let defaults = profile.defaults();
                println!(
                    "{:<16} workers={:<3} rate={:<6} {}",
                    profile.name(),
                    defaults.workers,
                    if defaults.is_rate_unbounded() {
                        "max".to_string()
                    } else {
                        defaults.rate.to_string()
                    },
                    profile.description()
                );
            }
            Ok(())
        }
        Commands::Validate { config } => {
            let config = config.resolve()?;
            let json =
                serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("{json}");
            Ok(())
        }
    }
}
