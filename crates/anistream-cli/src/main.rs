//! Anistream CLI - Headless anime player
//!
//! Features:
//! - Ranked rendition listing with direct/embedded classification
//! - Rendition downloads with progress
//! - Simulated watch sessions that persist progress and auto-advance

use anistream_core::PlayerConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use url::Url;

mod commands;
mod output;
mod simulated;

use output::OutputFormat;

/// Anistream CLI - anime playback toolkit
#[derive(Parser)]
#[command(name = "anistream")]
#[command(version)]
#[command(about = "Headless anime playback and progress toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Catalog API base URL
    #[arg(long, global = true, env = "ANISTREAM_API", default_value = "http://localhost:3000/api")]
    api_base: Url,

    /// Bearer token; progress is only persisted when set
    #[arg(long, global = true, env = "ANISTREAM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Player configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List an episode's renditions, best first
    Sources {
        /// Episode ID
        episode_id: i64,
    },

    /// Download one rendition of an episode
    Download {
        /// Episode ID
        episode_id: i64,

        /// Anime title used for the file name
        #[arg(long)]
        title: String,

        /// Episode number used for the file name
        #[arg(long)]
        episode: u32,

        /// Quality label (defaults to the best rendition)
        #[arg(short, long)]
        quality: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Watch a season headlessly on a simulated player
    Watch {
        /// Season ID
        season_id: i64,

        /// Episode to start from (defaults to the first)
        #[arg(short, long)]
        episode: Option<i64>,

        /// Simulated duration of every episode in seconds
        #[arg(short, long, default_value = "1440")]
        duration: f64,

        /// Media seconds advanced per time update
        #[arg(long, default_value = "5")]
        tick: f64,

        /// Wall-clock pause between time updates in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        /// Preferred quality label
        #[arg(short, long)]
        quality: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PlayerConfig> {
    let Some(path) = path else {
        return Ok(PlayerConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    PlayerConfig::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    anistream_core::init();

    let config = load_config(cli.config.as_deref())?;
    let ctx = commands::Context::new(&cli.api_base, cli.token, config, cli.format)?;

    match cli.command {
        Commands::Sources { episode_id } => {
            commands::sources(&ctx, episode_id).await?;
        }
        Commands::Download { episode_id, title, episode, quality, output } => {
            commands::download(&ctx, episode_id, &title, episode, quality.as_deref(), &output).await?;
        }
        Commands::Watch { season_id, episode, duration, tick, delay_ms, quality } => {
            let options = commands::WatchOptions {
                start_episode: episode,
                duration,
                tick,
                delay_ms,
                quality,
            };
            commands::watch(&ctx, season_id, options).await?;
        }
    }

    Ok(())
}
