//! Booth CLI - DreamBooth fine-tuning worker
//!
//! The `booth` binary processes serverless job envelopes (training or
//! inference) and exposes the dataset and packaging steps on their own.

mod commands;

use anyhow::Context;
use booth_core::WorkerConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Booth - DreamBooth fine-tuning worker
#[derive(Parser, Debug)]
#[command(
    name = "booth",
    author,
    version,
    about = "Booth - DreamBooth fine-tuning and inference worker",
    long_about = "Booth fine-tunes a Stable Diffusion model on a handful of subject images and serves\nimage generation from the resulting weights, one job envelope at a time."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file layered over ~/.booth/config.toml and ./.boothrc
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one job envelope
    ///
    /// Reads `{"id": ..., "input": {...}}` from a file (or stdin with `-`) and
    /// prints the job response as JSON on stdout.
    Run {
        /// Job file, or `-` for stdin
        job: String,
    },

    /// Extract the images from a dataset archive
    ///
    /// Keeps image entries only, flattened to their base names.
    Extract {
        /// Zip archive of images
        archive: PathBuf,

        /// Destination directory
        dest: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Zip a checkpoint directory
    Package {
        /// Directory to archive
        dir: PathBuf,

        /// Output zip path (must be outside the directory)
        out: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = WorkerConfig::discover_and_load(args.config.as_deref()).context("Failed to load configuration")?;

    // stdout carries the job response only
    let level = parse_level(args.log_level.as_deref().or(config.log_level.as_deref()).unwrap_or("info"));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run { job } => commands::run::execute(config, &job).await,
        Command::Extract { archive, dest, json } => commands::extract::execute(&archive, &dest, json),
        Command::Package { dir, out, json } => commands::package::execute(&dir, &out, json),
    }
}
