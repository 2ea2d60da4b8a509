//! Runs one clustering pipeline described by a YAML configuration file.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cluster_pipeline::{compose, ConfigSource};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Cluster point-cloud data with the algorithm selected in a config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the log subscriber")?;

    let start = Instant::now();
    let source = ConfigSource::from_path(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let mut pipeline = compose(&source)?;
    let output = pipeline.run(&std::env::current_dir()?)?;

    info!(
        output = %output.display(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "pipeline complete"
    );
    Ok(())
}
