//! Launcher: assemble a ring of relays on loopback and run it to completion.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ringwire::control::write_stdout_json;
use ringwire::{RingBuilder, RingConfig, MAX_NODES, MIN_NODES};

/// Token-passing ring simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of relay nodes (2-254)
    #[arg(value_parser = clap::value_parser!(u8).range(MIN_NODES as i64..=MAX_NODES as i64))]
    nodes: u8,

    /// Token-Holding-Time in payload bytes
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    tht: Option<u64>,

    /// Per-node read timeout share in milliseconds
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    timeout_multiplier: Option<u64>,

    /// Seed for reproducible fault injection
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with ring settings; positional arguments override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix of per-node input files
    #[arg(long)]
    input_pattern: Option<String>,

    /// Prefix of per-node output files
    #[arg(long)]
    output_pattern: Option<String>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    report: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn ring_config(args: &Args) -> ringwire::Result<RingConfig> {
    let mut config = match &args.config {
        Some(path) => RingConfig::from_json_file(path)?,
        None => RingConfig::default(),
    };
    config.node_count = args.nodes;
    if let Some(tht) = args.tht {
        config.tht = usize::try_from(tht)
            .map_err(|_| ringwire::RingError::Config(format!("THT {tht} too large")))?;
    }
    if let Some(multiplier) = args.timeout_multiplier {
        config.timeout_multiplier_ms = multiplier;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(pattern) = &args.input_pattern {
        config.input_pattern = pattern.clone();
    }
    if let Some(pattern) = &args.output_pattern {
        config.output_pattern = pattern.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
            let _ = e.print();
            return code;
        }
    };

    init_tracing();

    let config = match ring_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let report = match RingBuilder::from_config(config).run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Ring failed: {}", e);
            return ExitCode::from(1);
        }
    };

    tracing::info!(delivered = report.total_delivered(), "Run complete");

    if args.report {
        if let Err(e) = write_stdout_json(&report) {
            tracing::error!("Could not write report: {}", e);
            return ExitCode::from(1);
        }
    }

    ExitCode::SUCCESS
}
