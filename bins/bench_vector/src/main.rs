//! Vector benchmark CLI tool.
//!
//! Generates shard datasets, computes exact ground truth and runs
//! phase-timed benchmarks of the index backends.
//!
//! ## Commands
//!
//! ```bash
//! # Synthetic dataset (unit vectors) with a ground-truth sidecar
//! bench_vector generate --data-dir ./data --rows 100000 --dim 384 --ground-truth
//!
//! # Show what a dataset directory resolves to
//! bench_vector inspect --data-dir ./data
//!
//! # Exact top-k for 1000 sampled queries
//! bench_vector ground-truth --data-dir ./data --queries 1000 --k 50
//!
//! # One benchmark run
//! bench_vector run --data-dir ./data --backend ivf --nlist 256 --nprobe 16
//!
//! # Parameter sweep, then a table of every run
//! bench_vector sweep --data-dir ./data --nlist 64,256 --nprobe 4,16,64
//! bench_vector summarize --db-root ./shardbench_runs
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use shardbench_core::telemetry;

mod commands;

#[derive(Parser)]
#[command(name = "bench_vector")]
#[command(version, about = "Shard-streamed vector benchmark tool")]
struct Cli {
    /// Verbose output (debug logging with file and line)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic shard dataset
    Generate(commands::GenerateArgs),

    /// Show the resolved catalog of a dataset directory
    Inspect(commands::InspectArgs),

    /// Compute exact ground truth by a streaming scan
    GroundTruth(commands::GroundTruthArgs),

    /// Run one benchmark
    Run(commands::RunArgs),

    /// Run one benchmark per parameter combination
    Sweep(commands::SweepArgs),

    /// Tabulate every results.json under a runs directory
    Summarize(commands::SummarizeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let init = if cli.verbose {
        telemetry::init_dev_subscriber()
    } else {
        telemetry::init_subscriber()
    };
    if let Err(e) = init {
        eprintln!("logging disabled: {}", e);
    }

    match cli.command {
        Commands::Generate(args) => commands::generate(args),
        Commands::Inspect(args) => commands::inspect(args),
        Commands::GroundTruth(args) => commands::ground_truth(args),
        Commands::Run(args) => commands::run(args),
        Commands::Sweep(args) => commands::sweep(args),
        Commands::Summarize(args) => commands::summarize(args),
    }
}
