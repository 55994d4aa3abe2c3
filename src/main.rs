//! cic-sim CLI

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cic_sim::report::{performance_report, LatexTable};
use cic_sim::runner::{ReplicationRunner, RunOptions};
use cic_sim::storage::{self, SummaryStore};
use cic_sim::SimulationConfig;

#[derive(Parser)]
#[command(name = "cic-sim")]
#[command(about = "Monte Carlo coverage study of Change-in-Change confidence intervals")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error). RUST_LOG overrides.
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every experiment of a YAML configuration file
    Run {
        /// Configuration file
        config: PathBuf,

        /// Output directory (overrides `output_dir` of the config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Threads (0 = auto). Results do not depend on this.
        #[arg(long)]
        threads: Option<usize>,

        /// Also write one diagnostic row per replication (Parquet)
        #[arg(long)]
        diagnostics: bool,
    },

    /// Summarize saved records of a previous run
    Report {
        /// Directory holding summary records
        dir: PathBuf,

        /// Confidence level for the LaTeX table
        #[arg(long, default_value = "0.95")]
        level: f64,

        /// Write LaTeX comparison tables to this file
        #[arg(long)]
        latex: Option<PathBuf>,

        /// Digits in the LaTeX table
        #[arg(long, default_value = "3")]
        digits: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            output_dir,
            threads,
            diagnostics,
        } => cmd_run(&config, output_dir, threads, diagnostics),
        Commands::Report {
            dir,
            level,
            latex,
            digits,
        } => cmd_report(&dir, level, latex.as_deref(), digits),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(
    config_path: &Path,
    output_dir: Option<PathBuf>,
    threads: Option<usize>,
    diagnostics: bool,
) -> Result<()> {
    let config = SimulationConfig::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let specs = config.experiments().context("invalid experiment configuration")?;
    let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
    let options = RunOptions {
        threads: threads.unwrap_or(config.execution.threads),
        diagnostics: diagnostics || config.execution.diagnostics,
        cancel: None,
    };

    for spec in specs {
        let label = format!("{} (n = {})", spec.name(), spec.sizes().min());
        let runner = ReplicationRunner::new(spec)
            .with_context(|| format!("cannot set up experiment {label}"))?;
        let artifacts = runner
            .run(&options)
            .with_context(|| format!("experiment {label} failed"))?;

        let path = SummaryStore::save(&artifacts.summary, &output_dir)
            .with_context(|| format!("failed to save summary to {}", output_dir.display()))?;
        if options.diagnostics {
            let table = path.with_extension("trials.parquet");
            storage::write_trial_table(&table, &artifacts.trials)
                .with_context(|| format!("failed to write {}", table.display()))?;
        }

        println!("{}", performance_report(&artifacts.summary));
        println!(
            "failed replications: {}, discarded bootstrap draws: {}",
            artifacts.summary.failed(),
            artifacts.summary.discarded_draws()
        );
        println!("saved {}\n", path.display());
    }
    Ok(())
}

fn cmd_report(dir: &Path, level: f64, latex: Option<&Path>, digits: usize) -> Result<()> {
    let store = SummaryStore::load_dir(dir)
        .with_context(|| format!("failed to read records from {}", dir.display()))?;
    if store.is_empty() {
        anyhow::bail!("no summary records found in {}", dir.display());
    }

    let mut tables = String::new();
    for name in store.experiments() {
        let records = store.records_for(name);
        for record in &records {
            println!("{}", performance_report(record));
        }
        tables.push_str(&LatexTable::new(records, level, digits).to_string());
        tables.push('\n');
    }

    if let Some(path) = latex {
        std::fs::write(path, tables)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("LaTeX tables written to {}", path.display());
    }
    Ok(())
}
