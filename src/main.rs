//! Ripple-Harvest main entry point
//!
//! This is the command-line interface for the Ripple-Harvest extraction engine.

use anyhow::Context;
use clap::Parser;
use ripple_harvest::config::{load_config_with_hash, Config, ResumeFrom};
use ripple_harvest::extractor::HtmlExtractor;
use ripple_harvest::input::load_work_items;
use ripple_harvest::output::{
    generate_markdown_summary, generate_summary, load_statistics, print_statistics,
    write_failures_csv, write_results_csv,
};
use ripple_harvest::session::HttpSessionFactory;
use ripple_harvest::storage::{open_ledger, Ledger};
use ripple_harvest::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Ripple-Harvest: a patient bulk extraction engine
///
/// Ripple-Harvest walks a list of work items, extracts each one from a
/// rate-limited remote source with retries and adaptive pacing, and records
/// every result in a SQLite ledger so interrupted runs resume where they
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "ripple-harvest")]
#[command(version)]
#[command(about = "A patient bulk extraction engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start from the first item, ignoring the saved checkpoint
    #[arg(long, conflicts_with = "resume_from")]
    fresh: bool,

    /// Start from this item index, ignoring the saved checkpoint
    #[arg(long, value_name = "INDEX", conflicts_with = "fresh")]
    resume_from: Option<usize>,

    /// Stop after this many items past the resume point
    #[arg(long, value_name = "COUNT")]
    max_items: Option<usize>,

    /// Validate config and input and show what would be harvested
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Export the latest result per item as CSV and exit
    #[arg(long, value_name = "PATH")]
    export_results: Option<PathBuf>,

    /// Export pending failures as a replayable CSV and exit
    #[arg(long, value_name = "PATH")]
    export_failures: Option<PathBuf>,

    /// Write a markdown summary of the latest run and exit
    #[arg(long, value_name = "PATH")]
    export_summary: Option<PathBuf>,
}

impl Cli {
    fn exports_requested(&self) -> bool {
        self.export_results.is_some()
            || self.export_failures.is_some()
            || self.export_summary.is_some()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.fresh {
        config.run.resume_from_index = ResumeFrom::Index(0);
    } else if let Some(index) = cli.resume_from {
        config.run.resume_from_index = ResumeFrom::Index(index);
    }
    if let Some(limit) = cli.max_items {
        anyhow::ensure!(limit > 0, "--max-items must be at least 1");
        config.run.max_items = Some(limit);
    }

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.exports_requested() {
        handle_exports(&config, &cli)
    } else {
        let code = handle_harvest(config, config_hash).await?;
        if code != 0 {
            std::process::exit(code);
        }
        Ok(())
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_harvest=info,warn"),
            1 => EnvFilter::new("ripple_harvest=debug,info"),
            2 => EnvFilter::new("ripple_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and input, shows the plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Ripple-Harvest Dry Run ===\n");

    let run = &config.run;
    println!("Run:");
    println!("  Workers: {}", run.workers);
    println!("  Max retries: {} ({} attempts)", run.max_retries, run.max_attempts());
    println!("  Checkpoint every: {} items", run.checkpoint_every);
    println!("  Session recycle every: {} items", run.session_recycle_every);
    match run.resume_from_index {
        ResumeFrom::Auto => println!("  Resume from: latest checkpoint"),
        ResumeFrom::Index(i) => println!("  Resume from: index {}", i),
    }
    if let Some(limit) = run.max_items {
        println!("  Max items: {}", limit);
    }
    if run.cooldown_every > 0 {
        println!(
            "  Cooldown: {:.0}-{:.0}s every {} items",
            run.cooldown_min_secs, run.cooldown_max_secs, run.cooldown_every
        );
    }

    println!("\nPacing:");
    println!(
        "  Base delay: {:.1}-{:.1}s",
        config.pacing.base_delay_min_secs, config.pacing.base_delay_max_secs
    );
    println!(
        "  Thresholds: slow down below {:.0}%, speed up above {:.0}%",
        config.pacing.low_threshold * 100.0,
        config.pacing.high_threshold * 100.0
    );

    println!("\nSource:");
    println!("  URL template: {}", config.source.url_template);
    println!("  Fields ({}):", config.source.fields.len());
    for field in &config.source.fields {
        match &field.attribute {
            Some(attr) => println!("    - {} <- {} [@{}]", field.name, field.selector, attr),
            None => println!("    - {} <- {}", field.name, field.selector),
        }
    }

    let items = load_work_items(
        Path::new(&config.input.path),
        &config.input.id_column,
        &config.input.label_column,
    )?;

    let ledger_path = Path::new(&config.output.database_path);
    let start = match run.resume_from_index {
        ResumeFrom::Index(i) => i,
        ResumeFrom::Auto if ledger_path.exists() => open_ledger(ledger_path)?
            .load_latest()?
            .map(|c| c.cursor_index)
            .unwrap_or(0),
        ResumeFrom::Auto => 0,
    };

    println!("\nInput:");
    println!("  File: {}", config.input.path);
    println!("  Items: {}", items.len());
    println!("  Ledger: {}", config.output.database_path);

    let start = start.min(items.len());
    let end = run.end_index(start, items.len());

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest {} items starting at index {}",
        end - start,
        start
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the ledger
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let ledger = open_ledger(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&ledger)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-* modes
fn handle_exports(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let ledger = open_ledger(Path::new(&config.output.database_path))?;
    let id_column = &config.input.id_column;
    let label_column = &config.input.label_column;

    if let Some(path) = &cli.export_results {
        let records = ledger.latest_results()?;
        let rows = write_results_csv(&records, path, id_column, label_column)?;
        println!("✓ Exported {} results to: {}", rows, path.display());
    }

    if let Some(path) = &cli.export_failures {
        let failures = ledger.pending_failures()?;
        let rows = write_failures_csv(&failures, path, id_column, label_column)?;
        println!("✓ Exported {} failures to: {}", rows, path.display());
    }

    if let Some(path) = &cli.export_summary {
        tracing::info!("Loading run data from ledger...");
        let summary = generate_summary(&ledger)?;
        generate_markdown_summary(&summary, path)?;
        println!("✓ Summary exported to: {}", path.display());
    }

    Ok(())
}

/// Handles the main harvest; returns the process exit code
async fn handle_harvest(config: Config, config_hash: String) -> anyhow::Result<i32> {
    let items = load_work_items(
        Path::new(&config.input.path),
        &config.input.id_column,
        &config.input.label_column,
    )?;

    let ledger = open_ledger(Path::new(&config.output.database_path))?;
    let extractor = HtmlExtractor::new(&config.source)?;
    let factory = HttpSessionFactory::new(config.session.clone());

    let orchestrator = Orchestrator::new(
        config,
        config_hash,
        Arc::new(factory),
        Arc::new(extractor),
        Arc::new(Mutex::new(ledger)),
    );

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current item...");
            cancel.cancel();
        }
    });

    let report = orchestrator.run(items).await;

    if let Some(error) = &report.error {
        tracing::error!("Harvest failed: {}", error);
    }
    println!(
        "Run finished: {} ({} items, {} succeeded, {} failed, cursor {}/{})",
        report.final_state,
        report.completed,
        report.succeeded,
        report.failed,
        report.cursor_index,
        report.total_items
    );

    Ok(report.exit_code())
}
