//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the resumable catalog downloader.

use anyhow::Context;
use catalog_harvest::codes::{load_codes, CodeList, CodeRules};
use catalog_harvest::config::{load_config_with_hash, Config, StateBackend};
use catalog_harvest::crawler::{CancelToken, ScanDirection, ScanReport, Scheduler};
use catalog_harvest::driver::CatalogDriverFactory;
use catalog_harvest::output::{
    generate_markdown_summary, generate_summary, load_statistics, print_statistics,
};
use catalog_harvest::storage::{
    describe_backend, lock_book, open_json, open_sqlite, CheckpointBook, CheckpointStore,
};
use catalog_harvest::HarvestError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a resumable bulk downloader for paginated catalogs
///
/// Catalog-Harvest searches a catalog for every code in a work list, downloads
/// the result archives page by page for each configured variant, and checkpoints
/// after every page so an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable bulk downloader for paginated catalogs", long_about = None)]
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

    /// Reset all progress and failure records before running
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be downloaded without starting a browser
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the state stores and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from the state stores and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,

    /// Which scan workers to run
    #[arg(long, value_enum, default_value_t = DirectionArg::Both)]
    direction: DirectionArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Forward,
    Backward,
    Both,
}

impl DirectionArg {
    fn directions(self) -> Vec<ScanDirection> {
        match self {
            Self::Forward => vec![ScanDirection::Forward],
            Self::Backward => vec![ScanDirection::Backward],
            Self::Both => ScanDirection::all_directions(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, &cli.direction.directions())
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_summary {
        handle_export_summary(&config, &config_hash)
    } else {
        handle_harvest(&config, cli.fresh, &cli.direction.directions()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

fn read_work_list(config: &Config) -> anyhow::Result<CodeList> {
    load_codes(&config.scan.codes_path, &CodeRules::from(&config.scan)).with_context(|| {
        format!(
            "failed to read code list {}",
            config.scan.codes_path.display()
        )
    })
}

/// Handles the --dry-run mode: validates config and shows what would be downloaded
fn handle_dry_run(config: &Config, directions: &[ScanDirection]) -> anyhow::Result<()> {
    let codes = read_work_list(config)?;

    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Catalog:");
    println!("  Search page: {}", config.catalog.base_url);
    println!("  Format: {}", config.catalog.format);
    println!("  WebDriver: {}", config.driver.webdriver_url);

    println!("\nDownloads:");
    println!("  Root: {}", config.download.root.display());
    println!("  Timeout per page: {}s", config.download.timeout_secs);

    println!("\nVariants ({}):", config.variants.len());
    for variant in &config.variants {
        println!("  - {} ({})", variant.id, variant.display_name());
    }

    println!("\nState: {}", describe_backend(&config.state));
    println!("Report log: {}", config.state.report_path.display());

    let workers: Vec<String> = directions.iter().map(|d| d.to_string()).collect();
    println!("\nWorkers: {}", workers.join(", "));
    println!("Retry: up to {} attempts per code", config.scan.max_attempts);

    println!("\nCodes ({}):", codes.len());
    for code in codes.as_slice().iter().take(20) {
        println!("  - {}", code);
    }
    if codes.len() > 20 {
        println!("  ... and {} more", codes.len() - 20);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the state stores
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let codes = read_work_list(config).ok();
    println!("State: {}\n", describe_backend(&config.state));

    let stats = match config.state.backend {
        StateBackend::Sqlite => load_statistics(&open_sqlite(&config.state)?, codes.as_ref())?,
        StateBackend::Json => load_statistics(&open_json(&config.state)?, codes.as_ref())?,
    };
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let codes = read_work_list(config).ok();
    let backend = describe_backend(&config.state);
    let output = &config.state.summary_path;

    println!("=== Exporting Harvest Summary ===\n");
    println!("State: {}", backend);
    println!("Output: {}", output.display());
    println!();

    let summary = match config.state.backend {
        StateBackend::Sqlite => generate_summary(
            &open_sqlite(&config.state)?,
            codes.as_ref(),
            config_hash,
            &backend,
        )?,
        StateBackend::Json => generate_summary(
            &open_json(&config.state)?,
            codes.as_ref(),
            config_hash,
            &backend,
        )?,
    };

    generate_markdown_summary(&summary, output)?;
    println!("✓ Summary exported to: {}", output.display());

    Ok(())
}

/// Handles the main download run
async fn handle_harvest(
    config: &Config,
    fresh: bool,
    directions: &[ScanDirection],
) -> anyhow::Result<()> {
    let codes = read_work_list(config)?;
    if codes.is_empty() {
        println!("No codes found in {}", config.scan.codes_path.display());
        return Ok(());
    }

    tracing::info!(
        "{} codes, {} variants, state in {}",
        codes.len(),
        config.variants.len(),
        describe_backend(&config.state)
    );

    match config.state.backend {
        StateBackend::Sqlite => {
            run_with_store(open_sqlite(&config.state)?, config, &codes, fresh, directions).await
        }
        StateBackend::Json => {
            run_with_store(open_json(&config.state)?, config, &codes, fresh, directions).await
        }
    }
}

async fn run_with_store<S: CheckpointStore>(
    store: S,
    config: &Config,
    codes: &CodeList,
    fresh: bool,
    directions: &[ScanDirection],
) -> anyhow::Result<()> {
    let mut book = CheckpointBook::new(store);
    if fresh {
        tracing::info!("Starting fresh run (clearing previous progress and failures)");
        book.reset()?;
    } else {
        tracing::info!("Starting run (codes resume from their checkpoints)");
    }

    let factory = CatalogDriverFactory::new(config)?;
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current page");
            trigger.cancel();
        }
    });

    let scheduler = Scheduler::from_config(config, book.into_shared(), factory, cancel);
    let reports = scheduler.run(codes, directions).await;

    for report in &reports {
        tracing::info!("{}", report);
    }

    {
        let book = lock_book(scheduler.book());
        match load_statistics(book.store(), Some(codes)) {
            Ok(stats) => tracing::info!(
                "Completion {:.1}%: {} of {} codes completed, {} with failures",
                stats.completion_rate(),
                stats.count(catalog_harvest::ProgressStatus::Completed),
                codes.len(),
                stats.codes_with_failures
            ),
            Err(e) => tracing::warn!("Could not read final statistics: {}", e),
        }
    }

    check_workers_started(&reports)?;
    Ok(())
}

/// Fails the run if no worker could start its driver
fn check_workers_started(reports: &[ScanReport]) -> Result<(), HarvestError> {
    let failed: Vec<&ScanReport> = reports.iter().filter(|r| r.init_error.is_some()).collect();
    if failed.is_empty() || failed.len() < reports.len() {
        return Ok(());
    }

    let first = failed[0];
    Err(HarvestError::WorkerStart {
        worker: first.direction.to_string(),
        message: first.init_error.clone().unwrap_or_default(),
    })
}
