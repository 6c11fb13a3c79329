//! Veilcrawl main entry point
//!
//! Command-line interface for the hidden-service intelligence crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use veilcrawl::config::{compute_config_hash, load_config, validate, Config};
use veilcrawl::output::{collect_stats, write_export};
use veilcrawl::supervisor::Supervisor;

/// Veilcrawl: a hidden-service intelligence crawler
///
/// Crawls `.onion` sites through a local Tor SOCKS proxy, extracts
/// structured findings and maintains a trust-ranked host map in SQLite.
#[derive(Parser, Debug)]
#[command(name = "veilcrawl")]
#[command(version)]
#[command(about = "Hidden-service intelligence crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long)]
    workers: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum pages fetched this run
    #[arg(long = "max-pages")]
    max_pages: Option<u64>,

    /// SQLite database path
    #[arg(long)]
    db: Option<String>,

    /// JSON export path
    #[arg(long)]
    output: Option<String>,

    /// Extra seed address, repeatable
    #[arg(long = "add-seed", value_name = "URL")]
    add_seed: Vec<String>,

    /// Dashboard snapshot port
    #[arg(long = "web-port")]
    web_port: Option<u16>,

    /// Disable the dashboard snapshot
    #[arg(long = "no-web")]
    no_web: bool,

    /// Delete the database and start from scratch
    #[arg(long)]
    reset: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show database statistics and exit
    #[arg(long, conflicts_with = "export")]
    stats: bool,

    /// Write the JSON export from existing data and exit
    #[arg(long, conflicts_with = "stats")]
    export: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = load_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            if let Ok(hash) = compute_config_hash(path) {
                tracing::info!("Configuration loaded (hash: {})", hash);
            }
            config
        }
        None => Config::default(),
    };

    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else {
        handle_crawl(config, cli.reset).await?;
    }

    Ok(())
}

/// Folds command-line overrides into the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.crawler.request_timeout_secs = timeout;
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawler.page_budget = max_pages;
    }
    if let Some(db) = &cli.db {
        config.output.database_path = db.clone();
    }
    if let Some(output) = &cli.output {
        config.output.export_path = output.clone();
    }
    if let Some(port) = cli.web_port {
        config.web.port = port;
    }
    if cli.no_web {
        config.web.enabled = false;
    }
    for seed in &cli.add_seed {
        if !config.seeds.contains(seed) {
            config.seeds.push(seed.clone());
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("veilcrawl=info,warn"),
            1 => EnvFilter::new("veilcrawl=debug,info"),
            2 => EnvFilter::new("veilcrawl=trace,debug"),
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

/// Handles the --stats mode
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let stats = collect_stats(Path::new(&config.output.database_path))?;
    print!("{}", stats);
    Ok(())
}

/// Handles the --export mode
fn handle_export(config: &Config) -> anyhow::Result<()> {
    let hosts = write_export(
        Path::new(&config.output.database_path),
        Path::new(&config.output.export_path),
    )?;
    println!(
        "Exported {} hosts to {}",
        hosts, config.output.export_path
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, reset: bool) -> anyhow::Result<()> {
    if reset {
        tracing::info!("Starting fresh crawl (database will be reset)");
    } else {
        tracing::info!("Starting crawl (resuming previous state if present)");
    }
    tracing::info!(
        workers = config.crawler.workers,
        page_budget = config.crawler.page_budget,
        seeds = config.seeds.len(),
        "Crawl parameters"
    );

    let database_path = config.output.database_path.clone();
    let export_path = config.output.export_path.clone();

    let supervisor = Supervisor::new(config);
    let report = supervisor.run(reset).await.context("crawl failed")?;

    tracing::info!(
        pages = report.snapshot.pages_fetched,
        hosts = report.hosts,
        findings = report.findings,
        elapsed = ?report.elapsed,
        "Crawl finished"
    );

    let stats = collect_stats(Path::new(&database_path))?;
    print!("{}", stats);

    let hosts = write_export(Path::new(&database_path), Path::new(&export_path))?;
    println!("Exported {} hosts to {}", hosts, export_path);

    Ok(())
}
