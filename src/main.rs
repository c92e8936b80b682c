//! Web Aggregator main entry point
//!
//! This is the command-line interface for the web content aggregator.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_aggregator::config::{load_config_with_hash, Config};
use web_aggregator::crawler::run_aggregation;
use web_aggregator::output::print_report;

/// Web Aggregator: a polite concurrent content aggregator
///
/// Fetches every enabled source while respecting robots.txt and per-domain
/// rate limits, then parses the fetched content into items.
#[derive(Parser, Debug)]
#[command(name = "web-aggregator")]
#[command(version)]
#[command(about = "A polite concurrent web content aggregator", long_about = None)]
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

    /// Only aggregate the named source (repeatable)
    #[arg(short, long = "source", value_name = "NAME")]
    sources: Vec<String>,

    /// Validate config and show what would be fetched without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if !cli.sources.is_empty() {
        select_sources(&mut config, &cli.sources)?;
    }

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_run(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("web_aggregator=info,warn"),
            1 => EnvFilter::new("web_aggregator=debug,info"),
            2 => EnvFilter::new("web_aggregator=trace,debug"),
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

/// Disables every source not named on the command line
fn select_sources(config: &mut Config, names: &[String]) -> anyhow::Result<()> {
    for name in names {
        if config.source(name).is_none() {
            bail!("unknown source: {}", name);
        }
    }
    for source in &mut config.sources {
        source.enabled = source.enabled && names.contains(&source.name);
    }
    Ok(())
}

/// Handles the --dry-run mode: shows what would be fetched
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Web Aggregator Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Fetch workers: {}", config.crawler.max_fetchers);
    println!("  Parse workers: {}", config.crawler.max_parsers);
    println!("  Request timeout: {}s", config.crawler.request_timeout);
    println!("  Max redirects: {}", config.crawler.max_redirects);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    println!(
        "  Default requests per minute: {}",
        config.crawler.default_requests_per_minute
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    let sources = config.enabled_sources();
    let mut total = 0;
    println!("\nEnabled Sources ({}):", sources.len());
    for source in &sources {
        let pages = source
            .page_urls()
            .with_context(|| format!("source {} has an invalid URL", source.name))?;
        println!("  - {} [{}] ({} pages)", source.name, source.parser, pages.len());
        for page in &pages {
            println!("    * {}", page);
        }
        total += pages.len();
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would fetch {} URLs", total);

    Ok(())
}

/// Runs the aggregation until it completes or Ctrl-C is pressed
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let token = CancellationToken::new();

    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, shutting down");
                token.cancel();
            }
        });
    }

    let report = run_aggregation(config, token)
        .await
        .context("aggregation failed")?;
    print_report(&report);

    Ok(())
}
