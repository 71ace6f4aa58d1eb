//! Veil-Fetch main entry point
//!
//! This is the command-line interface for the Veil-Fetch acquisition engine.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use veil_fetch::config::{load_config_with_hash, Config, RelevanceConfig};
use veil_fetch::crawler::CrawlOrchestrator;
use veil_fetch::storage::open_storage;

/// Veil-Fetch: privacy-preserving, resumable content acquisition
///
/// Crawls from the given seed URLs through an anonymizing SOCKS proxy,
/// keeps relevant pages, and downloads checksum-verified attachments with
/// resumable ranged requests.
#[derive(Parser, Debug)]
#[command(name = "veil-fetch")]
#[command(version)]
#[command(about = "Privacy-preserving, resumable content acquisition", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URLs to start crawling from
    #[arg(value_name = "SEEDS")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the resolved settings without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        print_dry_run(&config, &cli.seeds);
        return Ok(());
    }

    if cli.seeds.is_empty() {
        bail!("No seed URLs given");
    }

    handle_crawl(config, config_hash, cli.seeds).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "veil_fetch=info,warn",
            1 => "veil_fetch=debug,info",
            2 => "veil_fetch=trace,debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_dry_run(config: &Config, seeds: &[String]) {
    println!("=== Veil-Fetch Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Max visits per URL: {}", crawler.max_url_visits);
    println!("  Loop threshold: {}", crawler.loop_threshold);
    println!(
        "  Parallelism: {} ({} per domain, {}ms apart)",
        crawler.parallelism, crawler.per_domain_parallelism, crawler.request_delay
    );
    println!(
        "  Retries: {} every {}ms, timeout {}ms",
        crawler.max_retries, crawler.retry_delay, crawler.request_timeout
    );
    println!("  Respect robots.txt: {}", crawler.respect_robots);

    println!("\nFilter:");
    println!("  Schemes: {}", config.filter.allowed_schemes.join(", "));
    println!("  Paths: {}", config.filter.allowed_paths.join(", "));
    println!("  Params: {}", config.filter.allowed_params.join(", "));
    println!("  Hosts: {}", config.filter.allowed_hosts.join(", "));

    let download = &config.download;
    println!("\nDownloads:");
    println!("  Directory: {}", download.directory);
    println!(
        "  Chunks: {} bytes, {} attempts {}ms apart",
        download.chunk_size, download.chunk_retries, download.chunk_retry_delay
    );
    println!("  Max concurrent: {}", download.max_concurrent);
    println!(
        "  Checksum parameter: {} (required: {})",
        download.checksum_param, download.require_checksum
    );

    println!("\nProxy:");
    println!(
        "  SOCKS: {}",
        config.proxy.socks_address.as_deref().unwrap_or("none (direct)")
    );
    println!(
        "  Control: {}",
        config
            .proxy
            .control_address
            .as_deref()
            .unwrap_or("none (rotation disabled)")
    );

    println!("\nRelevance:");
    match &config.relevance {
        None => println!("  none (every page is relevant)"),
        Some(RelevanceConfig::Keyword { keywords }) => println!("  keyword: {}", keywords),
        Some(RelevanceConfig::Semantic {
            query, threshold, ..
        }) => println!("  semantic: \"{}\" >= {}", query, threshold),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, seeds: Vec<String>) -> anyhow::Result<()> {
    let database_path = config.output.database_path.clone();
    let storage = open_storage(Path::new(&database_path))
        .with_context(|| format!("Failed to open database {}", database_path))?;

    let orchestrator = CrawlOrchestrator::new(config, Some(Arc::new(storage)))
        .await
        .context("Failed to start crawl session")?
        .with_config_hash(config_hash);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping crawl");
            on_signal.cancel();
        }
    });

    tracing::info!("Session {} starting", orchestrator.session_id());
    let stats = orchestrator
        .run(&seeds, cancel)
        .await
        .context("Crawl failed")?;

    tracing::info!(
        "Visited {} unique URLs ({} visits), {} loops broken, {} URLs rejected",
        stats.unique_urls,
        stats.total_visits,
        stats.loops_broken,
        stats.urls_rejected
    );

    Ok(())
}
