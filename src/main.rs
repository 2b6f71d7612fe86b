//! Blog-Harvester main entry point
//!
//! This is the command-line interface for the Blog-Harvester post crawler.

use anyhow::{bail, Context};
use blog_harvester::config::{load_config_with_hash, override_workers, Config};
use blog_harvester::crawler::{install_ctrl_c, Orchestrator, Shutdown, WorkerContext};
use blog_harvester::pool::{CredentialPool, EgressPool};
use blog_harvester::state::CrawlStatus;
use blog_harvester::storage::{open_storage, BlogStore};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Blog-Harvester: a resumable, rate-aware blog post harvester
///
/// Pages through the posts of every known blog, spreading requests over a pool
/// of API keys and outbound proxies, and keeps per-blog progress in SQLite so a
/// restart picks up where the previous run stopped.
#[derive(Parser, Debug)]
#[command(name = "blog-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resumable, rate-aware blog post harvester", long_about = None)]
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

    /// Override the configured number of workers
    #[arg(long)]
    workers: Option<u32>,

    /// Register blogs by name and exit
    #[arg(long, num_args = 1.., value_name = "NAME", conflicts_with_all = ["stats", "dry_run"])]
    add: Vec<String>,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and show the effective settings without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(workers) = cli.workers {
        override_workers(&mut config, workers).context("invalid --workers")?;
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if !cli.add.is_empty() {
        handle_add(&config, &cli.add)?;
    } else {
        handle_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("blog_harvester=info,warn"),
            1 => EnvFilter::new("blog_harvester=debug,info"),
            2 => EnvFilter::new("blog_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: prints the effective settings
fn handle_dry_run(config: &Config) {
    println!("=== Blog-Harvester Dry Run ===\n");

    println!("Crawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Status preference: {:?}", config.crawler.status_preference);
    println!("  Max fetch attempts: {}", config.crawler.max_fetch_attempts);
    println!("  Max response errors: {}", config.crawler.max_response_errors);
    println!(
        "  Duplicate threshold: {}{}",
        config.crawler.duplicate_threshold,
        if config.crawler.ignore_duplicates { " (ignored)" } else { "" }
    );

    println!("\nAPI:");
    println!("  Base URL: {}", config.api.base_url);
    println!(
        "  Rate limit: {} calls / {}s",
        config.api.max_calls, config.api.period_secs
    );

    println!("\nCredentials:");
    println!("  Snapshot: {}", config.credentials.snapshot_path);
    println!("  Refill tick: {}s", config.credentials.refill_interval_secs);

    println!("\nEgress:");
    if config.egress.enabled {
        println!("  Snapshot: {}", config.egress.snapshot_path);
        println!("  Source: {}", config.egress.source_url);
        println!("  Minimum pool size: {}", config.egress.min_pool_size);
    } else {
        println!("  Disabled (direct requests)");
    }

    println!(
        "\nBlacklisted URL substrings ({}):",
        config.content.blacklisted_domains.len()
    );
    for domain in &config.content.blacklisted_domains {
        println!("  - {}", domain);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = open_storage(Path::new(&config.output.database_path))
        .context("failed to open database")?;

    let counts = store.count_by_status()?;
    println!("Database: {}\n", config.output.database_path);
    println!("Blogs:");
    for status in CrawlStatus::all_statuses() {
        println!(
            "  {:<8} {}",
            status.to_string(),
            counts.get(&status).copied().unwrap_or(0)
        );
    }
    println!("\nPosts: {}", store.count_posts()?);
    println!("URLs:  {}", store.count_urls()?);

    Ok(())
}

/// Handles --add: registers blogs as NEW
fn handle_add(config: &Config, names: &[String]) -> anyhow::Result<()> {
    let store = open_storage(Path::new(&config.output.database_path))
        .context("failed to open database")?;

    let mut added = 0;
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if store.add_blog(name)? {
            added += 1;
        } else {
            tracing::info!("Blog {} is already known", name);
        }
    }

    println!("Registered {} new blog(s)", added);
    Ok(())
}

/// Loads the pools, starts the workers and runs until interrupted
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn BlogStore> = Arc::new(
        open_storage(Path::new(&config.output.database_path))
            .context("failed to open database")?,
    );

    let credentials = Arc::new(
        CredentialPool::restore(
            Path::new(&config.credentials.snapshot_path),
            Duration::from_secs(config.credentials.refill_interval_secs),
        )
        .context("failed to load API keys")?,
    );
    if credentials.is_empty() {
        bail!(
            "no API keys found in {}",
            config.credentials.snapshot_path
        );
    }

    let egress = if config.egress.enabled {
        let pool = EgressPool::restore(
            config.egress.clone(),
            Path::new(&config.egress.snapshot_path),
        )
        .context("failed to load proxies")?;

        if pool.len() < config.egress.min_pool_size {
            tracing::info!(
                "Only {} proxies loaded; refilling to {}",
                pool.len(),
                config.egress.min_pool_size
            );
            pool.refill_from_network(config.egress.min_pool_size).await;
        }
        if pool.is_empty() {
            bail!("no usable proxies after refill");
        }
        Some(Arc::new(pool))
    } else {
        None
    };

    let workers = config.crawler.workers as usize;
    let shutdown = Shutdown::new();
    install_ctrl_c(shutdown.clone());

    let ctx = WorkerContext::new(config, store, credentials, egress, shutdown);
    let mut orchestrator = Orchestrator::new(ctx);
    orchestrator.start(workers)?;

    let stats = orchestrator
        .join()
        .await
        .context("failed to save pool state")?;
    tracing::info!(
        "Harvest stopped: {} cycles, {} blogs done, {} dead, {} posts added",
        stats.cycles,
        stats.done,
        stats.dead,
        stats.posts_added
    );

    Ok(())
}
