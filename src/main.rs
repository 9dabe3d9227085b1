//! Crawlgate command-line entry point
//!
//! Runs single fetches through the admission, retry and supervision layers,
//! mostly for checking a configuration against live sites.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crawlgate::config::{load_config, Config};
use crawlgate::{DownloadOptions, Fetcher, JsonExpectations, TaskSupervisor};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Crawlgate: bounded, retrying fetches for content crawlers
#[derive(Parser, Debug)]
#[command(name = "crawlgate")]
#[command(version)]
#[command(about = "Bounded, retrying fetches for content crawlers", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print the effective settings
    Check,

    /// Fetch a URL and write its body to stdout
    Bytes {
        url: String,
    },

    /// Fetch a JSON document and pretty-print it
    Json {
        url: String,

        /// Required top-level field, as KEY=VALUE (VALUE parsed as JSON when possible)
        #[arg(short, long = "expect", value_name = "KEY=VALUE")]
        expect: Vec<String>,

        /// Accept any content type
        #[arg(long)]
        any_content_type: bool,
    },

    /// Stream a URL to a file
    Download {
        url: String,

        /// Target directory (defaults to the configured download directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Target filename (defaults to the last URL path segment)
        #[arg(short, long)]
        name: Option<String>,

        /// Skip the download when the target file already exists
        #[arg(long)]
        no_duplicate: bool,
    },

    /// Download every URL listed in a file, one per line, under supervision
    Batch {
        /// File with one URL per line; blank lines and `#` comments are skipped
        file: PathBuf,

        /// Target directory (defaults to the configured download directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Bytes { url } => handle_bytes(&config, &url).await,
        Command::Json {
            url,
            expect,
            any_content_type,
        } => handle_json(&config, &url, &expect, any_content_type).await,
        Command::Download {
            url,
            dir,
            name,
            no_duplicate,
        } => {
            let mut options = DownloadOptions::new();
            options.dir = dir;
            options.file_name = name;
            options.allow_duplicate = !no_duplicate;
            handle_download(&config, &url, &options).await
        }
        Command::Batch { file, dir } => handle_batch(&config, &file, dir).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawlgate=info,warn"),
            1 => EnvFilter::new("crawlgate=debug,info"),
            2 => EnvFilter::new("crawlgate=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn limit(value: Option<usize>) -> String {
    value.map_or_else(|| "unbounded".to_string(), |v| v.to_string())
}

fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Crawlgate Configuration ===\n");

    println!("Fetch:");
    println!("  Global limit: {}", limit(config.fetch.global_limit));
    println!("  Per-host limit: {}", limit(config.fetch.per_host_limit));
    println!("  Attempts: {}", config.fetch.retry_count);
    println!("  Backoff step: {:?}", config.fetch.backoff_step());
    println!("  Read timeout: {:?}", config.fetch.read_timeout());
    println!("  Connect timeout: {:?}", config.fetch.connect_timeout());
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nDownload:");
    println!("  Directory: {}", config.download.directory.display());

    println!("\nSupervisor:");
    match config.supervisor.max_lifetime {
        Some(secs) => println!("  Max lifetime: {}s", secs),
        None => println!("  Max lifetime: unbounded"),
    }
    match config.supervisor.max_volume {
        Some(volume) => println!("  Max volume: {}", volume),
        None => println!("  Max volume: unbounded"),
    }
    println!("  Max width: {}", limit(config.supervisor.max_width));
    println!("  Close timeout: {:?}", config.supervisor.close_timeout());

    println!("\n✓ Configuration is valid");
    Ok(())
}

async fn handle_bytes(config: &Config, url: &str) -> anyhow::Result<()> {
    let fetcher = Fetcher::from_config(config)?;
    let body = fetcher.fetch_bytes(url, None).await?;

    tracing::info!(url, bytes = body.len(), "fetched");
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body)?;
    stdout.flush()?;
    Ok(())
}

/// Parses `KEY=VALUE`, reading VALUE as JSON and falling back to a string
fn parse_expectation(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got {:?}", raw);
    };
    if key.is_empty() {
        bail!("empty key in {:?}", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn handle_json(
    config: &Config,
    url: &str,
    expect: &[String],
    any_content_type: bool,
) -> anyhow::Result<()> {
    let mut expectations = JsonExpectations::new();
    if any_content_type {
        expectations = expectations.any_content_type();
    }
    for raw in expect {
        let (key, value) = parse_expectation(raw)?;
        expectations = expectations.field(key, value);
    }

    let fetcher = Fetcher::from_config(config)?;
    let value = fetcher.fetch_json(url, None, &expectations).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn handle_download(
    config: &Config,
    url: &str,
    options: &DownloadOptions,
) -> anyhow::Result<()> {
    let fetcher = Fetcher::from_config(config)?;
    let download = fetcher.download(url, options).await?;

    if download.written {
        println!("{}", download.path.display());
    } else {
        println!("{} (already present)", download.path.display());
    }
    Ok(())
}

async fn handle_batch(config: &Config, file: &Path, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        println!("No URLs to download");
        return Ok(());
    }

    let fetcher = Fetcher::from_config(config)?;
    let supervisor = TaskSupervisor::from_config(&config.supervisor);
    let mut options = DownloadOptions::new();
    options.dir = dir;

    tracing::info!(count = urls.len(), "starting batch download");

    // Ctrl-C closes the supervisor, which cancels every download in flight.
    let closer = supervisor.clone();
    let close_timeout = config.supervisor.close_timeout();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received interrupt, closing");
            closer.close(Some(close_timeout)).await;
        }
    });

    // Waves no wider than the width limit, so the batch itself never trips it.
    let wave = config.supervisor.max_width.unwrap_or(urls.len()).max(1);
    let mut written = 0usize;
    let mut skipped = 0usize;
    for urls in urls.chunks(wave) {
        let handles: Vec<_> = urls
            .iter()
            .cloned()
            .map(|url| {
                let fetcher = fetcher.clone();
                let options = options.clone();
                supervisor.spawn(async move { fetcher.download(&url, &options).await })
            })
            .collect();

        for handle in handles {
            match handle.join().await {
                Ok(download) if download.written => written += 1,
                Ok(_) => skipped += 1,
                Err(e) if e.is_supervisor_shutdown() => {}
                Err(e) => tracing::error!(error = %e, "download failed"),
            }
        }
    }
    interrupt.abort();

    let stragglers = supervisor.close(Some(close_timeout)).await;
    let failures = supervisor.join_failures(Some(close_timeout)).await?;
    let stats = supervisor.stats();

    println!("\n=== Batch Summary ===");
    println!("Written: {}", written);
    println!("Already present: {}", skipped);
    println!("Failed: {}", failures.len());
    println!("Cancelled: {}", stats.cancelled);
    if stragglers > 0 {
        println!("Stragglers: {}", stragglers);
    }

    if !failures.is_empty() {
        bail!("{} of {} downloads failed", failures.len(), stats.settled);
    }
    Ok(())
}
