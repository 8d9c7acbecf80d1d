//! offline-cache - command-line host for the offline cache proxy.
//!
//! Drives install/activate/fetch against a real origin, with caches kept on
//! disk so they persist between runs, and lists what is cached.

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use offline_cache_core::utils::{format_size, truncate_string};
use offline_cache_core::{
    CacheStorage, DiskStorage, FetchOutcome, HttpNetwork, Method, Network, OfflineCacheProxy,
    ProxyConfig, Registration, Request,
};

/// Default log file name when --log-file points at a directory-less path
const DEFAULT_LOG_FILE: &str = "offline-cache.log";

/// Column width for entry keys in `status` output
const KEY_COLUMN_WIDTH: usize = 60;

#[derive(Parser)]
#[command(name = "offline-cache", version, about = "Network-first offline cache for a web application")]
struct Cli {
    /// Config file (defaults to ~/.config/offline-cache/config.json)
    #[arg(long, global = true, env = "OFFLINE_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the caches
    #[arg(long, global = true, env = "OFFLINE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Origin that seed paths resolve against
    #[arg(long, global = true, env = "OFFLINE_CACHE_ORIGIN")]
    origin: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and store every seed resource under the current version
    Install,
    /// Delete every cache except the current version
    Activate,
    /// Install, then activate only if install succeeded
    Update,
    /// Send one request through the proxy
    Fetch {
        /// Absolute URL or path relative to the origin
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Write the body here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List caches and their entries
    Status,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref());

    let mut config = match cli.config {
        Some(ref path) => ProxyConfig::load_from(path)?,
        None => ProxyConfig::load()?,
    };
    if let Some(origin) = cli.origin {
        config.origin = origin;
    }

    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => ProxyConfig::default_cache_dir()?,
    };
    let storage = DiskStorage::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?;
    let network = HttpNetwork::from_config(&config).context("Failed to build HTTP client")?;

    info!(cache = %config.cache_name, origin = %config.origin, dir = %cache_dir.display(), "offline-cache starting");

    let proxy = OfflineCacheProxy::new(config, network.clone(), storage);

    match cli.command {
        Command::Install => {
            let report = proxy.install().await?;
            println!(
                "Installed {}: {} resources cached",
                report.cache_name,
                report.cached.len()
            );
        }
        Command::Activate => {
            let report = proxy.activate().await?;
            if report.deleted.is_empty() {
                println!("Activated {}: no stale caches", report.kept);
            } else {
                println!(
                    "Activated {}: deleted {}",
                    report.kept,
                    report.deleted.join(", ")
                );
            }
        }
        Command::Update => {
            let version = proxy.cache_name().to_string();
            let mut registration = Registration::new(network);
            registration.register(proxy).await?;
            println!("Updated to {}", version);
        }
        Command::Fetch {
            url,
            method,
            output,
        } => fetch(&proxy, &network, &url, &method, output.as_deref()).await?,
        Command::Status => status(&proxy).await?,
    }

    Ok(())
}

async fn fetch(
    proxy: &OfflineCacheProxy<HttpNetwork, DiskStorage>,
    network: &HttpNetwork,
    url: &str,
    method: &str,
    output: Option<&Path>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;
    let request = Request::new(method, proxy.config().resolve(url)?);

    let outcome = proxy.fetch(&request).await?;
    let source = outcome.source();
    let response = match outcome {
        FetchOutcome::Declined => network
            .fetch(&request)
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?,
        FetchOutcome::Network(response) | FetchOutcome::Cached(response) => response,
        FetchOutcome::Unavailable => {
            anyhow::bail!("{} is unreachable and not cached", request.url)
        }
    };

    eprintln!(
        "{} {} ({}, {})",
        response.status,
        response.status_text,
        source,
        format_size(response.body.len())
    );
    match output {
        Some(path) => std::fs::write(path, &response.body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout().write_all(&response.body)?,
    }
    Ok(())
}

async fn status(proxy: &OfflineCacheProxy<HttpNetwork, DiskStorage>) -> Result<()> {
    let storage = proxy.storage();
    let names = storage.keys().await?;
    println!("Caches in {}:", storage.root().display());
    if names.is_empty() {
        println!("  (none)");
    }

    for name in names {
        let active = name == proxy.cache_name();
        println!("{} {}{}", if active { "*" } else { " " }, name, if active { " (active)" } else { "" });
        for entry in storage.entries(&name).await? {
            println!(
                "    {:>3} {:>9} {:>9}  {}",
                entry.data.status,
                format_size(entry.data.size),
                entry.age_display(),
                truncate_string(&entry.data.key, KEY_COLUMN_WIDTH)
            );
        }
    }
    Ok(())
}
