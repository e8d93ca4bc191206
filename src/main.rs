//! PyPI MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for the Python Package Index.
//! Without a subcommand the server speaks JSON-RPC on stdio; the other
//! subcommands run a single query and print the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use pypi_mcp_server::cache::{EvictionStrategy, HybridCache};
use pypi_mcp_server::config::Config;
use pypi_mcp_server::mcp::McpServer;
use pypi_mcp_server::pypi::client::DEFAULT_TREE_DEPTH;
use pypi_mcp_server::pypi::PypiClient;
use pypi_mcp_server::security::{format_report, SecurityScanner};

/// PyPI MCP Server
#[derive(Parser)]
#[command(name = "pypi-mcp")]
#[command(author, version, about = "PyPI MCP Server - A Model Context Protocol server for the Python Package Index")]
struct Cli {
    /// Directory of the on-disk cache
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Cache time-to-live in seconds
    #[arg(long, global = true)]
    cache_ttl: Option<u64>,

    /// Memory eviction strategy (lru, lfu, ttl)
    #[arg(long, global = true)]
    eviction: Option<EvictionStrategy>,

    /// Keep the cache in memory only
    #[arg(long, global = true)]
    no_disk_cache: bool,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Show the full PyPI document of a package
    Info { package: String },
    /// Show the latest version of a package
    Latest { package: String },
    /// List the released versions of a package
    Releases { package: String },
    /// List the direct dependencies of a package
    Deps {
        package: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Resolve the dependency tree of a package
    Tree {
        package: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TREE_DEPTH as u64, value_parser = clap::value_parser!(u64).range(1..=6))]
        depth: u64,
    },
    /// Compare two versions of a package
    Compare {
        package: String,
        version1: String,
        version2: String,
    },
    /// Check whether a package exists
    Exists { package: String },
    /// Show the metadata of a package release
    Metadata {
        package: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Show recent download counts
    Stats { package: String },
    /// Find the documentation URL of a package
    Docs { package: String },
    /// Search PyPI
    Search {
        query: String,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
    },
    /// Newest packages registered on PyPI
    Newest,
    /// Latest releases on PyPI
    Updates,
    /// Check a requirements file for outdated packages
    CheckRequirements { file: String },
    /// Scan a package for known vulnerabilities
    Scan {
        package: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Audit a requirements file for known vulnerabilities
    Audit {
        file: String,
        /// Print the report as JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cache statistics
    Stats,
    /// Remove cached responses
    Clear {
        /// Only remove keys matching this regex
        #[arg(long)]
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout carries MCP traffic
fn init_logging(verbose: u8) {
    let default_level = if verbose > 0 { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::new().context("Invalid configuration")?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(ttl) = cli.cache_ttl {
        config.cache_ttl = Duration::from_secs(ttl);
    }
    if let Some(strategy) = cli.eviction {
        config.eviction_strategy = strategy;
    }
    if cli.no_disk_cache {
        config.disk_cache = false;
    }
    config.ensure_cache_dir()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    let cache = Arc::new(HybridCache::from_config(&config).context("Failed to open cache")?);
    let pypi = Arc::new(PypiClient::new(&config, cache.clone())?);
    let scanner = Arc::new(SecurityScanner::new(pypi.clone(), config.osv_url.clone()));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let mut server = McpServer::new(pypi, scanner);
            server.run_stdio().await?;
            Ok(())
        }
        Commands::Info { package } => print_json(&pypi.get_package_info(&package).await?),
        Commands::Latest { package } => print_json(&pypi.get_latest_version(&package).await?),
        Commands::Releases { package } => print_json(&pypi.get_package_releases(&package).await?),
        Commands::Deps { package, version } => {
            print_json(&pypi.get_dependencies(&package, version.as_deref()).await?)
        }
        Commands::Tree {
            package,
            version,
            depth,
        } => print_json(
            &pypi
                .get_dependency_tree(&package, version.as_deref(), depth as usize)
                .await?,
        ),
        Commands::Compare {
            package,
            version1,
            version2,
        } => print_json(&pypi.compare_versions(&package, &version1, &version2)?),
        Commands::Exists { package } => print_json(&pypi.check_package_exists(&package).await?),
        Commands::Metadata { package, version } => {
            print_json(&pypi.get_package_metadata(&package, version.as_deref()).await?)
        }
        Commands::Stats { package } => print_json(&pypi.get_package_stats(&package).await?),
        Commands::Docs { package } => print_json(&pypi.get_documentation_url(&package).await?),
        Commands::Search { query, page } => print_json(&pypi.search_packages(&query, page).await?),
        Commands::Newest => print_json(&pypi.get_newest_packages().await?),
        Commands::Updates => print_json(&pypi.get_latest_updates().await?),
        Commands::CheckRequirements { file } => {
            print_json(&pypi.check_requirements_file(&file).await?)
        }
        Commands::Scan { package, version } => {
            print_json(&scanner.scan_package(&package, version.as_deref()).await?)
        }
        Commands::Audit { file, json } => {
            let report = scanner
                .scan_requirements_file(&file)
                .await
                .with_context(|| format!("Failed to audit {}", file))?;
            if json {
                print_json(&report)
            } else {
                print!("{}", format_report(&report));
                Ok(())
            }
        }
        Commands::Cache { action } => match action {
            CacheCommand::Stats => print_json(&cache.stats()),
            CacheCommand::Clear { pattern: Some(pattern) } => {
                let removed = cache.invalidate_pattern(&pattern)?;
                eprintln!("Removed {} cached entries matching '{}'", removed, pattern);
                Ok(())
            }
            CacheCommand::Clear { pattern: None } => {
                cache.clear();
                eprintln!("Cache cleared");
                Ok(())
            }
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
