//! CacheCache CLI
//!
//! Inspect and edit a cache from the command line.
//!
//! ```text
//! cachecache [--config FILE] [--cache NAME] <command>
//!
//!   ┌──────────┐    ┌──────────────┐    ┌──────────────────────────┐
//!   │   Args   │───▶│ CacheManager │───▶│ Cache (file backend or   │
//!   │  (clap)  │    │  or default  │    │  configured backends)    │
//!   └──────────┘    └──────────────┘    └──────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cachecache::{
    Backend, Cache, CacheManager, FileBackend, LoggingBackend, ManagerConfig, Result,
    DEFAULT_CACHE,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CacheCache - namespaced caching over pluggable backends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration of the caches
    #[arg(long, env = "CACHECACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the cache to use
    #[arg(long, env = "CACHECACHE_CACHE", default_value = DEFAULT_CACHE)]
    cache: String,

    /// Cache directory used without a configuration file
    #[arg(long, env = "CACHECACHE_DIR")]
    dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether an id exists
    Exists { id: String },
    /// Print the value of an id
    Get { id: String },
    /// Store a value, parsed as JSON or kept as a string
    Set {
        id: String,
        value: String,
        /// TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Store a value unless the id exists
    Add {
        id: String,
        value: String,
        /// TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete an id
    Delete { id: String },
    /// Delete everything
    Flush,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args);

    let cache = open_cache(&args)?;
    debug!("Using cache '{}': {:?}", args.cache, cache);

    run(&cache, args.command)
}

/// Cache named by `--cache` from `--config`, or a file cache in `--dir`
fn open_cache(args: &Args) -> Result<Arc<Cache>> {
    if let Some(path) = &args.config {
        info!("Loading configuration from {}", path.display());
        let manager = CacheManager::from_config(&ManagerConfig::from_file(path)?)?;
        return manager.get(&args.cache);
    }

    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("cachecache"));
    info!("Using file cache in {}", dir.display());
    let backend = Arc::new(FileBackend::in_dir(dir)?);
    let backend = Arc::new(LoggingBackend::with_level(backend, Level::DEBUG));
    Ok(Arc::new(Cache::new(backend)))
}

fn run(cache: &Cache, command: Command) -> Result<ExitCode> {
    let status = match command {
        Command::Exists { id } => {
            let exists = cache.exists(&id)?;
            println!("{}", exists);
            exists
        }
        Command::Get { id } => match cache.get(&id)? {
            Some(value) => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                true
            }
            None => false,
        },
        Command::Set { id, value, ttl } => {
            cache.set(&id, parse_value(&value), ttl.map(Duration::from_secs))?
        }
        Command::Add { id, value, ttl } => {
            let added = cache.add(&id, parse_value(&value), ttl.map(Duration::from_secs))?;
            if !added {
                println!("'{}' already exists", id);
            }
            added
        }
        Command::Delete { id } => cache.delete(&id)?,
        Command::Flush => cache.flush_all()?,
    };

    Ok(if status {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// JSON when it parses, a JSON string otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Tests
// =============================================================================
