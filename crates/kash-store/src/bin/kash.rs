//! Kash CLI - Inspect and edit a cache directory
//!
//! Usage:
//!   kash get <key>                    Write the cached bytes to stdout
//!   kash put <key> [value] [--ttl N]  Cache a value (or --file contents)
//!   kash remove <key>                 Remove one key
//!   kash clear                        Remove everything
//!   kash list                         Show tracked items
//!   kash purge                        Evict expired items now

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kash_core::EpochMillis;
use kash_store::{CacheOption, Config, DiskStore};

#[derive(Parser)]
#[command(name = "kash")]
#[command(about = "Persistent keyed blob cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true, env = "KASH_CONFIG")]
    config: Option<PathBuf>,

    /// Parent directory of the cache
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Cache name
    #[arg(long, global = true)]
    name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a cached value to stdout
    Get {
        key: String,
    },

    /// Cache a value
    Put {
        key: String,

        /// Value to store (reads --file if omitted)
        value: Option<String>,

        /// Read the value from a file
        #[arg(short, long, conflicts_with = "value")]
        file: Option<PathBuf>,

        /// Expire after this many seconds
        #[arg(short, long)]
        ttl: Option<u64>,
    },

    /// Remove a key
    Remove {
        key: String,
    },

    /// Remove every item and file in the cache directory
    Clear,

    /// Print the number of tracked items
    Size,

    /// List tracked items
    List,

    /// Evict expired items
    Purge,

    /// Print a sample configuration file
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        print!("{}", Config::sample());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // Set up logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log.level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    if let Some(root) = cli.root {
        config.cache.root = Some(root);
    }
    if let Some(name) = cli.name {
        config.cache.name = name;
    }

    let store = DiskStore::open(&config.cache)?;
    debug!("Using cache at {:?}", store.dir());

    match cli.command {
        Commands::Get { key } => match store.get(&key)? {
            Some(data) => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&data)?;
                stdout.flush()?;
            }
            None => {
                eprintln!("{}: not cached", key);
                std::process::exit(1);
            }
        },
        Commands::Put {
            key,
            value,
            file,
            ttl,
        } => {
            let data = match (value, file) {
                (Some(value), _) => value.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)?,
                (None, None) => return Err("either a value or --file is required".into()),
            };
            let option = match ttl {
                Some(secs) => CacheOption::expires_in(Duration::from_secs(secs)),
                None => CacheOption::empty(),
            };
            let len = data.len();
            store.put(&key, data, option)?;
            info!("Cached {} bytes under {:?}", len, key);
        }
        Commands::Remove { key } => {
            if !store.remove(&key)? {
                eprintln!("{}: not cached", key);
                std::process::exit(1);
            }
        }
        Commands::Clear => {
            let count = store.size();
            store.evict_all()?;
            println!("Removed {} items from {}", count, store.dir().display());
        }
        Commands::Size => {
            println!("{}", store.size());
        }
        Commands::List => {
            for item in store.items() {
                println!(
                    "{}\t{}\t{}\t{}",
                    item.key,
                    item.filename,
                    format_time(item.created_time),
                    item.expired_time
                        .map(format_time)
                        .unwrap_or_else(|| "never".to_string()),
                );
            }
        }
        Commands::Purge => {
            let removed = store.purge_expired()?;
            println!("Purged {} expired items", removed);
        }
        // Printed before the store is opened
        Commands::Config => {}
    }

    Ok(())
}

fn format_time(millis: EpochMillis) -> String {
    match Utc.timestamp_millis_opt(millis as i64).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}
