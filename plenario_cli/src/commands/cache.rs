//! The `cache` subcommand: inspect, sweep, or clear the response cache.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use plenario_lib::DiskCache;

use crate::output::{print_json, OutputFormat};

#[derive(Args)]
pub struct CacheArgs {
    /// Response cache directory
    #[arg(long, default_value = "cache")]
    pub cache_dir: String,

    /// Remove expired entries
    #[arg(long)]
    pub sweep: bool,

    /// Remove every entry
    #[arg(long)]
    pub clear: bool,
}

pub fn run(args: &CacheArgs, format: &OutputFormat) -> Result<()> {
    let cache = DiskCache::open(&args.cache_dir, Duration::from_secs(6 * 3600))?;

    if args.clear {
        let removed = cache.clear();
        eprintln!("removed {} entries", removed);
    } else if args.sweep {
        let removed = cache.sweep();
        eprintln!("removed {} expired entries", removed);
    }

    let stats = cache.stats();
    match format {
        OutputFormat::Table => {
            println!(
                "entries: {}\nexpired: {}\ntotal size: {:.1} KiB",
                stats.entries,
                stats.expired,
                stats.total_bytes as f64 / 1024.0
            );
        }
        OutputFormat::Json => print_json(&stats),
    }
    Ok(())
}
