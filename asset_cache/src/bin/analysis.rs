use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use asset_cache::config::disk::ConfigValueGroup as DiskConfig;
use asset_cache::{AssetCacheError, DiskTier};
use cache_logging::{init_logging, LoggingConfig};
use clap::{Parser, Subcommand};
use utils::ByteSize;

#[derive(Debug, Parser)]
struct CacheAnalysisArgs {
    #[clap(long, short, default_value = "./asset_cache")]
    root: PathBuf,

    /// Extension of entry files; defaults to ASSET_CACHE_DISK_FILE_EXTENSION or "jpg".
    #[clap(long)]
    extension: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the number of entries and their total size.
    Usage,
    /// Print entries oldest first.
    List {
        #[clap(long)]
        limit: Option<usize>,
    },
    /// Run one eviction pass against the given budget.
    Evict {
        #[clap(long)]
        max_bytes: ByteSize,
        #[clap(long, default_value_t = 0.8)]
        low_water_mark: f64,
    },
    /// Delete every entry.
    Clear,
}

/// Usage: ./asset_cache_analysis --root "path to cache root" <usage|list|evict|clear>
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AssetCacheError> {
    init_logging(LoggingConfig::from_env());

    let args = CacheAnalysisArgs::parse();
    let extension = args.extension.unwrap_or_else(|| DiskConfig::from_env().file_extension);

    match args.command {
        Command::Usage => {
            let tier = open(args.root, &extension)?;
            let entries = tier.entries().await?;
            let total: u64 = entries.iter().map(|e| e.size).sum();
            println!("{} entries, {} ({total} bytes)", entries.len(), ByteSize::new(total));
        },
        Command::List { limit } => {
            let tier = open(args.root, &extension)?;
            let entries = tier.entries().await?;
            for entry in entries.iter().take(limit.unwrap_or(usize::MAX)) {
                let modified = entry.modified.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
                println!("{}\t{}\t{modified}", entry.key, entry.size);
            }
        },
        Command::Evict {
            max_bytes,
            low_water_mark,
        } => {
            let tier = open(args.root, &extension)?.with_budget(max_bytes.as_u64(), low_water_mark)?;
            let summary = tier.evict_if_over_budget().await?;
            println!(
                "evicted {} entries ({} bytes), {} failed, total {} bytes",
                summary.evicted.len(),
                summary.bytes_freed,
                summary.failed.len(),
                summary.total_after
            );
        },
        Command::Clear => {
            let tier = open(args.root, &extension)?;
            let removed = tier.remove_all().await?;
            println!("removed {removed} entries");
        },
    }

    Ok(())
}

/// Opens the tier with an unlimited budget so that opening never evicts.
fn open(root: PathBuf, extension: &str) -> Result<DiskTier, AssetCacheError> {
    DiskTier::initialize(root, extension, u64::MAX, 1.)
}
