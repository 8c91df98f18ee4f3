#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the outage ingestion tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use outage_map_cli_utils::IndicatifProgress;
use outage_map_ingest::{IngestSummary, import_file, observed_now, sync_feed};
use outage_map_source::feed::{self, DEFAULT_FEED_ID, FeedDefinition};
use outage_map_store::{ShardedStore, paths};

#[derive(Parser)]
#[command(name = "outage_map_ingest", about = "Outage feed ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the current outages from a feed and merge them into the store
    Sync {
        /// Configured feed id (e.g., "`dte_outages`")
        #[arg(long, env = "OUTAGE_MAP_FEED")]
        feed: Option<String>,
        /// Feed definition TOML to use instead of a configured feed (wins over `--feed`)
        #[arg(long)]
        feed_file: Option<PathBuf>,
        /// Shard store root (default: `data/`)
        #[arg(long, env = "OUTAGE_MAP_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// Merge a saved `GeoJSON` feed response into the store
    Import {
        /// `GeoJSON` `FeatureCollection` to merge
        file: PathBuf,
        /// Observation time in epoch milliseconds (default: now)
        #[arg(long)]
        observed_at: Option<i64>,
        /// Shard store root (default: `data/`)
        #[arg(long, env = "OUTAGE_MAP_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// List shard files and how many jobs each holds
    Shards {
        /// Shard store root (default: `data/`)
        #[arg(long, env = "OUTAGE_MAP_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// List all configured feeds
    Feeds,
}

fn open_store(data_dir: Option<PathBuf>) -> ShardedStore {
    ShardedStore::new(data_dir.unwrap_or_else(paths::data_dir))
}

fn resolve_feed(
    feed: Option<String>,
    feed_file: Option<PathBuf>,
) -> Result<FeedDefinition, Box<dyn std::error::Error>> {
    if let Some(path) = feed_file {
        return Ok(feed::load_feed_file(&path)?);
    }
    let id = feed.unwrap_or_else(|| DEFAULT_FEED_ID.to_string());
    feed::feed_by_id(&id).ok_or_else(|| format!("Unknown feed: {id}").into())
}

fn print_summary(summary: &IngestSummary) {
    println!(
        "Merged {} of {} features into {} shards ({} skipped)",
        summary.accepted,
        summary.fetched,
        summary.shards_written,
        summary.skipped.total()
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = outage_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            feed,
            feed_file,
            data_dir,
        } => {
            let feed = resolve_feed(feed, feed_file)?;
            let store = open_store(data_dir);
            let progress = IndicatifProgress::records_bar(&multi, &format!("Fetching {}", feed.name));
            let summary = sync_feed(&feed, &store, observed_now(), progress.as_ref()).await?;
            print_summary(&summary);
        }
        Commands::Import {
            file,
            observed_at,
            data_dir,
        } => {
            let store = open_store(data_dir);
            let progress = IndicatifProgress::records_bar(&multi, "Importing");
            let observed_at = observed_at.unwrap_or_else(observed_now);
            let summary = import_file(&file, &store, observed_at, progress.as_ref()).await?;
            print_summary(&summary);
        }
        Commands::Shards { data_dir } => {
            let store = open_store(data_dir);
            let shards = store.list_shards()?;
            println!("{:<10} {:>8}  PATH", "SHARD", "JOBS");
            println!("{}", "-".repeat(60));
            for shard in &shards {
                println!(
                    "{:<10} {:>8}  {}",
                    shard.key.to_string(),
                    shard.records,
                    shard.path.display()
                );
            }
            let total: usize = shards.iter().map(|s| s.records).sum();
            println!("{} shards, {total} jobs", shards.len());
        }
        Commands::Feeds => {
            let feeds = feed::all_feeds();
            println!("{:<20} NAME", "ID");
            println!("{}", "-".repeat(50));
            for feed in &feeds {
                println!("{:<20} {}", feed.id, feed.name);
            }
        }
    }

    Ok(())
}
