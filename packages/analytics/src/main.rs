#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the outage analysis tool.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use outage_map_analytics::analyze;
use outage_map_analytics::report::{write_events_csv, write_summary_csv, write_summary_geojson};
use outage_map_cli_utils::IndicatifProgress;
use outage_map_spatial::ParcelLayer;
use outage_map_store::{ShardedStore, paths};

#[derive(Parser)]
#[command(name = "outage_map_analyze", about = "Per-parcel outage analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join stored outages to land-use parcels and summarize each parcel
    Run {
        /// Land-use parcel `GeoJSON` (default: `data/landuse.geojson`)
        #[arg(long)]
        parcels: Option<PathBuf>,
        /// Summary `GeoJSON` output (default: `data/generated/summary.geojson`)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also write the summary table as CSV
        #[arg(long)]
        summary_csv: Option<PathBuf>,
        /// Also write every coalesced event as CSV
        #[arg(long)]
        events_csv: Option<PathBuf>,
        /// Shard store root (default: `data/`)
        #[arg(long, env = "OUTAGE_MAP_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = outage_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            parcels,
            output,
            summary_csv,
            events_csv,
            data_dir,
        } => {
            let start = Instant::now();
            let store = ShardedStore::new(data_dir.unwrap_or_else(paths::data_dir));
            let parcels = ParcelLayer::load(&parcels.unwrap_or_else(paths::landuse_path))?;

            let progress = IndicatifProgress::batch_bar(&multi, "Analyzing parcels");
            let report = analyze(&store, &parcels, progress.as_ref())?;

            let output = output.unwrap_or_else(paths::summary_path);
            write_summary_geojson(&output, &parcels, &report.summaries)?;
            if let Some(path) = summary_csv {
                write_summary_csv(&path, &report.summaries)?;
            }
            if let Some(path) = events_csv {
                write_events_csv(&path, &report.events)?;
            }

            log::info!(
                "Analysis complete in {:.1}s: {} events, {} parcels",
                start.elapsed().as_secs_f64(),
                report.events.len(),
                report.summaries.len()
            );
        }
    }

    Ok(())
}
