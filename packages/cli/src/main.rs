#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `flood_impact` command line tool.
//!
//! Runs the flood impact pipeline over a directory of flood rasters and a
//! directory of region boundaries (`batch`), over a single explicit
//! raster/boundary/buildings triple (`analyze`), or prints what the
//! pipeline would see in a raster (`inspect`). Without a subcommand it
//! starts an interactive menu.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use flood_impact_geography_models::Crs;
use flood_impact_pipeline::PipelineConfig;
use flood_impact_spatial::SpatialPredicate;

#[derive(Parser)]
#[command(name = "flood_impact", about = "Find buildings affected by flooding")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every flood raster against every region boundary
    Batch {
        /// Directory of flood rasters (`.tif`/`.tiff`)
        #[arg(long)]
        rasters: PathBuf,
        /// Directory of region boundaries (`.geojson`/`.json`)
        #[arg(long)]
        boundaries: PathBuf,
        /// Directory of building files. Defaults to the boundary directory
        #[arg(long)]
        buildings: Option<PathBuf>,
        /// Output directory; one subdirectory is written per work item
        #[arg(long, short)]
        output: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Analyze a single raster, boundary and building file
    Analyze {
        /// Flood raster
        raster: PathBuf,
        /// Region boundary
        boundary: PathBuf,
        /// Building footprints
        buildings: PathBuf,
        /// Output directory
        #[arg(long, short)]
        output: PathBuf,
        /// Name of the output subdirectory. Defaults to
        /// `{boundary stem}_{raster stem}`
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Print raster metadata and how the band roles resolve against it
    Inspect {
        /// Flood raster
        raster: PathBuf,
        /// Pipeline config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the configured reverse geocoding services
    Services,
}

/// Settings shared by `batch` and `analyze`. Flags override the config
/// file.
#[derive(Args)]
struct RunOptions {
    /// Pipeline config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip reverse geocoding
    #[arg(long)]
    no_geocode: bool,
    /// Maximum postal code lookups per work item (0 for no cap)
    #[arg(long)]
    max_lookups: Option<usize>,
    /// Join predicate: intersects, within or contains
    #[arg(long)]
    predicate: Option<SpatialPredicate>,
    /// Keep one row per building even when several flood polygons match
    #[arg(long)]
    dedupe: bool,
    /// Band number (1-based) of the flood extent layer
    #[arg(long)]
    flood_extent_band: Option<usize>,
    /// Band number (1-based) of the permanent water layer
    #[arg(long)]
    permanent_water_band: Option<usize>,
    /// CRS to compute building centroids in (e.g. `EPSG:32617`)
    #[arg(long)]
    centroid_crs: Option<Crs>,
}

impl RunOptions {
    fn into_config(self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = commands::load_config(self.config.as_deref())?;

        if self.no_geocode {
            config.geocoding.enabled = false;
        }
        if let Some(max) = self.max_lookups {
            config.geocoding.max_lookups = max;
        }
        if let Some(predicate) = self.predicate {
            config.join.predicate = predicate;
        }
        if self.dedupe {
            config.join.dedupe = true;
        }
        if let Some(band) = self.flood_extent_band {
            config.band_roles.flood_extent = band;
        }
        if let Some(band) = self.permanent_water_band {
            config.band_roles.permanent_water = band;
        }
        if self.centroid_crs.is_some() {
            config.geocoding.centroid_crs = self.centroid_crs;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = flood_impact_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi).await;
    };

    match command {
        Commands::Batch {
            rasters,
            boundaries,
            buildings,
            output,
            options,
        } => {
            let mut config = options.into_config()?;
            if buildings.is_some() {
                config.buildings.directory = buildings;
            }
            let items =
                flood_impact_pipeline::discover::discover(&rasters, &boundaries, &config.buildings)?;
            if items.is_empty() {
                println!("No work items found.");
                return Ok(());
            }
            let summary = commands::run_items(&items, &output, &config, &multi).await?;
            commands::print_summary(&summary);
        }
        Commands::Analyze {
            raster,
            boundary,
            buildings,
            output,
            label,
            options,
        } => {
            let config = options.into_config()?;
            let mut item = flood_impact_pipeline::WorkItem::new(raster, boundary, buildings);
            if let Some(label) = label {
                item = item.with_label(label);
            }
            let summary = commands::run_items(&[item], &output, &config, &multi).await?;
            commands::print_summary(&summary);
        }
        Commands::Inspect { raster, config } => {
            let config = commands::load_config(config.as_deref())?;
            commands::inspect(&raster, &config)?;
        }
        Commands::Services => commands::list_services(),
    }

    Ok(())
}
