#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flood impact pipeline.
//!
//! One pass of the pipeline takes a [`WorkItem`] (raster, boundary, and
//! building paths) through:
//!
//! 1. clipping the flood raster to the boundary
//! 2. extracting the newly-flooded mask from the configured band roles
//! 3. polygonizing the mask
//! 4. joining the flood polygons against the building footprints
//! 5. computing centroids and (optionally) reverse geocoding them
//!
//! and writes the clipped raster, a CSV, a `GeoJSON` export, and an SVG
//! map. [`batch::run_batch`] runs many work items, isolating each one so
//! a failure never stops the batch.

pub mod batch;
pub mod config;
pub mod discover;
pub mod enrich;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod render;

use std::path::PathBuf;

pub use batch::{BatchSummary, run_batch};
pub use config::PipelineConfig;
pub use discover::{BuildingPathConvention, WorkItem};
pub use pipeline::{Analysis, PairOutcome, PipelineContext, analyze, run_item};

use flood_impact_geography::GeoError;
use flood_impact_raster::RasterError;
use flood_impact_spatial::SpatialError;
use thiserror::Error;

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`PipelineConfig`].
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Vector loading or reprojection failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Raster reading, clipping, or mask extraction failed.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// The spatial join failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Writing the CSV failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serializing JSON failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An input file of a work item does not exist.
    #[error("Missing {kind} file: {}", path.display())]
    MissingInput {
        /// Which input (`raster`, `boundary`, or `buildings`).
        kind: &'static str,
        /// Expected location.
        path: PathBuf,
    },

    /// An input directory cannot be listed.
    #[error("Cannot read directory {}: {source}", path.display())]
    InputDirectory {
        /// The directory.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The flood mask has no newly-flooded pixels inside the boundary.
    #[error("No flood polygons inside the boundary")]
    NoFloodPolygons,

    /// No building satisfies the join predicate.
    #[error("No affected buildings")]
    NoAffectedBuildings,
}
