#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate reprojection and vector data I/O.
//!
//! Loads region boundaries and building footprints from `GeoJSON`,
//! resolves the CRS each file declares, and reprojects geometries between
//! EPSG-identified coordinate reference systems using `proj4rs`.

pub mod crs;
pub mod vector;

use flood_impact_geography_models::CrsParseError;
use thiserror::Error;

/// Errors that can occur during geography operations.
#[derive(Debug, Error)]
pub enum GeoError {
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing or geometry conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A declared CRS could not be recognized.
    #[error(transparent)]
    Crs(#[from] CrsParseError),

    /// Building a projection or transforming a coordinate failed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },
}
