#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raster side of the flood impact pipeline.
//!
//! Reads multi-band `GeoTIFF` flood maps, clips them to a region boundary,
//! derives the binary "newly flooded" mask from the flood-extent and
//! permanent-water bands, and converts that mask into vector polygons.

pub mod clip;
pub mod geotiff;
pub mod grid;
pub mod mask;
pub mod polygonize;
pub mod raster;
pub mod transform;

pub use clip::{clip, clip_with_boundary};
pub use grid::Grid;
pub use mask::{BandRoles, extract_flood_mask};
pub use polygonize::polygonize;
pub use raster::Raster;
pub use transform::AffineTransform;

use flood_impact_geography::GeoError;
use thiserror::Error;

/// Errors that can occur during raster operations.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Reading or writing a raster file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Reprojection failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// The boundary geometry is empty or degenerate.
    #[error("Geometry error: {message}")]
    Geometry {
        /// Description of what went wrong.
        message: String,
    },

    /// The boundary does not overlap the raster extent.
    #[error("Boundary does not overlap the raster extent")]
    NoOverlap,

    /// The raster has fewer bands than the operation needs.
    #[error("Raster has {available} bands but {required} are required")]
    InsufficientBands {
        /// Minimum band count needed.
        required: usize,
        /// Band count of the raster.
        available: usize,
    },

    /// A configured band role points at a band the raster does not have.
    #[error("Band role '{role}' is mapped to band {band}, but the raster has {available} bands")]
    MissingBandRole {
        /// Role name (e.g. `flood_extent`).
        role: &'static str,
        /// Configured 1-based band number.
        band: usize,
        /// Band count of the raster.
        available: usize,
    },

    /// Bands or cell buffers do not agree on their dimensions.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected `(width, height)` or cell count.
        expected: (usize, usize),
        /// Actual `(width, height)` or cell count.
        actual: (usize, usize),
    },

    /// A raster needs at least one band.
    #[error("Raster has no bands")]
    NoBands,

    /// The affine transform cannot be inverted.
    #[error("Affine transform is singular")]
    SingularTransform,

    /// The file lacks the tags needed to place it on the earth.
    #[error("Missing georeference: {message}")]
    MissingGeoreference {
        /// Which tag or key was missing.
        message: String,
    },

    /// The file uses a layout or sample type that is not supported.
    #[error("Unsupported raster: {message}")]
    Unsupported {
        /// Description of the unsupported feature.
        message: String,
    },
}
