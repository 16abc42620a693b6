//! In-memory multi-band raster.

use flood_impact_geography_models::Crs;
use geo::{Coord, Rect};

use crate::{AffineTransform, Grid, RasterError};

/// A georeferenced stack of equally-sized `f32` bands.
///
/// Band indices used by this type are zero-based; band *numbers* shown to
/// users (and stored in [`crate::BandRoles`]) are one-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    bands: Vec<Grid<f32>>,
    transform: AffineTransform,
    crs: Crs,
    nodata: Option<f32>,
}

impl Raster {
    /// Builds a raster from its bands.
    ///
    /// # Errors
    ///
    /// * [`RasterError::NoBands`] if `bands` is empty
    /// * [`RasterError::ShapeMismatch`] if bands differ in size
    pub fn new(
        bands: Vec<Grid<f32>>,
        transform: AffineTransform,
        crs: Crs,
        nodata: Option<f32>,
    ) -> Result<Self, RasterError> {
        let Some(first) = bands.first() else {
            return Err(RasterError::NoBands);
        };

        let expected = first.shape();
        if let Some(bad) = bands.iter().find(|b| b.shape() != expected) {
            return Err(RasterError::ShapeMismatch {
                expected,
                actual: bad.shape(),
            });
        }

        Ok(Self {
            bands,
            transform,
            crs,
            nodata,
        })
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.bands[0].width()
    }

    /// Number of rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.bands[0].height()
    }

    /// Number of bands.
    #[must_use]
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band at zero-based `index`.
    #[must_use]
    pub fn band(&self, index: usize) -> Option<&Grid<f32>> {
        self.bands.get(index)
    }

    /// All bands.
    #[must_use]
    pub fn bands(&self) -> &[Grid<f32>] {
        &self.bands
    }

    /// Pixel-to-world transform.
    #[must_use]
    pub const fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    /// CRS of the transform's output coordinates.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Declared nodata value, if any.
    #[must_use]
    pub const fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    /// Value written to cells outside a clip boundary: nodata when
    /// declared, otherwise `0`.
    #[must_use]
    pub fn fill_value(&self) -> f32 {
        self.nodata.unwrap_or(0.0)
    }

    /// World-space bounding box of the raster.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Rect<f64> {
        let (w, h) = (self.width() as f64, self.height() as f64);
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(0.0, h),
            self.transform.apply(w, h),
        ];

        let min = corners.iter().fold(corners[0], |acc, c| Coord {
            x: acc.x.min(c.x),
            y: acc.y.min(c.y),
        });
        let max = corners.iter().fold(corners[0], |acc, c| Coord {
            x: acc.x.max(c.x),
            y: acc.y.max(c.y),
        });

        Rect::new(min, max)
    }
}
