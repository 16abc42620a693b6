//! Newly-flooded mask extraction.
//!
//! A pixel is newly flooded when the flood-extent band reports water
//! (`1`) and the permanent-water band reports dry land (`0`). Any other
//! combination, including nodata in either band, is not flooded.

use serde::{Deserialize, Serialize};

use crate::{Grid, Raster, RasterError};

/// Computes the binary flood mask from two zero-based band indices.
///
/// # Errors
///
/// Returns [`RasterError::InsufficientBands`] if either index is beyond
/// the raster's band count.
pub fn extract_flood_mask(
    raster: &Raster,
    extent_band: usize,
    water_band: usize,
) -> Result<Grid<u8>, RasterError> {
    let required = extent_band.max(water_band) + 1;
    let (Some(extent), Some(water)) = (raster.band(extent_band), raster.band(water_band)) else {
        return Err(RasterError::InsufficientBands {
            required,
            available: raster.band_count(),
        });
    };

    let cells = extent
        .cells()
        .iter()
        .zip(water.cells())
        .map(|(&e, &w)| u8::from(is_newly_flooded(e, w)))
        .collect();

    let mask = Grid::from_vec(raster.width(), raster.height(), cells)?;
    log::debug!(
        "Flood mask has {} of {} pixels set",
        mask.count(1),
        mask.cells().len()
    );
    Ok(mask)
}

#[allow(clippy::float_cmp)]
fn is_newly_flooded(extent: f32, water: f32) -> bool {
    extent == 1.0 && water == 0.0
}

/// Which raster bands carry the flood extent and permanent water layers.
///
/// Band numbers are one-based, matching how GIS tools number bands. The
/// defaults (`1` and `5`) fit the flood product the pipeline was built
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandRoles {
    /// Band number of the flood extent layer.
    pub flood_extent: usize,
    /// Band number of the permanent water layer.
    pub permanent_water: usize,
}

impl Default for BandRoles {
    fn default() -> Self {
        Self {
            flood_extent: 1,
            permanent_water: 5,
        }
    }
}

impl BandRoles {
    /// Resolves the roles to zero-based band indices of `raster`.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::MissingBandRole`] naming the first role whose
    /// band number is `0` or beyond the raster's band count.
    pub fn resolve(&self, raster: &Raster) -> Result<(usize, usize), RasterError> {
        let available = raster.band_count();
        let index = |role: &'static str, band: usize| {
            if band == 0 || band > available {
                Err(RasterError::MissingBandRole {
                    role,
                    band,
                    available,
                })
            } else {
                Ok(band - 1)
            }
        };

        Ok((
            index("flood_extent", self.flood_extent)?,
            index("permanent_water", self.permanent_water)?,
        ))
    }

    /// Resolves the roles and extracts the flood mask.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::MissingBandRole`] if a role cannot be
    /// resolved.
    pub fn extract(&self, raster: &Raster) -> Result<Grid<u8>, RasterError> {
        let (extent, water) = self.resolve(raster)?;
        extract_flood_mask(raster, extent, water)
    }
}
