//! Reprojection between EPSG-identified coordinate reference systems.
//!
//! Projections come from the `proj4rs` EPSG definitions. Geographic
//! systems take and return degrees; `proj4rs` works in radians for those,
//! so the conversion happens here.

use flood_impact_geography_models::Crs;
use geo::{Coord, MapCoords};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::GeoError;

/// Reusable coordinate transformer from one CRS to another.
///
/// Constructing the projections is the expensive part, so build one
/// transformer per CRS pair and reuse it for every geometry.
pub struct CrsTransformer {
    source: Crs,
    target: Crs,
    /// `None` when source and target are the same CRS.
    projections: Option<(Proj, Proj)>,
}

impl std::fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CrsTransformer {
    /// Creates a transformer from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Projection`] if either EPSG code has no known
    /// projection definition.
    pub fn new(source: Crs, target: Crs) -> Result<Self, GeoError> {
        if source == target {
            return Ok(Self {
                source,
                target,
                projections: None,
            });
        }

        Ok(Self {
            source,
            target,
            projections: Some((projection(source)?, projection(target)?)),
        })
    }

    /// Source CRS.
    #[must_use]
    pub const fn source(&self) -> Crs {
        self.source
    }

    /// Target CRS.
    #[must_use]
    pub const fn target(&self) -> Crs {
        self.target
    }

    /// Returns `true` when no coordinate math is performed.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.projections.is_none()
    }

    /// Transforms a single coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Projection`] if the transform fails or produces
    /// a non-finite coordinate (e.g. a point outside a projection's domain).
    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>, GeoError> {
        let Some((source_proj, target_proj)) = &self.projections else {
            return Ok(coord);
        };

        let (x, y) = if source_proj.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians())
        } else {
            (coord.x, coord.y)
        };

        let mut point = (x, y, 0.0);
        transform(source_proj, target_proj, &mut point).map_err(|e| GeoError::Projection {
            message: format!(
                "{} -> {} failed for ({}, {}): {e:?}",
                self.source, self.target, coord.x, coord.y
            ),
        })?;

        let (out_x, out_y) = if target_proj.is_latlong() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(GeoError::Projection {
                message: format!(
                    "{} -> {} produced a non-finite coordinate for ({}, {})",
                    self.source, self.target, coord.x, coord.y
                ),
            });
        }

        Ok(Coord { x: out_x, y: out_y })
    }

    /// Transforms every coordinate of a geometry.
    ///
    /// # Errors
    ///
    /// Returns the first [`GeoError::Projection`] hit while transforming.
    pub fn transform_geometry<G>(&self, geometry: &G) -> Result<G, GeoError>
    where
        G: MapCoords<f64, f64, Output = G> + Clone,
    {
        if self.is_identity() {
            return Ok(geometry.clone());
        }
        geometry.try_map_coords(|coord| self.transform_coord(coord))
    }
}

/// Returns `true` if the CRS uses geographic (degree) coordinates.
///
/// # Errors
///
/// Returns [`GeoError::Projection`] if the EPSG code is unknown.
pub fn is_geographic(crs: Crs) -> Result<bool, GeoError> {
    Ok(projection(crs)?.is_latlong())
}

fn projection(crs: Crs) -> Result<Proj, GeoError> {
    Proj::from_epsg_code(crs.epsg()).map_err(|e| GeoError::Projection {
        message: format!("No projection definition for {crs}: {e:?}"),
    })
}
