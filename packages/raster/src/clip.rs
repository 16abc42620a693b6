//! Clipping a raster to a region boundary.

use flood_impact_geography::crs::CrsTransformer;
use flood_impact_geography_models::Boundary;
use geo::{Area, BooleanOps, BoundingRect, MapCoords, MultiPolygon};

use crate::{Grid, Raster, RasterError};

/// Crops `raster` to the bounding window of `boundary` and masks every
/// pixel whose center falls outside the boundary.
///
/// The boundary is reprojected into the raster's CRS when they differ and
/// its parts are dissolved into one shape. Masked pixels are set to the
/// raster's nodata value (or `0` when none is declared). The returned
/// raster keeps the CRS, band count, and nodata of the input, with its
/// transform shifted to the window origin.
///
/// # Errors
///
/// * [`RasterError::Geometry`] if the boundary is empty or degenerates
///   after reprojection
/// * [`RasterError::NoOverlap`] if the boundary lies entirely outside the
///   raster
/// * [`RasterError::Geo`] if the CRS pair has no projection definition
pub fn clip(raster: &Raster, boundary: &Boundary) -> Result<Raster, RasterError> {
    clip_with_boundary(raster, boundary).map(|(clipped, _)| clipped)
}

/// Like [`clip`], but also returns the boundary as it was used for
/// masking: reprojected into the raster's CRS and dissolved.
///
/// # Errors
///
/// Same as [`clip`].
pub fn clip_with_boundary(
    raster: &Raster,
    boundary: &Boundary,
) -> Result<(Raster, MultiPolygon<f64>), RasterError> {
    if boundary.is_empty() {
        return Err(RasterError::Geometry {
            message: "boundary has no polygon parts".to_string(),
        });
    }

    let geometry = if boundary.crs == raster.crs() {
        boundary.geometry.clone()
    } else {
        log::info!(
            "Reprojecting boundary from {} to {}",
            boundary.crs,
            raster.crs()
        );
        let transformer = CrsTransformer::new(boundary.crs, raster.crs())?;
        transformer
            .transform_geometry(&boundary.geometry)
            .map_err(|e| RasterError::Geometry {
                message: format!("boundary reprojection failed: {e}"),
            })?
    };

    let dissolved = dissolve(&geometry);
    if dissolved.0.is_empty() || dissolved.unsigned_area() == 0.0 {
        return Err(RasterError::Geometry {
            message: "boundary has zero area".to_string(),
        });
    }

    let inverse = raster
        .transform()
        .inverse()
        .ok_or(RasterError::SingularTransform)?;
    let pixel_space = dissolved.map_coords(|c| inverse.apply_coord(c));

    let Some(window) = pixel_window(&pixel_space, raster.width(), raster.height()) else {
        return Err(RasterError::NoOverlap);
    };

    let inside = burn(&pixel_space, &window);
    let fill = raster.fill_value();

    let bands = raster
        .bands()
        .iter()
        .map(|band| {
            let mut clipped = band.window(window.col, window.row, window.width, window.height);
            for row in 0..window.height {
                for col in 0..window.width {
                    if inside.get(col, row) != Some(true) {
                        clipped.set(col, row, fill);
                    }
                }
            }
            clipped
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let transform = raster
        .transform()
        .offset(window.col as f64, window.row as f64);

    let clipped = Raster::new(bands, transform, raster.crs(), raster.nodata())?;
    log::debug!(
        "Clipped {}x{} raster to {}x{} window at ({}, {}), {} pixels inside",
        raster.width(),
        raster.height(),
        window.width,
        window.height,
        window.col,
        window.row,
        inside.count(true)
    );

    Ok((clipped, dissolved))
}

/// Unions all parts into one (multi)polygon so overlapping parts do not
/// cancel each other out under the even-odd fill rule.
fn dissolve(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if geometry.0.len() <= 1 {
        return geometry.clone();
    }

    geometry
        .iter()
        .fold(MultiPolygon::new(vec![]), |acc, polygon| {
            acc.union(&MultiPolygon::new(vec![polygon.clone()]))
        })
}

/// A pixel window inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    col: usize,
    row: usize,
    width: usize,
    height: usize,
}

/// The window covering the pixel-space bounding box of `geometry`,
/// clamped to the raster, or `None` when they do not overlap.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn pixel_window(geometry: &MultiPolygon<f64>, width: usize, height: usize) -> Option<Window> {
    let rect = geometry.bounding_rect()?;

    let col_start = rect.min().x.floor().max(0.0);
    let col_end = rect.max().x.ceil().min(width as f64);
    let row_start = rect.min().y.floor().max(0.0);
    let row_end = rect.max().y.ceil().min(height as f64);

    if col_start >= col_end || row_start >= row_end {
        return None;
    }

    Some(Window {
        col: col_start as usize,
        row: row_start as usize,
        width: (col_end - col_start) as usize,
        height: (row_end - row_start) as usize,
    })
}

/// One polygon edge in pixel space, with `y0 <= y1`.
#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

/// Rasterizes `geometry` (in pixel coordinates) over `window` with the
/// even-odd rule. A pixel is inside when its center is.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn burn(geometry: &MultiPolygon<f64>, window: &Window) -> Grid<bool> {
    let mut inside = Grid::filled(window.width, window.height, false);

    let mut edges: Vec<Edge> = geometry
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .flat_map(geo::LineString::lines)
        .filter(|line| line.start.y != line.end.y)
        .map(|line| {
            let (a, b) = if line.start.y < line.end.y {
                (line.start, line.end)
            } else {
                (line.end, line.start)
            };
            Edge {
                x0: a.x,
                y0: a.y,
                x1: b.x,
                y1: b.y,
            }
        })
        .collect();
    edges.sort_by(|a, b| a.y0.total_cmp(&b.y0));

    let col_min = window.col as f64;
    let col_max = (window.col + window.width) as f64;

    let mut next = 0;
    let mut active: Vec<Edge> = Vec::new();
    let mut crossings: Vec<f64> = Vec::new();

    for row in 0..window.height {
        let y = (window.row + row) as f64 + 0.5;

        while next < edges.len() && edges[next].y0 <= y {
            active.push(edges[next]);
            next += 1;
        }
        active.retain(|e| e.y1 > y);

        crossings.clear();
        crossings.extend(
            active
                .iter()
                .map(|e| (y - e.y0).mul_add((e.x1 - e.x0) / (e.y1 - e.y0), e.x0)),
        );
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            // Pixel centers c + 0.5 in [span[0], span[1]).
            let start = (span[0] - 0.5).ceil().clamp(col_min, col_max);
            let end = (span[1] - 0.5).ceil().clamp(col_min, col_max);
            for col in (start as usize)..(end as usize) {
                inside.set(col - window.col, row, true);
            }
        }
    }

    inside
}

#[cfg(test)]
mod tests {
    use flood_impact_geography_models::Crs;
    use geo::polygon;

    use super::*;
    use crate::AffineTransform;

    fn ramp(width: usize, height: usize, transform: AffineTransform, crs: Crs) -> Raster {
        #[allow(clippy::cast_precision_loss)]
        let cells = (0..width * height).map(|i| i as f32 + 1.0).collect();
        Raster::new(
            vec![Grid::from_vec(width, height, cells).unwrap()],
            transform,
            crs,
            None,
        )
        .unwrap()
    }

    fn boundary(polygons: Vec<geo::Polygon<f64>>, crs: Crs) -> Boundary {
        Boundary {
            geometry: MultiPolygon::new(polygons),
            crs,
        }
    }

    #[test]
    fn crops_to_window_and_masks_outside() {
        // World y grows downward to keep pixel and world coordinates equal.
        let raster = ramp(10, 10, AffineTransform::identity(), Crs::WGS84);
        let triangle = polygon![
            (x: 2.0, y: 2.0),
            (x: 6.0, y: 2.0),
            (x: 2.0, y: 6.0),
        ];

        let clipped = clip(&raster, &boundary(vec![triangle], Crs::WGS84)).unwrap();
        assert_eq!((clipped.width(), clipped.height()), (4, 4));
        assert_eq!(clipped.transform().apply(0.0, 0.0), geo::Coord { x: 2.0, y: 2.0 });

        let band = clipped.band(0).unwrap();
        // Pixel (2, 2) center (2.5, 2.5) is inside; (5, 5) center (5.5, 5.5) is not.
        assert!((band.get(0, 0).unwrap() - 23.0).abs() < f32::EPSILON);
        assert!(band.get(3, 3).unwrap().abs() < f32::EPSILON);
        // Every kept value matches the source pixel.
        for row in 0..4 {
            for col in 0..4 {
                let v = band.get(col, row).unwrap();
                if v != 0.0 {
                    let source = raster.band(0).unwrap().get(col + 2, row + 2).unwrap();
                    assert!((v - source).abs() < f32::EPSILON);
                }
            }
        }
    }

    #[test]
    fn masked_pixels_use_nodata() {
        let raster = Raster::new(
            vec![Grid::filled(4, 4, 1.0)],
            AffineTransform::identity(),
            Crs::WGS84,
            Some(-9999.0),
        )
        .unwrap();
        let shape = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
        ];

        let clipped = clip(&raster, &boundary(vec![shape], Crs::WGS84)).unwrap();
        let band = clipped.band(0).unwrap();
        assert!((band.get(3, 3).unwrap() + 9999.0).abs() < f32::EPSILON);
        assert!((band.get(0, 0).unwrap() - 1.0).abs() < f32::EPSILON);
        assert_eq!(clipped.nodata(), Some(-9999.0));
    }

    #[test]
    fn disjoint_boundary_is_no_overlap() {
        let raster = ramp(5, 5, AffineTransform::identity(), Crs::WGS84);
        let far = polygon![
            (x: 100.0, y: 100.0),
            (x: 101.0, y: 100.0),
            (x: 101.0, y: 101.0),
            (x: 100.0, y: 101.0),
        ];
        assert!(matches!(
            clip(&raster, &boundary(vec![far], Crs::WGS84)),
            Err(RasterError::NoOverlap)
        ));
    }

    #[test]
    fn empty_boundary_is_geometry_error() {
        let raster = ramp(5, 5, AffineTransform::identity(), Crs::WGS84);
        assert!(matches!(
            clip(&raster, &boundary(vec![], Crs::WGS84)),
            Err(RasterError::Geometry { .. })
        ));
    }

    #[test]
    fn overlapping_parts_are_dissolved() {
        let raster = ramp(6, 2, AffineTransform::identity(), Crs::WGS84);
        let left = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ];
        let right = polygon![
            (x: 2.0, y: 0.0),
            (x: 6.0, y: 0.0),
            (x: 6.0, y: 2.0),
            (x: 2.0, y: 2.0),
        ];

        let clipped = clip(&raster, &boundary(vec![left, right], Crs::WGS84)).unwrap();
        // Without dissolving, the overlap would cancel under even-odd.
        assert!(clipped.band(0).unwrap().cells().iter().all(|&v| v != 0.0));
    }

    #[test]
    fn boundary_is_reprojected_to_raster_crs() {
        // 10x10 raster of 1 km cells in web mercator around the origin.
        let raster = ramp(
            10,
            10,
            AffineTransform::from_origin(-5_000.0, 5_000.0, 1_000.0, 1_000.0),
            Crs::WEB_MERCATOR,
        );
        // Just under the central 4 km square, in degrees.
        let d = 1_950.0 / 111_319.490_793;
        let square = polygon![
            (x: -d, y: -d),
            (x: d, y: -d),
            (x: d, y: d),
            (x: -d, y: d),
        ];

        let (clipped, used) =
            clip_with_boundary(&raster, &boundary(vec![square], Crs::WGS84)).unwrap();
        assert_eq!(clipped.crs(), Crs::WEB_MERCATOR);
        assert_eq!((clipped.width(), clipped.height()), (4, 4));
        assert!(clipped.band(0).unwrap().cells().iter().all(|&v| v != 0.0));

        // The returned boundary is in metres, not degrees.
        let rect = used.bounding_rect().unwrap();
        assert!((rect.min().x + 1_950.0).abs() < 1.0);
        assert!((rect.max().y - 1_950.0).abs() < 1.0);
    }
}
