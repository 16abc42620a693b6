//! Static SVG map of one analyzed work item.
//!
//! Layers, bottom to top: boundary outline, flood polygons, affected
//! buildings, then the title. Everything is drawn in the flood CRS with
//! north up.

use std::fmt::Write as _;
use std::path::Path;

use geo::{BoundingRect, Coord, Geometry, LineString, MultiPolygon, Polygon, Rect};

use crate::PipelineError;

const MARGIN: f64 = 20.0;
const TITLE_HEIGHT: f64 = 40.0;

const BOUNDARY_STROKE: &str = "#000000";
const FLOOD_FILL: &str = "#1f77b4";
const BUILDING_FILL: &str = "#d62728";

/// What goes on the map.
pub struct MapLayers<'a> {
    /// Title drawn above the map.
    pub title: &'a str,
    /// Boundary in the flood CRS.
    pub boundary: &'a MultiPolygon<f64>,
    /// Flood polygons.
    pub flood_polygons: &'a [Polygon<f64>],
    /// Affected building geometries in the flood CRS.
    pub buildings: Vec<&'a Geometry<f64>>,
}

/// World-to-canvas mapping preserving aspect ratio.
struct Viewport {
    min_x: f64,
    max_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Viewport {
    fn fit(extent: Rect<f64>, width: f64, height: f64) -> Self {
        let avail_w = (width - 2.0 * MARGIN).max(1.0);
        let avail_h = (height - 2.0 * MARGIN - TITLE_HEIGHT).max(1.0);
        let span_x = extent.width().max(f64::EPSILON);
        let span_y = extent.height().max(f64::EPSILON);
        let scale = (avail_w / span_x).min(avail_h / span_y);

        Self {
            min_x: extent.min().x,
            max_y: extent.max().y,
            scale,
            offset_x: MARGIN + (avail_w - span_x * scale) / 2.0,
            offset_y: MARGIN + TITLE_HEIGHT + (avail_h - span_y * scale) / 2.0,
        }
    }

    fn project(&self, c: Coord<f64>) -> (f64, f64) {
        (
            (c.x - self.min_x).mul_add(self.scale, self.offset_x),
            (self.max_y - c.y).mul_add(self.scale, self.offset_y),
        )
    }
}

/// Renders the layers as an SVG document.
#[must_use]
pub fn render_svg(layers: &MapLayers<'_>, width: u32, height: u32) -> String {
    let (w, h) = (f64::from(width), f64::from(height));
    let mut svg = String::new();

    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n");

    if let Some(extent) = extent(layers) {
        let view = Viewport::fit(extent, w, h);

        for polygon in layers.boundary {
            let _ = writeln!(
                svg,
                r#"<path d="{}" fill="none" stroke="{BOUNDARY_STROKE}" stroke-width="1"/>"#,
                polygon_path(polygon, &view)
            );
        }

        for polygon in layers.flood_polygons {
            let _ = writeln!(
                svg,
                r#"<path d="{}" fill="{FLOOD_FILL}" fill-opacity="0.5" fill-rule="evenodd" stroke="none"/>"#,
                polygon_path(polygon, &view)
            );
        }

        for geometry in &layers.buildings {
            draw_building(&mut svg, geometry, &view);
        }
    }

    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" font-family="sans-serif" font-size="18" text-anchor="middle">{}</text>"#,
        w / 2.0,
        MARGIN + TITLE_HEIGHT / 2.0,
        escape(layers.title)
    );
    svg.push_str("</svg>\n");
    svg
}

/// Renders the layers and writes them to `path`.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the file cannot be written.
pub fn write_map(
    path: &Path,
    layers: &MapLayers<'_>,
    width: u32,
    height: u32,
) -> Result<(), PipelineError> {
    std::fs::write(path, render_svg(layers, width, height))?;
    log::debug!("Wrote map to {}", path.display());
    Ok(())
}

fn extent(layers: &MapLayers<'_>) -> Option<Rect<f64>> {
    layers
        .boundary
        .bounding_rect()
        .into_iter()
        .chain(layers.flood_polygons.iter().filter_map(|p| p.bounding_rect()))
        .chain(layers.buildings.iter().filter_map(|g| g.bounding_rect()))
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

fn draw_building(svg: &mut String, geometry: &Geometry<f64>, view: &Viewport) {
    match geometry {
        Geometry::Point(p) => {
            let (x, y) = view.project(p.0);
            let _ = writeln!(
                svg,
                r#"<circle cx="{x:.2}" cy="{y:.2}" r="2" fill="{BUILDING_FILL}" fill-opacity="0.7"/>"#
            );
        }
        Geometry::MultiPoint(points) => {
            for p in points {
                draw_building(svg, &Geometry::Point(*p), view);
            }
        }
        Geometry::Polygon(polygon) => building_path(svg, &polygon_path(polygon, view)),
        Geometry::MultiPolygon(polygons) => {
            let d: Vec<_> = polygons.iter().map(|p| polygon_path(p, view)).collect();
            building_path(svg, &d.join(" "));
        }
        Geometry::Rect(r) => building_path(svg, &polygon_path(&r.to_polygon(), view)),
        Geometry::Triangle(t) => building_path(svg, &polygon_path(&t.to_polygon(), view)),
        Geometry::GeometryCollection(collection) => {
            for g in collection {
                draw_building(svg, g, view);
            }
        }
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            log::debug!("Not drawing linear building geometry");
        }
    }
}

fn building_path(svg: &mut String, d: &str) {
    let _ = writeln!(
        svg,
        r#"<path d="{d}" fill="{BUILDING_FILL}" fill-opacity="0.7" fill-rule="evenodd" stroke="{BUILDING_FILL}" stroke-width="0.5"/>"#
    );
}

fn polygon_path(polygon: &Polygon<f64>, view: &Viewport) -> String {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring_path(ring, view))
        .collect::<Vec<_>>()
        .join(" ")
}

fn ring_path(ring: &LineString<f64>, view: &Viewport) -> String {
    let mut d = String::new();
    for (i, c) in ring.coords().enumerate() {
        let (x, y) = view.project(*c);
        let _ = write!(d, "{}{x:.2} {y:.2} ", if i == 0 { "M" } else { "L" });
    }
    d.push('Z');
    d
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
