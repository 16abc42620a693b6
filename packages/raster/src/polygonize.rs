//! Binary mask to vector polygon conversion.
//!
//! Each 4-connected region of `1` cells becomes one polygon whose
//! boundary follows pixel edges exactly. Regions touching only at a
//! corner are separate polygons. Enclosed `0` regions become holes.

use std::collections::HashMap;

use geo::orient::{Direction, Orient};
use geo::{Coord, LineString, Polygon};

use crate::{AffineTransform, Grid};

/// A pixel-corner vertex in `(col, row)` coordinates.
type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    from: Vertex,
    to: Vertex,
}

impl Edge {
    /// Unit step of the edge in `(dx, dy)`, rows growing downward.
    #[allow(clippy::cast_possible_wrap)]
    const fn direction(&self) -> (isize, isize) {
        (
            self.to.0 as isize - self.from.0 as isize,
            self.to.1 as isize - self.from.1 as isize,
        )
    }
}

/// Converts the `1` regions of `mask` into polygons in the CRS of
/// `transform`.
///
/// Polygons are returned in the scan order of each region's first cell
/// (row-major), with exterior rings counter-clockwise and holes clockwise
/// in world coordinates. An all-zero mask yields no polygons.
#[must_use]
pub fn polygonize(mask: &Grid<u8>, transform: &AffineTransform) -> Vec<Polygon<f64>> {
    let (labels, count) = label_regions(mask);
    if count == 0 {
        return Vec::new();
    }

    let edges = boundary_edges(&labels, mask.width(), mask.height(), count);

    let polygons: Vec<_> = edges
        .iter()
        .flat_map(|region| assemble(&trace_rings(region), transform))
        .collect();

    log::debug!(
        "Polygonized {count} regions into {} polygons",
        polygons.len()
    );

    polygons
}

/// Labels 4-connected regions of `1` cells in row-major scan order.
///
/// Returns one label per cell (`0` for background, `n + 1` for region
/// `n`) and the number of regions.
fn label_regions(mask: &Grid<u8>) -> (Vec<usize>, usize) {
    let (width, height) = mask.shape();
    let cells = mask.cells();
    let mut labels = vec![0usize; cells.len()];
    let mut count = 0;
    let mut stack = Vec::new();

    for start in 0..cells.len() {
        if cells[start] != 1 || labels[start] != 0 {
            continue;
        }

        count += 1;
        labels[start] = count;
        stack.push(start);

        while let Some(index) = stack.pop() {
            let (col, row) = (index % width, index / width);
            let neighbors = [
                (row > 0).then(|| index - width),
                (row + 1 < height).then(|| index + width),
                (col > 0).then(|| index - 1),
                (col + 1 < width).then(|| index + 1),
            ];
            for n in neighbors.into_iter().flatten() {
                if cells[n] == 1 && labels[n] == 0 {
                    labels[n] = count;
                    stack.push(n);
                }
            }
        }
    }

    (labels, count)
}

/// Collects, per region, every cell edge that borders a different label.
///
/// Edges run clockwise around each cell as seen on screen (rows growing
/// downward), so the region is always on the right of travel.
fn boundary_edges(labels: &[usize], width: usize, height: usize, count: usize) -> Vec<Vec<Edge>> {
    let mut edges = vec![Vec::new(); count];
    let label_at = |col: Option<usize>, row: Option<usize>| match (col, row) {
        (Some(c), Some(r)) if c < width && r < height => labels[r * width + c],
        _ => 0,
    };

    for row in 0..height {
        for col in 0..width {
            let label = labels[row * width + col];
            if label == 0 {
                continue;
            }
            let region = &mut edges[label - 1];
            let (x, y) = (col, row);

            if label_at(Some(col), row.checked_sub(1)) != label {
                region.push(Edge {
                    from: (x, y),
                    to: (x + 1, y),
                });
            }
            if label_at(Some(col + 1), Some(row)) != label {
                region.push(Edge {
                    from: (x + 1, y),
                    to: (x + 1, y + 1),
                });
            }
            if label_at(Some(col), Some(row + 1)) != label {
                region.push(Edge {
                    from: (x + 1, y + 1),
                    to: (x, y + 1),
                });
            }
            if label_at(col.checked_sub(1), Some(row)) != label {
                region.push(Edge {
                    from: (x, y + 1),
                    to: (x, y),
                });
            }
        }
    }

    edges
}

/// Links a region's edges into closed rings.
///
/// At a vertex shared by two diagonal cells there are two outgoing edges;
/// taking the right-most turn keeps the diagonal cells apart, which is
/// what 4-connectivity requires.
fn trace_rings(edges: &[Edge]) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        used[start] = true;

        let mut ring = vec![edges[start].from];
        let mut current = start;

        loop {
            let edge = edges[current];
            let candidates = outgoing.get(&edge.to).map_or(&[][..], Vec::as_slice);
            let Some(next) = pick_next(edge, candidates, edges, &used, start) else {
                log::warn!("Open ring while polygonizing at vertex {:?}", edge.to);
                break;
            };
            if next == start {
                break;
            }

            ring.push(edge.to);
            used[next] = true;
            current = next;
        }

        rings.push(simplify(&ring));
    }

    rings
}

/// Chooses the outgoing edge to follow, preferring a right turn, then
/// straight on, then a left turn.
fn pick_next(
    incoming: Edge,
    candidates: &[usize],
    edges: &[Edge],
    used: &[bool],
    start: usize,
) -> Option<usize> {
    let (dx, dy) = incoming.direction();
    let preferences = [(-dy, dx), (dx, dy), (dy, -dx)];

    preferences.into_iter().find_map(|dir| {
        candidates
            .iter()
            .copied()
            .find(|&i| (!used[i] || i == start) && edges[i].direction() == dir)
    })
}

/// Drops vertices in the middle of straight runs.
fn simplify(ring: &[Vertex]) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring.to_vec();
    }

    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let here = ring[i];
            let next = ring[(i + 1) % n];
            let a = Edge {
                from: prev,
                to: here,
            };
            let b = Edge {
                from: here,
                to: next,
            };
            // Directions are unit steps only before simplification.
            signum(a.direction()) != signum(b.direction())
        })
        .map(|i| ring[i])
        .collect()
}

const fn signum((dx, dy): (isize, isize)) -> (isize, isize) {
    (dx.signum(), dy.signum())
}

/// Twice the signed shoelace area in pixel coordinates. Positive for the
/// outer boundary of a region, negative for a hole.
#[allow(clippy::cast_possible_wrap)]
fn doubled_area(ring: &[Vertex]) -> isize {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            (x0 as isize) * (y1 as isize) - (x1 as isize) * (y0 as isize)
        })
        .sum()
}

/// Builds world-space polygons from a region's rings.
///
/// A 4-connected region has exactly one outer ring. Should more than one
/// appear, the largest takes all holes and the rest become standalone
/// polygons.
fn assemble(rings: &[Vec<Vertex>], transform: &AffineTransform) -> Vec<Polygon<f64>> {
    let mut exteriors: Vec<(isize, &Vec<Vertex>)> = Vec::new();
    let mut holes = Vec::new();

    for ring in rings.iter().filter(|r| r.len() >= 3) {
        let area = doubled_area(ring);
        if area > 0 {
            exteriors.push((area, ring));
        } else if area < 0 {
            holes.push(to_world(ring, transform));
        }
    }

    exteriors.sort_by(|a, b| b.0.cmp(&a.0));
    if exteriors.len() > 1 {
        log::debug!("Region produced {} outer rings", exteriors.len());
    }

    let mut polygons = Vec::with_capacity(exteriors.len());
    let mut holes = Some(holes);
    for (_, ring) in exteriors {
        let interiors = holes.take().unwrap_or_default();
        polygons.push(Polygon::new(to_world(ring, transform), interiors).orient(Direction::Default));
    }

    polygons
}

#[allow(clippy::cast_precision_loss)]
fn to_world(ring: &[Vertex], transform: &AffineTransform) -> LineString<f64> {
    ring.iter()
        .map(|&(x, y)| transform.apply(x as f64, y as f64))
        .collect::<Vec<Coord<f64>>>()
        .into()
}

#[cfg(test)]
mod tests {
    use geo::{Area, BoundingRect, Contains, Point, Winding};

    use super::*;

    fn mask(width: usize, height: usize, ones: &[(usize, usize)]) -> Grid<u8> {
        let mut grid = Grid::filled(width, height, 0u8);
        for &(col, row) in ones {
            grid.set(col, row, 1);
        }
        grid
    }

    fn block(col: usize, row: usize, w: usize, h: usize) -> Vec<(usize, usize)> {
        (row..row + h)
            .flat_map(|r| (col..col + w).map(move |c| (c, r)))
            .collect()
    }

    #[test]
    fn empty_mask_has_no_polygons() {
        assert!(polygonize(&mask(5, 5, &[]), &AffineTransform::identity()).is_empty());
    }

    #[test]
    fn single_block_is_one_square() {
        let polygons = polygonize(&mask(10, 10, &block(2, 2, 3, 3)), &AffineTransform::identity());
        assert_eq!(polygons.len(), 1);

        let polygon = &polygons[0];
        assert!((polygon.unsigned_area() - 9.0).abs() < 1e-9);
        assert_eq!(polygon.exterior().0.len(), 5);

        let rect = polygon.bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 2.0, y: 2.0 });
        assert_eq!(rect.max(), Coord { x: 5.0, y: 5.0 });
        assert!(polygon.exterior().is_ccw());
    }

    #[test]
    fn diagonal_cells_stay_separate() {
        let polygons = polygonize(&mask(2, 2, &[(0, 0), (1, 1)]), &AffineTransform::identity());
        assert_eq!(polygons.len(), 2);
        for polygon in &polygons {
            assert!((polygon.unsigned_area() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ring_with_hole() {
        let mut ones = block(0, 0, 3, 3);
        ones.retain(|&c| c != (1, 1));
        let polygons = polygonize(&mask(3, 3, &ones), &AffineTransform::identity());

        assert_eq!(polygons.len(), 1);
        let polygon = &polygons[0];
        assert_eq!(polygon.interiors().len(), 1);
        assert!((polygon.unsigned_area() - 8.0).abs() < 1e-9);
        assert!(!polygon.contains(&Point::new(1.5, 1.5)));
        assert!(polygon.contains(&Point::new(0.5, 0.5)));
        assert!(polygon.interiors()[0].is_cw());
    }

    #[test]
    fn hole_touching_exterior_diagonally() {
        // Ring of cells around (1, 1), plus a notch so the hole's corner
        // touches the outside at a single vertex.
        let mut ones = block(0, 0, 4, 4);
        ones.retain(|&c| c != (1, 1) && c != (2, 2) && c != (3, 3));
        let polygons = polygonize(&mask(4, 4, &ones), &AffineTransform::identity());

        let total: f64 = polygons.iter().map(Area::unsigned_area).sum();
        assert!((total - 13.0).abs() < 1e-9);
    }

    #[test]
    fn regions_in_scan_order() {
        let mut ones = block(3, 0, 2, 1);
        ones.extend(block(0, 2, 1, 2));
        let polygons = polygonize(&mask(5, 4, &ones), &AffineTransform::identity());

        assert_eq!(polygons.len(), 2);
        assert!((polygons[0].unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(polygons[0].bounding_rect().unwrap().min(), Coord { x: 3.0, y: 0.0 });
        assert_eq!(polygons[1].bounding_rect().unwrap().min(), Coord { x: 0.0, y: 2.0 });
    }

    #[test]
    fn vertices_go_through_transform() {
        let t = AffineTransform::from_origin(500_000.0, 4_000_000.0, 30.0, 30.0);
        let polygons = polygonize(&mask(4, 4, &block(1, 1, 2, 2)), &t);

        let polygon = &polygons[0];
        assert!((polygon.unsigned_area() - 4.0 * t.cell_area()).abs() < 1e-6);
        let rect = polygon.bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 500_030.0, y: 3_999_910.0 });
        assert_eq!(rect.max(), Coord { x: 500_090.0, y: 3_999_970.0 });
        assert!(polygon.exterior().is_ccw());
    }

    #[test]
    fn union_of_polygons_covers_every_set_cell() {
        let ones = [(0, 0), (1, 0), (3, 0), (0, 1), (2, 2), (3, 2), (3, 3), (1, 3)];
        let polygons = polygonize(&mask(4, 4, &ones), &AffineTransform::identity());

        for row in 0..4 {
            for col in 0..4 {
                #[allow(clippy::cast_precision_loss)]
                let center = Point::new(col as f64 + 0.5, row as f64 + 0.5);
                let covered = polygons.iter().any(|p| p.contains(&center));
                assert_eq!(covered, ones.contains(&(col, row)), "cell ({col}, {row})");
            }
        }
    }

    #[test]
    fn all_ones_mask_covers_extent() {
        let transform = AffineTransform::from_origin(100.0, 50.0, 2.0, 2.0);
        let polygons = polygonize(&Grid::filled(7, 5, 1u8), &transform);

        assert_eq!(polygons.len(), 1);
        let polygon = &polygons[0];
        assert!(polygon.interiors().is_empty());
        assert!((polygon.unsigned_area() - 140.0).abs() < 1e-9);

        let rect = polygon.bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 100.0, y: 40.0 });
        assert_eq!(rect.max(), Coord { x: 114.0, y: 50.0 });
    }

    #[test]
    fn random_masks_preserve_area_and_coverage() {
        // xorshift64, fixed seed
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let transform = AffineTransform::from_origin(10.0, 20.0, 0.5, 0.25);
        for case in 0..25 {
            #[allow(clippy::cast_possible_truncation)]
            let (width, height) = (3 + (next() % 9) as usize, 3 + (next() % 9) as usize);
            let density = 2 + next() % 6;
            let mut grid = Grid::filled(width, height, 0u8);
            for row in 0..height {
                for col in 0..width {
                    if next() % 10 < density {
                        grid.set(col, row, 1);
                    }
                }
            }

            let polygons = polygonize(&grid, &transform);
            let area: f64 = polygons.iter().map(Area::unsigned_area).sum();
            #[allow(clippy::cast_precision_loss)]
            let expected = grid.count(1) as f64 * transform.cell_area();
            assert!((area - expected).abs() < 1e-9, "case {case}: area {area} != {expected}");

            for row in 0..height {
                for col in 0..width {
                    #[allow(clippy::cast_precision_loss)]
                    let center = Point::from(transform.apply(col as f64 + 0.5, row as f64 + 0.5));
                    let hits = polygons.iter().filter(|p| p.contains(&center)).count();
                    let expected = usize::from(grid.get(col, row) == Some(1));
                    assert_eq!(hits, expected, "case {case}: cell ({col}, {row})");
                }
            }
        }
    }
}
