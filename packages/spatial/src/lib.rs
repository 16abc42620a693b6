#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial join of building footprints against flood polygons.
//!
//! Flood polygons are bulk-loaded into an R-tree; each building is looked
//! up by its bounding box and then confirmed with the exact predicate.
//! Buildings are reprojected into the flood polygons' CRS when the two
//! differ, never the other way around.

use std::fmt;
use std::str::FromStr;

use flood_impact_geography::GeoError;
use flood_impact_geography::crs::CrsTransformer;
use flood_impact_geography_models::{AffectedBuilding, Building, BuildingSet, Crs};
use geo::{BoundingRect, Geometry, Intersects, Polygon, Relate, Rect};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while joining.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// No transformer exists between the building and flood CRSs.
    #[error(transparent)]
    Geo(#[from] GeoError),
}

/// Geometric relationship a building must have with a flood polygon to
/// count as affected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialPredicate {
    /// Any shared point, including touching boundaries.
    #[default]
    Intersects,
    /// The building lies entirely inside the polygon.
    Within,
    /// The building entirely contains the polygon.
    Contains,
}

impl SpatialPredicate {
    /// Evaluates the predicate for `building` against `polygon`.
    #[must_use]
    pub fn evaluate(self, building: &Geometry<f64>, polygon: &Polygon<f64>) -> bool {
        match self {
            Self::Intersects => building.intersects(polygon),
            Self::Within => building.relate(polygon).is_within(),
            Self::Contains => building.relate(polygon).is_contains(),
        }
    }
}

impl fmt::Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intersects => "intersects",
            Self::Within => "within",
            Self::Contains => "contains",
        })
    }
}

impl FromStr for SpatialPredicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intersects" => Ok(Self::Intersects),
            "within" => Ok(Self::Within),
            "contains" => Ok(Self::Contains),
            other => Err(format!(
                "Unknown spatial predicate '{other}' (expected intersects, within, or contains)"
            )),
        }
    }
}

/// Join configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Predicate a building must satisfy.
    pub predicate: SpatialPredicate,
    /// Keep only the first (lowest-index) matching polygon per building.
    /// When `false`, a building matching several polygons appears once
    /// per match.
    pub dedupe: bool,
}

/// A flood polygon stored in the R-tree with its position in the input.
struct FloodEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for FloodEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree index over a set of flood polygons.
pub struct FloodIndex {
    tree: RTree<FloodEntry>,
    crs: Crs,
}

impl FloodIndex {
    /// Bulk-loads `polygons` (expressed in `crs`) into an R-tree.
    ///
    /// Polygons without a bounding box (no coordinates) are left out.
    #[must_use]
    pub fn new(polygons: &[Polygon<f64>], crs: Crs) -> Self {
        let entries = polygons
            .iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                let rect = polygon.bounding_rect()?;
                Some(FloodEntry {
                    index,
                    envelope: envelope(rect),
                    polygon: polygon.clone(),
                })
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::debug!("Indexed {} flood polygons", tree.size());

        Self { tree, crs }
    }

    /// CRS of the indexed polygons.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if no polygons are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Indices of every polygon satisfying `predicate` with `geometry`,
    /// in ascending order.
    #[must_use]
    pub fn matches(&self, geometry: &Geometry<f64>, predicate: SpatialPredicate) -> Vec<usize> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };

        let mut indices: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .filter(|entry| predicate.evaluate(geometry, &entry.polygon))
            .map(|entry| entry.index)
            .collect();
        indices.sort_unstable();
        indices
    }
}

/// Finds every building that satisfies the join predicate against at
/// least one flood polygon.
///
/// Rows are ordered by building index, then polygon index. Affected
/// buildings carry their geometry in `flood_crs`. An empty result is a
/// normal outcome.
///
/// # Errors
///
/// Returns [`SpatialError::Geo`] if no projection exists between the
/// building CRS and `flood_crs`.
pub fn join_affected(
    buildings: &BuildingSet,
    flood_polygons: &[Polygon<f64>],
    flood_crs: Crs,
    options: &JoinOptions,
) -> Result<Vec<AffectedBuilding>, SpatialError> {
    if buildings.is_empty() || flood_polygons.is_empty() {
        return Ok(Vec::new());
    }

    let transformer = CrsTransformer::new(buildings.crs, flood_crs)?;
    if !transformer.is_identity() {
        log::info!(
            "Reprojecting {} buildings from {} to {}",
            buildings.len(),
            buildings.crs,
            flood_crs
        );
    }

    let index = FloodIndex::new(flood_polygons, flood_crs);
    let mut affected = Vec::new();
    let mut unprojectable = 0usize;

    for (building_index, building) in buildings.buildings.iter().enumerate() {
        let geometry = match transformer.transform_geometry(&building.geometry) {
            Ok(geometry) => geometry,
            Err(e) => {
                log::debug!("Skipping building {building_index}: {e}");
                unprojectable += 1;
                continue;
            }
        };

        let mut matches = index.matches(&geometry, options.predicate);
        if matches.is_empty() {
            continue;
        }
        if options.dedupe {
            matches.truncate(1);
        }

        let projected = Building {
            geometry,
            ..building.clone()
        };
        affected.extend(matches.into_iter().map(|flood_polygon_index| AffectedBuilding {
            building_index,
            building: projected.clone(),
            flood_polygon_index,
        }));
    }

    if unprojectable > 0 {
        log::warn!("{unprojectable} buildings could not be reprojected to {flood_crs} and were skipped");
    }

    log::info!(
        "{} affected rows from {} buildings against {} flood polygons ({})",
        affected.len(),
        buildings.len(),
        flood_polygons.len(),
        options.predicate
    );

    Ok(affected)
}

fn envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

#[cfg(test)]
mod tests {
    use geo::{Point, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]
    }

    fn building(geometry: Geometry<f64>) -> Building {
        Building {
            id: None,
            geometry,
            attributes: serde_json::Map::new(),
        }
    }

    fn set(geometries: Vec<Geometry<f64>>, crs: Crs) -> BuildingSet {
        BuildingSet {
            buildings: geometries.into_iter().map(building).collect(),
            crs,
        }
    }

    #[test]
    fn disjoint_geometries_yield_nothing() {
        let buildings = set(vec![square(10.0, 10.0, 11.0, 11.0).into()], Crs::WGS84);
        let flood = vec![square(0.0, 0.0, 1.0, 1.0)];
        let affected =
            join_affected(&buildings, &flood, Crs::WGS84, &JoinOptions::default()).unwrap();
        assert!(affected.is_empty());
    }

    #[test]
    fn scenario_overlap_and_miss() {
        let buildings = set(
            vec![
                square(1.0, 1.0, 3.0, 3.0).into(),
                square(8.0, 8.0, 9.0, 9.0).into(),
            ],
            Crs::WGS84,
        );
        let flood = vec![square(2.0, 2.0, 5.0, 5.0)];

        let affected =
            join_affected(&buildings, &flood, Crs::WGS84, &JoinOptions::default()).unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].building_index, 0);
        assert_eq!(affected[0].flood_polygon_index, 0);
    }

    #[test]
    fn touching_boundary_counts_as_intersecting() {
        let buildings = set(vec![Point::new(1.0, 0.5).into()], Crs::WGS84);
        let flood = vec![square(0.0, 0.0, 1.0, 1.0)];
        let affected =
            join_affected(&buildings, &flood, Crs::WGS84, &JoinOptions::default()).unwrap();
        assert_eq!(affected.len(), 1);
    }

    #[test]
    fn duplicates_preserved_unless_deduped() {
        let buildings = set(vec![square(0.0, 0.0, 4.0, 1.0).into()], Crs::WGS84);
        let flood = vec![square(3.0, 0.0, 5.0, 1.0), square(-1.0, 0.0, 1.0, 1.0)];

        let affected =
            join_affected(&buildings, &flood, Crs::WGS84, &JoinOptions::default()).unwrap();
        let matched: Vec<_> = affected.iter().map(|a| a.flood_polygon_index).collect();
        assert_eq!(matched, vec![0, 1]);

        let options = JoinOptions {
            dedupe: true,
            ..JoinOptions::default()
        };
        let deduped = join_affected(&buildings, &flood, Crs::WGS84, &options).unwrap();
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].flood_polygon_index, 0);
    }

    #[test]
    fn identical_sets_give_one_row_per_match() {
        let squares = vec![square(0.0, 0.0, 1.0, 1.0), square(5.0, 5.0, 6.0, 6.0)];
        let buildings = set(
            squares.iter().cloned().map(Geometry::from).collect(),
            Crs::WGS84,
        );

        let affected =
            join_affected(&buildings, &squares, Crs::WGS84, &JoinOptions::default()).unwrap();
        let pairs: Vec<_> = affected
            .iter()
            .map(|a| (a.building_index, a.flood_polygon_index))
            .collect();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn within_and_contains() {
        let flood = vec![square(0.0, 0.0, 10.0, 10.0)];
        let buildings = set(
            vec![
                square(1.0, 1.0, 2.0, 2.0).into(),
                square(-5.0, -5.0, 20.0, 20.0).into(),
                square(9.0, 9.0, 11.0, 11.0).into(),
            ],
            Crs::WGS84,
        );

        let within = JoinOptions {
            predicate: SpatialPredicate::Within,
            dedupe: false,
        };
        let rows = join_affected(&buildings, &flood, Crs::WGS84, &within).unwrap();
        assert_eq!(rows.iter().map(|a| a.building_index).collect::<Vec<_>>(), vec![0]);

        let contains = JoinOptions {
            predicate: SpatialPredicate::Contains,
            dedupe: false,
        };
        let rows = join_affected(&buildings, &flood, Crs::WGS84, &contains).unwrap();
        assert_eq!(rows.iter().map(|a| a.building_index).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn reprojects_buildings_like_manual_reprojection() {
        let utm = Crs::from_epsg(32617);
        let to_utm = CrsTransformer::new(Crs::WGS84, utm).unwrap();

        // Flood polygons in UTM 17N around Raleigh.
        let centre = to_utm
            .transform_coord(geo::Coord { x: -78.64, y: 35.78 })
            .unwrap();
        let flood = vec![
            square(centre.x - 500.0, centre.y - 500.0, centre.x + 500.0, centre.y + 500.0),
            square(centre.x + 2_000.0, centre.y, centre.x + 3_000.0, centre.y + 1_000.0),
        ];

        let wgs84 = set(
            vec![
                Point::new(-78.64, 35.78).into(),
                Point::new(-78.70, 35.90).into(),
                square(-78.641, 35.779, -78.639, 35.781).into(),
            ],
            Crs::WGS84,
        );
        let manual = BuildingSet {
            buildings: wgs84
                .buildings
                .iter()
                .map(|b| building(to_utm.transform_geometry(&b.geometry).unwrap()))
                .collect(),
            crs: utm,
        };

        let options = JoinOptions::default();
        let reconciled = join_affected(&wgs84, &flood, utm, &options).unwrap();
        let expected = join_affected(&manual, &flood, utm, &options).unwrap();

        let key = |rows: &[AffectedBuilding]| {
            rows.iter()
                .map(|a| (a.building_index, a.flood_polygon_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&reconciled), key(&expected));
        assert_eq!(key(&reconciled), vec![(0, 0), (2, 0)]);
        assert_eq!(reconciled[0].building.geometry, expected[0].building.geometry);
    }

    #[test]
    fn predicate_parsing() {
        assert_eq!("Within".parse::<SpatialPredicate>().unwrap(), SpatialPredicate::Within);
        assert!("touches".parse::<SpatialPredicate>().is_err());
        assert_eq!(SpatialPredicate::Contains.to_string(), "contains");
    }
}
