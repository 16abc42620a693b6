#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Boundary, building, and coordinate reference system types.
//!
//! These are the read-only inputs of a flood impact run (a state
//! boundary and a building footprint set) plus the records derived from
//! them once flood polygons have been joined against the buildings.

use std::fmt;
use std::str::FromStr;

use geo::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs(u16);

impl Crs {
    /// WGS84 longitude/latitude.
    pub const WGS84: Self = Self(4326);

    /// Web Mercator.
    pub const WEB_MERCATOR: Self = Self(3857);

    /// Creates a CRS from an EPSG code.
    #[must_use]
    pub const fn from_epsg(code: u16) -> Self {
        Self(code)
    }

    /// The EPSG code of this CRS.
    #[must_use]
    pub const fn epsg(self) -> u16 {
        self.0
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Error returned when a CRS identifier cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized CRS identifier: {0:?}")]
pub struct CrsParseError(pub String);

impl FromStr for Crs {
    type Err = CrsParseError;

    /// Accepts `EPSG:32617`, `32617`, `urn:ogc:def:crs:EPSG::32617`,
    /// `urn:ogc:def:crs:EPSG:6.6:32617`, and the `CRS84` aliases of WGS84.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.ends_with("CRS84") {
            return Ok(Self::WGS84);
        }

        let code = if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            upper.rsplit(':').next().unwrap_or_default()
        } else {
            upper.as_str()
        };

        code.trim()
            .parse::<u16>()
            .map(Self)
            .map_err(|_| CrsParseError(trimmed.to_string()))
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// A region boundary (e.g. a state outline) used to clip a flood raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// All boundary parts. May contain overlapping or adjacent polygons;
    /// they are dissolved before use as a mask.
    pub geometry: MultiPolygon<f64>,
    /// CRS the coordinates are expressed in.
    pub crs: Crs,
}

impl Boundary {
    /// Returns `true` if no part has a closed exterior ring with at least
    /// three distinct vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.iter().all(|p| p.exterior().0.len() < 4)
    }
}

/// A single building footprint with its source attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    /// Feature identifier from the source file, if present.
    pub id: Option<String>,
    /// Footprint polygon, multipolygon, or point.
    pub geometry: Geometry<f64>,
    /// Source properties (e.g. `capture_dates_range`, `release`).
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A building dataset sharing one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingSet {
    /// Buildings in source order.
    pub buildings: Vec<Building>,
    /// CRS of every building geometry.
    pub crs: Crs,
}

impl BuildingSet {
    /// Number of buildings in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    /// Returns `true` if the set holds no buildings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

/// A building that satisfied the join predicate against a flood polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct AffectedBuilding {
    /// Position of the building in its source [`BuildingSet`].
    pub building_index: usize,
    /// The building, expressed in the flood polygons' CRS.
    pub building: Building,
    /// Position of the matched polygon in the flood polygon set.
    pub flood_polygon_index: usize,
}

/// An affected building reduced to the fields written to tabular output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedRecord {
    /// Centroid latitude (WGS84).
    pub latitude: f64,
    /// Centroid longitude (WGS84).
    pub longitude: f64,
    /// Postal code, `12345` or `12345-6789`. Unset when geocoding was
    /// skipped or failed for this record.
    pub zipcode: Option<String>,
    /// Position of the building in its source set.
    pub building_index: usize,
    /// Feature identifier of the building, if present.
    pub building_id: Option<String>,
    /// Matched flood polygon index.
    pub flood_polygon_index: usize,
    /// Building attributes carried through from the source.
    pub attributes: serde_json::Map<String, serde_json::Value>,
}
