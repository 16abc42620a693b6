//! `GeoJSON` loading for boundaries and building footprints, and export
//! of affected buildings.
//!
//! RFC 7946 `GeoJSON` is always WGS84, but many GIS exports still carry
//! the pre-RFC `crs` member (e.g. `urn:ogc:def:crs:EPSG::26917`). When it
//! is present it is honored; otherwise the data is taken to be EPSG:4326.

use std::path::Path;

use flood_impact_geography_models::{AffectedBuilding, Boundary, Building, BuildingSet, Crs};
use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, feature::Id};

use crate::GeoError;

/// Loads a boundary file. Every polygon and multipolygon feature becomes a
/// part of the returned [`Boundary`]; other geometry types are skipped.
///
/// # Errors
///
/// Returns [`GeoError`] if the file cannot be read or is not valid
/// `GeoJSON`, or if it declares an unrecognized CRS.
pub fn load_boundary(path: &Path) -> Result<Boundary, GeoError> {
    let text = std::fs::read_to_string(path)?;
    let boundary = parse_boundary(&text)?;
    log::info!(
        "Loaded boundary {} ({} parts, {})",
        path.display(),
        boundary.geometry.0.len(),
        boundary.crs
    );
    Ok(boundary)
}

/// Parses boundary `GeoJSON` text. See [`load_boundary`].
///
/// # Errors
///
/// Returns [`GeoError`] on malformed `GeoJSON` or an unrecognized CRS.
pub fn parse_boundary(text: &str) -> Result<Boundary, GeoError> {
    let geojson: GeoJson = text.parse()?;
    let crs = declared_crs(&geojson)?;

    let mut polygons = Vec::new();
    for geometry in geometries(geojson) {
        match Geometry::<f64>::try_from(geometry)? {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp),
            other => {
                log::warn!("Skipping non-polygon boundary geometry: {}", geometry_name(&other));
            }
        }
    }

    Ok(Boundary {
        geometry: MultiPolygon::new(polygons),
        crs,
    })
}

/// Loads a building footprint file.
///
/// Features without a geometry are skipped.
///
/// # Errors
///
/// Returns [`GeoError`] if the file cannot be read or is not valid
/// `GeoJSON`, or if it declares an unrecognized CRS.
pub fn load_buildings(path: &Path) -> Result<BuildingSet, GeoError> {
    let text = std::fs::read_to_string(path)?;
    let buildings = parse_buildings(&text)?;
    log::info!(
        "Loaded {} buildings from {} ({})",
        buildings.len(),
        path.display(),
        buildings.crs
    );
    Ok(buildings)
}

/// Parses building `GeoJSON` text. See [`load_buildings`].
///
/// # Errors
///
/// Returns [`GeoError`] on malformed `GeoJSON` or an unrecognized CRS.
pub fn parse_buildings(text: &str) -> Result<BuildingSet, GeoError> {
    let geojson: GeoJson = text.parse()?;
    let crs = declared_crs(&geojson)?;

    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    };

    let mut buildings = Vec::with_capacity(features.len());
    let mut skipped = 0usize;

    for feature in features {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };

        buildings.push(Building {
            id: feature.id.map(|id| match id {
                Id::String(s) => s,
                Id::Number(n) => n.to_string(),
            }),
            geometry: Geometry::try_from(geometry)?,
            attributes: feature.properties.unwrap_or_default(),
        });
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} building features without geometry");
    }

    Ok(BuildingSet { buildings, crs })
}

/// Builds a `FeatureCollection` of affected buildings with the join
/// metadata added to each feature's properties.
///
/// A legacy `crs` member is written when `crs` is not WGS84 so the file
/// round-trips through [`load_buildings`].
#[must_use]
pub fn affected_feature_collection(affected: &[AffectedBuilding], crs: Crs) -> FeatureCollection {
    let features = affected
        .iter()
        .map(|a| {
            let mut properties = a.building.attributes.clone();
            properties.insert("building_index".to_string(), a.building_index.into());
            properties.insert(
                "flood_polygon_index".to_string(),
                a.flood_polygon_index.into(),
            );

            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &a.building.geometry,
                ))),
                id: a.building.id.clone().map(Id::String),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: (crs != Crs::WGS84).then(|| crs_member(crs)),
    }
}

/// Builds the legacy named-CRS member for `crs`.
fn crs_member(crs: Crs) -> JsonObject {
    let mut member = JsonObject::new();
    member.insert(
        "crs".to_string(),
        serde_json::json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg()) }
        }),
    );
    member
}

/// Reads the legacy `crs` member, defaulting to WGS84.
///
/// Supports the `name` form (`{"type":"name","properties":{"name":...}}`)
/// and the older `EPSG` form (`{"type":"EPSG","properties":{"code":...}}`).
fn declared_crs(geojson: &GeoJson) -> Result<Crs, GeoError> {
    let members = match geojson {
        GeoJson::FeatureCollection(fc) => fc.foreign_members.as_ref(),
        GeoJson::Feature(f) => f.foreign_members.as_ref(),
        GeoJson::Geometry(g) => g.foreign_members.as_ref(),
    };

    let Some(crs) = members.and_then(|m| m.get("crs")) else {
        return Ok(Crs::WGS84);
    };

    let properties = &crs["properties"];
    if let Some(name) = properties["name"].as_str() {
        return Ok(name.parse()?);
    }
    if let Some(code) = properties["code"].as_u64() {
        return Ok(code.to_string().parse()?);
    }

    log::warn!("Unrecognized crs member {crs}, assuming EPSG:4326");
    Ok(Crs::WGS84)
}

/// Flattens any `GeoJSON` document into its non-null geometries.
fn geometries(geojson: GeoJson) -> Vec<geojson::Geometry> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::Geometry(g) => vec![g],
    }
}

const fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
