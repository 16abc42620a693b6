//! Per-item output artifacts.

use std::path::Path;

use flood_impact_geography::vector::affected_feature_collection;
use flood_impact_geography_models::{AffectedBuilding, Crs, GeocodedRecord};
use serde_json::Value;

use crate::PipelineError;

/// Clipped flood raster.
pub const CLIPPED_RASTER_FILE: &str = "clipped_flood_map.tif";

/// Affected building table.
pub const CSV_FILE: &str = "affected_buildings.csv";

/// Affected building footprints.
pub const GEOJSON_FILE: &str = "affected_buildings.geojson";

/// Map overlay.
pub const MAP_FILE: &str = "flood_affected_buildings.svg";

/// Columns written before the configured attribute columns.
pub const CSV_BASE_COLUMNS: &[&str] = &[
    "latitude",
    "longitude",
    "zipcode",
    "building_id",
    "flood_polygon_index",
];

/// Writes the affected building table.
///
/// Attribute columns follow [`CSV_BASE_COLUMNS`] in the order given;
/// attributes a building lacks are left empty.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if the file cannot be written.
pub fn write_csv(
    path: &Path,
    records: &[GeocodedRecord],
    attributes: &[String],
) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(
        CSV_BASE_COLUMNS
            .iter()
            .copied()
            .chain(attributes.iter().map(String::as_str)),
    )?;

    for record in records {
        let mut row = vec![
            record.latitude.to_string(),
            record.longitude.to_string(),
            record.zipcode.clone().unwrap_or_default(),
            record.building_id.clone().unwrap_or_default(),
            record.flood_polygon_index.to_string(),
        ];
        row.extend(
            attributes
                .iter()
                .map(|name| record.attributes.get(name).map(cell).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    log::debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Writes affected building footprints as a `GeoJSON` feature collection.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] or [`PipelineError::Json`] if the file
/// cannot be written.
pub fn write_geojson(
    path: &Path,
    affected: &[AffectedBuilding],
    crs: Crs,
) -> Result<(), PipelineError> {
    let collection = affected_feature_collection(affected, crs);
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(file, &collection)?;
    log::debug!("Wrote {} features to {}", affected.len(), path.display());
    Ok(())
}

/// Renders an attribute value as CSV text. Strings are written without
/// quotes, `null` as an empty cell.
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use flood_impact_geography::vector::load_buildings;
    use flood_impact_geography_models::Building;
    use geo::{Geometry, Point};

    use super::*;

    fn record(zipcode: Option<&str>, attributes: Value) -> GeocodedRecord {
        GeocodedRecord {
            latitude: 35.5,
            longitude: -78.25,
            zipcode: zipcode.map(String::from),
            building_index: 0,
            building_id: Some("b0".to_string()),
            flood_polygon_index: 3,
            attributes: attributes.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn csv_has_base_and_attribute_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CSV_FILE);
        let records = vec![
            record(
                Some("27601-1234"),
                serde_json::json!({ "capture_dates_range": "2019-2020", "release": 2 }),
            ),
            record(None, serde_json::json!({ "release": null })),
        ];

        write_csv(
            &path,
            &records,
            &["capture_dates_range".to_string(), "release".to_string()],
        )
        .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<_> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            headers,
            vec![
                "latitude",
                "longitude",
                "zipcode",
                "building_id",
                "flood_polygon_index",
                "capture_dates_range",
                "release"
            ]
        );

        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(
            rows[0],
            vec!["35.5", "-78.25", "27601-1234", "b0", "3", "2019-2020", "2"]
        );
        assert_eq!(rows[1], vec!["35.5", "-78.25", "", "b0", "3", "", ""]);
    }

    #[test]
    fn geojson_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GEOJSON_FILE);
        let affected = vec![AffectedBuilding {
            building_index: 2,
            building: Building {
                id: Some("b2".to_string()),
                geometry: Geometry::Point(Point::new(500_100.0, 3_950_000.0)),
                attributes: serde_json::Map::new(),
            },
            flood_polygon_index: 1,
        }];

        write_geojson(&path, &affected, Crs::from_epsg(32617)).unwrap();

        let loaded = load_buildings(&path).unwrap();
        assert_eq!(loaded.crs, Crs::from_epsg(32617));
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.buildings[0].id.as_deref(), Some("b2"));
        assert_eq!(loaded.buildings[0].attributes["flood_polygon_index"], 1);
    }
}
