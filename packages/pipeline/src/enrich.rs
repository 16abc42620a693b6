//! Centroids and postal codes for affected buildings.

use flood_impact_geocoder::ReverseGeocoder;
use flood_impact_geography::crs::CrsTransformer;
use flood_impact_geography_models::{AffectedBuilding, Crs, GeocodedRecord};
use geo::{Centroid, Coord, Geometry};

use crate::PipelineError;
use crate::config::GeocodingConfig;

/// Computes building centroids as WGS84 latitude/longitude.
pub struct CentroidProjector {
    to_centroid: CrsTransformer,
    to_wgs84: CrsTransformer,
}

impl CentroidProjector {
    /// Projector for geometries in `source`. Centroids are taken in
    /// `centroid_crs` when given, otherwise in `source`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Geo`] if a CRS has no projection.
    pub fn new(source: Crs, centroid_crs: Option<Crs>) -> Result<Self, PipelineError> {
        let working = centroid_crs.unwrap_or(source);
        Ok(Self {
            to_centroid: CrsTransformer::new(source, working)?,
            to_wgs84: CrsTransformer::new(working, Crs::WGS84)?,
        })
    }

    /// Returns `(latitude, longitude)` of the geometry's centroid, or
    /// `None` for an empty geometry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Geo`] if reprojection fails.
    pub fn lat_lon(&self, geometry: &Geometry<f64>) -> Result<Option<(f64, f64)>, PipelineError> {
        let projected = self.to_centroid.transform_geometry(geometry)?;
        let Some(centroid) = projected.centroid() else {
            return Ok(None);
        };
        let Coord { x, y } = self.to_wgs84.transform_coord(centroid.0)?;
        Ok(Some((y, x)))
    }
}

/// Builds one record per affected building and geocodes the first
/// [`GeocodingConfig::lookup_count`] of them.
///
/// Buildings whose centroid cannot be computed are dropped with a
/// warning. Lookup failures leave `zipcode` unset.
///
/// # Errors
///
/// Returns [`PipelineError::Geo`] if no projection exists for the flood
/// CRS or the centroid CRS.
pub async fn build_records(
    affected: &[AffectedBuilding],
    flood_crs: Crs,
    config: &GeocodingConfig,
    geocoder: Option<&dyn ReverseGeocoder>,
) -> Result<Vec<GeocodedRecord>, PipelineError> {
    let projector = CentroidProjector::new(flood_crs, config.centroid_crs)?;

    let mut records = Vec::with_capacity(affected.len());
    for a in affected {
        match projector.lat_lon(&a.building.geometry) {
            Ok(Some((latitude, longitude))) => records.push(GeocodedRecord {
                latitude,
                longitude,
                zipcode: None,
                building_index: a.building_index,
                building_id: a.building.id.clone(),
                flood_polygon_index: a.flood_polygon_index,
                attributes: a.building.attributes.clone(),
            }),
            Ok(None) => {
                log::warn!("Building {} has an empty geometry, skipping", a.building_index);
            }
            Err(e) => {
                log::warn!("No centroid for building {}: {e}", a.building_index);
            }
        }
    }

    if let Some(geocoder) = geocoder {
        geocode_records(&mut records, config, geocoder).await;
    }

    Ok(records)
}

/// Fills `zipcode` for the first records, up to the configured cap.
/// Returns the number of records that received a postal code.
pub async fn geocode_records(
    records: &mut [GeocodedRecord],
    config: &GeocodingConfig,
    geocoder: &dyn ReverseGeocoder,
) -> usize {
    let count = config.lookup_count(records.len());
    if count == 0 {
        return 0;
    }

    log::info!(
        "Geocoding {count} of {} records with {}",
        records.len(),
        geocoder.name()
    );

    let mut found = 0;
    for (i, record) in records.iter_mut().take(count).enumerate() {
        match geocoder.reverse(record.latitude, record.longitude).await {
            Ok(Some(postal)) => {
                log::debug!(
                    "Record {i} ({:.6}, {:.6}) -> {postal}",
                    record.latitude,
                    record.longitude
                );
                record.zipcode = Some(postal.to_string());
                found += 1;
            }
            Ok(None) => {
                log::debug!(
                    "No postal code for record {i} ({:.6}, {:.6})",
                    record.latitude,
                    record.longitude
                );
            }
            Err(e) => {
                log::warn!(
                    "Failed to geocode record {i} ({:.6}, {:.6}): {e}",
                    record.latitude,
                    record.longitude
                );
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use flood_impact_geocoder::{GeocodeError, PostalCode};
    use flood_impact_geography_models::Building;
    use geo::polygon;

    use super::*;

    /// Answers from a script, recording each query.
    struct ScriptedGeocoder {
        answers: Mutex<Vec<Result<Option<PostalCode>, GeocodeError>>>,
        queries: Mutex<Vec<(f64, f64)>>,
    }

    impl ScriptedGeocoder {
        fn new(mut answers: Vec<Result<Option<PostalCode>, GeocodeError>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReverseGeocoder for ScriptedGeocoder {
        async fn reverse(
            &self,
            latitude: f64,
            longitude: f64,
        ) -> Result<Option<PostalCode>, GeocodeError> {
            self.queries.lock().unwrap().push((latitude, longitude));
            self.answers.lock().unwrap().pop().unwrap_or(Ok(None))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn affected(index: usize, x: f64, y: f64) -> AffectedBuilding {
        let mut attributes = serde_json::Map::new();
        attributes.insert("release".to_string(), 2.into());
        AffectedBuilding {
            building_index: index,
            building: Building {
                id: Some(format!("b{index}")),
                geometry: Geometry::Polygon(polygon![
                    (x: x, y: y),
                    (x: x + 2.0, y: y),
                    (x: x + 2.0, y: y + 2.0),
                    (x: x, y: y + 2.0),
                ]),
                attributes,
            },
            flood_polygon_index: 0,
        }
    }

    fn zip(code: &str) -> Result<Option<PostalCode>, GeocodeError> {
        Ok(Some(PostalCode {
            zip: code.to_string(),
            plus4: Some("0001".to_string()),
        }))
    }

    #[test]
    fn wgs84_centroid_is_lat_lon() {
        let projector = CentroidProjector::new(Crs::WGS84, None).unwrap();
        let (lat, lon) = projector
            .lat_lon(&Geometry::Point(geo::Point::new(-78.6, 35.8)))
            .unwrap()
            .unwrap();
        assert!((lat - 35.8).abs() < 1e-12);
        assert!((lon + 78.6).abs() < 1e-12);
    }

    #[test]
    fn projected_centroid_is_converted_to_wgs84() {
        // A point on the UTM 17N central meridian (81°W) at the equator.
        let projector = CentroidProjector::new(Crs::from_epsg(32617), None).unwrap();
        let (lat, lon) = projector
            .lat_lon(&Geometry::Point(geo::Point::new(500_000.0, 0.0)))
            .unwrap()
            .unwrap();
        assert!(lat.abs() < 1e-6, "lat = {lat}");
        assert!((lon + 81.0).abs() < 1e-6, "lon = {lon}");
    }

    #[test]
    fn centroid_crs_round_trips_for_points() {
        let projector =
            CentroidProjector::new(Crs::WGS84, Some(Crs::from_epsg(32617))).unwrap();
        let (lat, lon) = projector
            .lat_lon(&Geometry::Point(geo::Point::new(-78.6, 35.8)))
            .unwrap()
            .unwrap();
        assert!((lat - 35.8).abs() < 1e-6);
        assert!((lon + 78.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn records_without_geocoder_have_no_zipcode() {
        let affected = vec![affected(4, 0.0, 0.0), affected(7, 10.0, 20.0)];
        let records = build_records(&affected, Crs::WGS84, &GeocodingConfig::default(), None)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].building_index, 4);
        assert_eq!(records[0].building_id.as_deref(), Some("b4"));
        assert!((records[0].latitude - 1.0).abs() < 1e-12);
        assert!((records[0].longitude - 1.0).abs() < 1e-12);
        assert!((records[1].latitude - 21.0).abs() < 1e-12);
        assert!(records.iter().all(|r| r.zipcode.is_none()));
        assert_eq!(records[1].attributes["release"], 2);
    }

    #[tokio::test]
    async fn geocoding_stops_at_cap_and_survives_failures() {
        let geocoder = ScriptedGeocoder::new(vec![
            zip("27601"),
            Err(GeocodeError::Status {
                status: 403,
                body: "forbidden".to_string(),
            }),
            zip("27603"),
            zip("27604"),
        ]);
        let config = GeocodingConfig {
            max_lookups: 3,
            ..GeocodingConfig::default()
        };
        let affected: Vec<_> = (0..5).map(|i| affected(i, 0.0, 0.0)).collect();

        let records = build_records(&affected, Crs::WGS84, &config, Some(&geocoder))
            .await
            .unwrap();

        let zips: Vec<_> = records.iter().map(|r| r.zipcode.as_deref()).collect();
        assert_eq!(
            zips,
            vec![Some("27601-0001"), None, Some("27603-0001"), None, None]
        );
        assert_eq!(geocoder.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn disabled_geocoding_makes_no_requests() {
        let geocoder = ScriptedGeocoder::new(vec![zip("27601")]);
        let config = GeocodingConfig {
            enabled: false,
            ..GeocodingConfig::default()
        };
        let mut records = build_records(&[affected(0, 0.0, 0.0)], Crs::WGS84, &config, None)
            .await
            .unwrap();

        assert_eq!(geocode_records(&mut records, &config, &geocoder).await, 0);
        assert!(geocoder.queries.lock().unwrap().is_empty());
    }
}
