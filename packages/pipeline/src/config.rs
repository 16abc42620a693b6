//! Pipeline configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives
//! the behavior the pipeline was originally built for:
//!
//! ```toml
//! [band_roles]
//! flood_extent = 1
//! permanent_water = 5
//!
//! [join]
//! predicate = "intersects"
//! dedupe = false
//!
//! [buildings]
//! suffix = "_buildings"
//! extension = "geojson"
//!
//! [output]
//! attributes = ["capture_dates_range", "release"]
//!
//! [geocoding]
//! enabled = true
//! service = "geocodio"
//! max_lookups = 10
//! centroid_crs = "EPSG:32617"
//! ```

use std::path::Path;

use flood_impact_geography_models::Crs;
use flood_impact_raster::BandRoles;
use flood_impact_spatial::JoinOptions;
use serde::{Deserialize, Serialize};

use crate::PipelineError;
use crate::discover::BuildingPathConvention;

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Flood extent and permanent water band numbers.
    pub band_roles: BandRoles,
    /// Spatial join predicate and duplicate policy.
    pub join: JoinOptions,
    /// Where to find the building file for a boundary.
    pub buildings: BuildingPathConvention,
    /// Which artifacts to write and how.
    pub output: OutputConfig,
    /// Centroid and reverse geocoding settings.
    pub geocoding: GeocodingConfig,
}

impl PipelineConfig {
    /// Loads a config file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or
    /// [`PipelineError::Config`] if it is not a valid config.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses config TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] on invalid TOML or unknown values.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(text)?)
    }
}

/// Output artifact settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Building attributes written as extra CSV columns, in order.
    pub attributes: Vec<String>,
    /// Write `clipped_flood_map.tif`.
    pub clipped_raster: bool,
    /// Write `affected_buildings.geojson`.
    pub geojson: bool,
    /// Write `flood_affected_buildings.svg`.
    pub map: bool,
    /// Map canvas width in pixels.
    pub map_width: u32,
    /// Map canvas height in pixels.
    pub map_height: u32,
    /// Map title. `{label}` is replaced with the work item label.
    pub map_title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            attributes: vec!["capture_dates_range".to_string(), "release".to_string()],
            clipped_raster: true,
            geojson: true,
            map: true,
            map_width: 1000,
            map_height: 800,
            map_title: "Flood-Affected Buildings ({label})".to_string(),
        }
    }
}

/// Centroid and reverse geocoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Look up postal codes for affected buildings.
    pub enabled: bool,
    /// Registry id of the geocoding service.
    pub service: String,
    /// Maximum lookups per work item. `0` means no cap.
    pub max_lookups: usize,
    /// Projected CRS to compute centroids in before converting them to
    /// WGS84. When unset, centroids are computed in the flood CRS.
    pub centroid_crs: Option<Crs>,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service: "geocodio".to_string(),
            max_lookups: 10,
            centroid_crs: None,
        }
    }
}

impl GeocodingConfig {
    /// Number of records to geocode out of `available`.
    #[must_use]
    pub fn lookup_count(&self, available: usize) -> usize {
        if !self.enabled {
            0
        } else if self.max_lookups == 0 {
            available
        } else {
            available.min(self.max_lookups)
        }
    }
}

#[cfg(test)]
mod tests {
    use flood_impact_spatial::SpatialPredicate;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::parse("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.band_roles.flood_extent, 1);
        assert_eq!(config.band_roles.permanent_water, 5);
        assert_eq!(config.join.predicate, SpatialPredicate::Intersects);
        assert!(!config.join.dedupe);
        assert_eq!(config.geocoding.max_lookups, 10);
        assert_eq!(
            config.output.attributes,
            vec!["capture_dates_range", "release"]
        );
    }

    #[test]
    fn parses_overrides() {
        let config = PipelineConfig::parse(
            r#"
            [band_roles]
            flood_extent = 2
            permanent_water = 3

            [join]
            predicate = "within"
            dedupe = true

            [buildings]
            directory = "/data/buildings"
            suffix = "_footprints"

            [output]
            attributes = ["height"]
            map = false

            [geocoding]
            enabled = false
            centroid_crs = "EPSG:32617"
            "#,
        )
        .unwrap();

        assert_eq!(config.band_roles.permanent_water, 3);
        assert_eq!(config.join.predicate, SpatialPredicate::Within);
        assert!(config.join.dedupe);
        assert_eq!(config.buildings.suffix, "_footprints");
        assert_eq!(config.buildings.extension, "geojson");
        assert_eq!(config.output.attributes, vec!["height"]);
        assert!(!config.output.map);
        assert!(config.output.geojson);
        assert!(!config.geocoding.enabled);
        assert_eq!(config.geocoding.centroid_crs, Some(Crs::from_epsg(32617)));
    }

    #[test]
    fn rejects_unknown_predicate() {
        let result = PipelineConfig::parse("[join]\npredicate = \"touches\"\n");
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn lookup_count_respects_cap() {
        let mut geocoding = GeocodingConfig::default();
        assert_eq!(geocoding.lookup_count(25), 10);
        assert_eq!(geocoding.lookup_count(3), 3);

        geocoding.max_lookups = 0;
        assert_eq!(geocoding.lookup_count(25), 25);

        geocoding.enabled = false;
        assert_eq!(geocoding.lookup_count(25), 0);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flood_impact.toml");
        std::fs::write(&path, "[geocoding]\nmax_lookups = 3\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.geocoding.max_lookups, 3);

        let missing = PipelineConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(PipelineError::Io(_))));
    }
}
