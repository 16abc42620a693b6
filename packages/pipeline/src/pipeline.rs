//! Analysis of a single work item.

use std::fmt;
use std::path::{Path, PathBuf};

use flood_impact_geocoder::ReverseGeocoder;
use flood_impact_geography::vector::{load_boundary, load_buildings};
use flood_impact_geography_models::{AffectedBuilding, GeocodedRecord};
use flood_impact_raster::geotiff::{read_geotiff, write_geotiff};
use flood_impact_raster::{Raster, RasterError, clip_with_boundary, polygonize};
use flood_impact_spatial::join_affected;
use geo::{MultiPolygon, Polygon};

use crate::config::PipelineConfig;
use crate::discover::WorkItem;
use crate::output::{
    CLIPPED_RASTER_FILE, CSV_FILE, GEOJSON_FILE, MAP_FILE, write_csv, write_geojson,
};
use crate::render::{MapLayers, write_map};
use crate::{PipelineError, enrich};

/// Shared inputs for every work item of a run.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    /// Run configuration.
    pub config: &'a PipelineConfig,
    /// Reverse geocoder, or `None` to skip postal codes.
    pub geocoder: Option<&'a dyn ReverseGeocoder>,
}

impl<'a> PipelineContext<'a> {
    /// Context without geocoding.
    #[must_use]
    pub const fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            geocoder: None,
        }
    }

    /// Sets the reverse geocoder.
    #[must_use]
    pub const fn with_geocoder(mut self, geocoder: &'a dyn ReverseGeocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }
}

/// Everything derived from one work item.
#[derive(Debug)]
pub struct Analysis {
    /// Raster cropped and masked to the boundary.
    pub clipped: Raster,
    /// Boundary in the raster CRS.
    pub boundary: MultiPolygon<f64>,
    /// Newly-flooded polygons in the raster CRS.
    pub flood_polygons: Vec<Polygon<f64>>,
    /// Join rows, in the raster CRS.
    pub affected: Vec<AffectedBuilding>,
    /// One record per affected row with a centroid.
    pub records: Vec<GeocodedRecord>,
}

impl Analysis {
    /// Number of records that received a postal code.
    #[must_use]
    pub fn geocoded(&self) -> usize {
        self.records.iter().filter(|r| r.zipcode.is_some()).count()
    }
}

/// Result of running one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Outputs were written.
    Completed {
        /// Final output directory.
        output_dir: PathBuf,
        /// Number of flood polygons.
        flood_polygons: usize,
        /// Number of join rows.
        affected: usize,
        /// Number of records with a postal code.
        geocoded: usize,
    },
    /// An input was missing or unusable.
    Skipped {
        /// Why the item was skipped.
        reason: String,
    },
    /// The boundary does not overlap the raster.
    NoOverlap,
    /// No newly-flooded pixels inside the boundary.
    NoFloodPolygons,
    /// No building satisfies the join predicate.
    NoAffectedBuildings,
    /// An unexpected error. Nothing was written.
    Failed {
        /// Error message.
        error: String,
    },
}

impl PairOutcome {
    /// Maps a pipeline error to its outcome.
    #[must_use]
    pub fn from_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::Raster(RasterError::NoOverlap) => Self::NoOverlap,
            PipelineError::NoFloodPolygons => Self::NoFloodPolygons,
            PipelineError::NoAffectedBuildings => Self::NoAffectedBuildings,
            PipelineError::MissingInput { .. }
            | PipelineError::Raster(
                RasterError::Geometry { .. }
                | RasterError::InsufficientBands { .. }
                | RasterError::MissingBandRole { .. }
                | RasterError::MissingGeoreference { .. }
                | RasterError::Unsupported { .. },
            ) => Self::Skipped {
                reason: error.to_string(),
            },
            other => Self::Failed {
                error: other.to_string(),
            },
        }
    }

    /// Short name for summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Skipped { .. } => "skipped",
            Self::NoOverlap => "no overlap",
            Self::NoFloodPolygons => "no flood polygons",
            Self::NoAffectedBuildings => "no affected buildings",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed {
                output_dir,
                flood_polygons,
                affected,
                geocoded,
            } => write!(
                f,
                "{affected} affected buildings across {flood_polygons} flood polygons \
                 ({geocoded} geocoded) in {}",
                output_dir.display()
            ),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            other => f.write_str(other.kind()),
        }
    }
}

/// Runs the analysis steps for one work item without writing anything.
///
/// # Errors
///
/// * [`PipelineError::MissingInput`] if an input file does not exist
/// * [`PipelineError::Raster`] for unreadable rasters, unresolvable band
///   roles, an empty boundary, or no overlap
/// * [`PipelineError::NoFloodPolygons`] / [`PipelineError::NoAffectedBuildings`]
///   for empty intermediate results
/// * [`PipelineError::Geo`] / [`PipelineError::Spatial`] for vector
///   loading and reprojection failures
pub async fn analyze(
    item: &WorkItem,
    ctx: &PipelineContext<'_>,
) -> Result<Analysis, PipelineError> {
    if let Some(missing) = item.missing_input() {
        return Err(missing);
    }

    let config = ctx.config;

    let boundary = load_boundary(&item.boundary)?;
    let raster = read_geotiff(&item.raster)?;
    log::info!(
        "[{}] Raster {}x{} with {} bands ({})",
        item.label,
        raster.width(),
        raster.height(),
        raster.band_count(),
        raster.crs()
    );

    config.band_roles.resolve(&raster)?;

    let (clipped, boundary) = clip_with_boundary(&raster, &boundary)?;
    drop(raster);
    log::info!(
        "[{}] Clipped to {}x{}",
        item.label,
        clipped.width(),
        clipped.height()
    );

    let mask = config.band_roles.extract(&clipped)?;
    let flood_polygons = polygonize(&mask, clipped.transform());
    log::info!(
        "[{}] {} flooded pixels in {} polygons",
        item.label,
        mask.count(1),
        flood_polygons.len()
    );
    if flood_polygons.is_empty() {
        return Err(PipelineError::NoFloodPolygons);
    }

    let buildings = load_buildings(&item.buildings)?;
    let affected = join_affected(&buildings, &flood_polygons, clipped.crs(), &config.join)?;
    log::info!(
        "[{}] {} of {} buildings affected ({} rows)",
        item.label,
        count_distinct_buildings(&affected),
        buildings.len(),
        affected.len()
    );
    if affected.is_empty() {
        return Err(PipelineError::NoAffectedBuildings);
    }

    let records =
        enrich::build_records(&affected, clipped.crs(), &config.geocoding, ctx.geocoder).await?;

    Ok(Analysis {
        clipped,
        boundary,
        flood_polygons,
        affected,
        records,
    })
}

/// Runs one work item end to end: analysis, then outputs.
///
/// Artifacts are written to `{output_root}/{label}.partial/` and the
/// directory is renamed to `{output_root}/{label}/` once every artifact
/// is on disk. On any failure the staging directory is removed.
pub async fn run_item(
    item: &WorkItem,
    output_root: &Path,
    ctx: &PipelineContext<'_>,
) -> PairOutcome {
    log::info!("[{}] Processing", item.label);

    let analysis = match analyze(item, ctx).await {
        Ok(analysis) => analysis,
        Err(e) => {
            let outcome = PairOutcome::from_error(&e);
            match &outcome {
                PairOutcome::Failed { .. } => log::error!("[{}] {e}", item.label),
                PairOutcome::Skipped { .. } => log::warn!("[{}] Skipping: {e}", item.label),
                _ => log::info!("[{}] {e}", item.label),
            }
            return outcome;
        }
    };

    let output_dir = output_root.join(&item.label);
    let staging = output_root.join(format!("{}.partial", item.label));

    match write_staged(item, &analysis, ctx.config, &staging, &output_dir) {
        Ok(()) => {
            let outcome = PairOutcome::Completed {
                output_dir,
                flood_polygons: analysis.flood_polygons.len(),
                affected: analysis.affected.len(),
                geocoded: analysis.geocoded(),
            };
            log::info!("[{}] {outcome}", item.label);
            outcome
        }
        Err(e) => {
            log::error!("[{}] Failed to write outputs: {e}", item.label);
            if staging.exists() {
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    log::warn!(
                        "[{}] Could not remove {}: {cleanup}",
                        item.label,
                        staging.display()
                    );
                }
            }
            PairOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn write_staged(
    item: &WorkItem,
    analysis: &Analysis,
    config: &PipelineConfig,
    staging: &Path,
    output_dir: &Path,
) -> Result<(), PipelineError> {
    if staging.exists() {
        std::fs::remove_dir_all(staging)?;
    }
    std::fs::create_dir_all(staging)?;

    write_outputs(item, analysis, config, staging)?;

    replace_dir(staging, output_dir)?;
    Ok(())
}

/// Moves `staging` to `output_dir`. An existing `output_dir` is moved
/// aside first and only deleted once the new directory is in place; if
/// the move fails it is put back.
fn replace_dir(staging: &Path, output_dir: &Path) -> std::io::Result<()> {
    if !output_dir.exists() {
        return std::fs::rename(staging, output_dir);
    }

    log::debug!("Replacing {}", output_dir.display());
    let previous = staging.with_extension("previous");
    if previous.exists() {
        std::fs::remove_dir_all(&previous)?;
    }
    std::fs::rename(output_dir, &previous)?;
    if let Err(e) = std::fs::rename(staging, output_dir) {
        if let Err(restore) = std::fs::rename(&previous, output_dir) {
            log::warn!(
                "Could not restore {} from {}: {restore}",
                output_dir.display(),
                previous.display()
            );
        }
        return Err(e);
    }
    std::fs::remove_dir_all(&previous)
}

/// Writes every enabled artifact of `analysis` into `dir`.
///
/// # Errors
///
/// Returns the first error hit while writing.
pub fn write_outputs(
    item: &WorkItem,
    analysis: &Analysis,
    config: &PipelineConfig,
    dir: &Path,
) -> Result<(), PipelineError> {
    let output = &config.output;

    if output.clipped_raster {
        write_geotiff(&dir.join(CLIPPED_RASTER_FILE), &analysis.clipped)?;
    }

    write_csv(&dir.join(CSV_FILE), &analysis.records, &output.attributes)?;

    if output.geojson {
        write_geojson(
            &dir.join(GEOJSON_FILE),
            &analysis.affected,
            analysis.clipped.crs(),
        )?;
    }

    if output.map {
        let title = output.map_title.replace("{label}", &item.label);
        let layers = MapLayers {
            title: &title,
            boundary: &analysis.boundary,
            flood_polygons: &analysis.flood_polygons,
            buildings: analysis
                .affected
                .iter()
                .map(|a| &a.building.geometry)
                .collect(),
        };
        write_map(
            &dir.join(MAP_FILE),
            &layers,
            output.map_width,
            output.map_height,
        )?;
    }

    Ok(())
}

fn count_distinct_buildings(affected: &[AffectedBuilding]) -> usize {
    let mut indices: Vec<_> = affected.iter().map(|a| a.building_index).collect();
    indices.dedup();
    indices.len()
}

#[cfg(test)]
mod tests {
    use flood_impact_geography_models::{Building, BuildingSet, Crs};
    use flood_impact_raster::{AffineTransform, Grid};
    use flood_impact_spatial::JoinOptions;
    use geo::{BoundingRect, Coord, Geometry, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]
        .into()
    }

    #[test]
    fn flooded_block_catches_overlapping_building_only() {
        let mut mask = Grid::filled(10, 10, 0u8);
        for row in 2..5 {
            for col in 2..5 {
                mask.set(col, row, 1);
            }
        }

        let flood = polygonize(&mask, &AffineTransform::identity());
        assert_eq!(flood.len(), 1);
        let rect = flood[0].bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 2.0, y: 2.0 });
        assert_eq!(rect.max(), Coord { x: 5.0, y: 5.0 });

        let buildings = BuildingSet {
            buildings: [square(1.0, 1.0, 3.0, 3.0), square(8.0, 8.0, 9.0, 9.0)]
                .into_iter()
                .map(|geometry| Building {
                    id: None,
                    geometry,
                    attributes: serde_json::Map::new(),
                })
                .collect(),
            crs: Crs::WGS84,
        };

        let affected =
            join_affected(&buildings, &flood, Crs::WGS84, &JoinOptions::default()).unwrap();
        let indices: Vec<_> = affected.iter().map(|a| a.building_index).collect();
        assert_eq!(indices, vec![0]);
        assert_eq!(count_distinct_buildings(&affected), 1);
    }

    #[test]
    fn replace_dir_swaps_in_new_output() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("item.partial");
        let output = root.path().join("item");

        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("stale.txt"), "old").unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("fresh.txt"), "new").unwrap();

        replace_dir(&staging, &output).unwrap();

        assert!(output.join("fresh.txt").exists());
        assert!(!output.join("stale.txt").exists());
        assert!(!staging.exists());
        assert!(!root.path().join("item.previous").exists());
    }

    #[test]
    fn replace_dir_keeps_previous_output_when_staging_is_missing() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("item.partial");
        let output = root.path().join("item");

        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("kept.txt"), "old").unwrap();

        assert!(replace_dir(&staging, &output).is_err());
        assert!(output.join("kept.txt").exists());
        assert!(!root.path().join("item.previous").exists());
    }

    #[test]
    fn replace_dir_without_existing_output() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("item.partial");
        let output = root.path().join("item");
        std::fs::create_dir_all(&staging).unwrap();

        replace_dir(&staging, &output).unwrap();
        assert!(output.is_dir());
        assert!(!staging.exists());
    }
}
