//! Work items and filesystem discovery.
//!
//! The orchestrator only consumes [`WorkItem`]s. This module is one way
//! of producing them: list raster and boundary files, pair every raster
//! with every boundary, and derive each boundary's building file through
//! a [`BuildingPathConvention`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// File extensions recognized as flood rasters.
pub const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// File extensions recognized as boundaries.
pub const BOUNDARY_EXTENSIONS: &[&str] = &["geojson", "json"];

/// One (raster, boundary, buildings) triple to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Name of the output directory for this item.
    pub label: String,
    /// Flood raster.
    pub raster: PathBuf,
    /// Region boundary.
    pub boundary: PathBuf,
    /// Building footprints for the region.
    pub buildings: PathBuf,
}

impl WorkItem {
    /// Creates a work item labelled `{boundary stem}_{raster stem}`.
    #[must_use]
    pub fn new(raster: PathBuf, boundary: PathBuf, buildings: PathBuf) -> Self {
        let label = format!("{}_{}", file_stem(&boundary), file_stem(&raster));
        Self {
            label,
            raster,
            boundary,
            buildings,
        }
    }

    /// Replaces the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Returns an error naming the first input file that does not exist.
    #[must_use]
    pub fn missing_input(&self) -> Option<PipelineError> {
        [
            ("boundary", &self.boundary),
            ("buildings", &self.buildings),
            ("raster", &self.raster),
        ]
        .into_iter()
        .find(|(_, path)| !path.is_file())
        .map(|(kind, path)| PipelineError::MissingInput {
            kind,
            path: path.clone(),
        })
    }
}

/// Maps a boundary file to its building file:
/// `{directory}/{boundary stem}{suffix}.{extension}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingPathConvention {
    /// Directory holding building files. Defaults to the boundary's
    /// directory.
    pub directory: Option<PathBuf>,
    /// Appended to the boundary stem.
    pub suffix: String,
    /// Building file extension, without the dot.
    pub extension: String,
}

impl Default for BuildingPathConvention {
    fn default() -> Self {
        Self {
            directory: None,
            suffix: "_buildings".to_string(),
            extension: "geojson".to_string(),
        }
    }
}

impl BuildingPathConvention {
    /// Building file for `boundary`.
    #[must_use]
    pub fn building_path(&self, boundary: &Path) -> PathBuf {
        let directory = self
            .directory
            .clone()
            .or_else(|| boundary.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        directory.join(format!(
            "{}{}.{}",
            file_stem(boundary),
            self.suffix,
            self.extension
        ))
    }

    /// Returns `true` if `path` is named like a building file, so building
    /// files sharing a directory with boundaries are not paired as
    /// boundaries themselves.
    #[must_use]
    pub fn is_building_file(&self, path: &Path) -> bool {
        !self.suffix.is_empty()
            && has_extension(path, &[self.extension.as_str()])
            && file_stem(path).ends_with(&self.suffix)
    }
}

/// Lists the files in `dir` with one of `extensions` (case-insensitive),
/// sorted by path.
///
/// # Errors
///
/// Returns [`PipelineError::InputDirectory`] if `dir` cannot be read.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, PipelineError> {
    let input_error = |source| PipelineError::InputDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(input_error)? {
        let path = entry.map_err(input_error)?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Pairs every raster with every boundary, rasters outermost.
#[must_use]
pub fn cross_product(
    rasters: &[PathBuf],
    boundaries: &[PathBuf],
    convention: &BuildingPathConvention,
) -> Vec<WorkItem> {
    rasters
        .iter()
        .flat_map(|raster| {
            boundaries
                .iter()
                .filter(|boundary| !convention.is_building_file(boundary))
                .map(move |boundary| {
                    WorkItem::new(
                        raster.clone(),
                        boundary.clone(),
                        convention.building_path(boundary),
                    )
                })
        })
        .collect()
}

/// Lists rasters and boundaries in two directories and pairs them.
///
/// # Errors
///
/// Returns [`PipelineError::InputDirectory`] if either directory cannot
/// be read.
pub fn discover(
    raster_dir: &Path,
    boundary_dir: &Path,
    convention: &BuildingPathConvention,
) -> Result<Vec<WorkItem>, PipelineError> {
    let rasters = list_files(raster_dir, RASTER_EXTENSIONS)?;
    let boundaries = list_files(boundary_dir, BOUNDARY_EXTENSIONS)?;
    let items = cross_product(&rasters, &boundaries, convention);

    log::info!(
        "Found {} rasters and {} boundaries: {} work items",
        rasters.len(),
        boundaries.len(),
        items.len()
    );

    Ok(items)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn building_path_defaults_to_boundary_directory() {
        let convention = BuildingPathConvention::default();
        assert_eq!(
            convention.building_path(Path::new("/data/states/north_carolina.geojson")),
            PathBuf::from("/data/states/north_carolina_buildings.geojson")
        );
    }

    #[test]
    fn building_path_uses_configured_directory() {
        let convention = BuildingPathConvention {
            directory: Some(PathBuf::from("/data/buildings")),
            suffix: String::new(),
            extension: "json".to_string(),
        };
        assert_eq!(
            convention.building_path(Path::new("/data/states/ohio.geojson")),
            PathBuf::from("/data/buildings/ohio.json")
        );
        assert!(!convention.is_building_file(Path::new("/data/buildings/ohio.json")));
    }

    #[test]
    fn lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.tif");
        touch(dir.path(), "a.TIFF");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("nested.tif")).unwrap();

        let files = list_files(dir.path(), RASTER_EXTENSIONS).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TIFF", "b.tif"]);
    }

    #[test]
    fn unreadable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = list_files(&dir.path().join("missing"), RASTER_EXTENSIONS);
        assert!(matches!(result, Err(PipelineError::InputDirectory { .. })));
    }

    #[test]
    fn cross_product_pairs_every_raster_with_every_boundary() {
        let rasters = vec![PathBuf::from("r/flood_a.tif"), PathBuf::from("r/flood_b.tif")];
        let boundaries = vec![
            PathBuf::from("s/nc.geojson"),
            PathBuf::from("s/nc_buildings.geojson"),
            PathBuf::from("s/sc.geojson"),
        ];
        let items = cross_product(&rasters, &boundaries, &BuildingPathConvention::default());

        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["nc_flood_a", "sc_flood_a", "nc_flood_b", "sc_flood_b"]
        );
        assert_eq!(items[0].buildings, PathBuf::from("s/nc_buildings.geojson"));
        assert_eq!(items[3].raster, PathBuf::from("r/flood_b.tif"));
    }

    #[test]
    fn missing_input_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let raster = touch(dir.path(), "flood.tif");
        let boundary = touch(dir.path(), "nc.geojson");
        let item = WorkItem::new(raster, boundary, dir.path().join("nc_buildings.geojson"));

        match item.missing_input() {
            Some(PipelineError::MissingInput { kind, path }) => {
                assert_eq!(kind, "buildings");
                assert_eq!(path, dir.path().join("nc_buildings.geojson"));
            }
            other => panic!("expected missing buildings, got {other:?}"),
        }

        touch(dir.path(), "nc_buildings.geojson");
        assert!(item.missing_input().is_none());
    }

    #[test]
    fn discover_reads_both_directories() {
        let rasters = tempfile::tempdir().unwrap();
        let states = tempfile::tempdir().unwrap();
        touch(rasters.path(), "flood.tif");
        touch(states.path(), "nc.geojson");
        touch(states.path(), "nc_buildings.geojson");

        let items = discover(
            rasters.path(),
            states.path(),
            &BuildingPathConvention::default(),
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "nc_flood");
        assert!(items[0].missing_input().is_none());
    }
}
