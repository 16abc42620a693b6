//! Menu-driven mode, used when `flood_impact` runs without a subcommand.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use flood_impact_cli_utils::MultiProgress;
use flood_impact_pipeline::discover::{BOUNDARY_EXTENSIONS, RASTER_EXTENSIONS, list_files};
use flood_impact_pipeline::{PipelineConfig, WorkItem};

use crate::commands;

/// Top-level actions of the interactive menu.
enum Action {
    RunBatch,
    AnalyzeOne,
    InspectRaster,
    ListServices,
}

impl Action {
    const ALL: &[Self] = &[
        Self::RunBatch,
        Self::AnalyzeOne,
        Self::InspectRaster,
        Self::ListServices,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunBatch => "Analyze all rasters against all boundaries",
            Self::AnalyzeOne => "Analyze one raster and boundary",
            Self::InspectRaster => "Inspect a raster",
            Self::ListServices => "List geocoding services",
        }
    }
}

/// Prompts for an action and its inputs, then runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails, the config cannot be loaded, or an
/// input directory cannot be read.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Flood Impact");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::RunBatch => run_batch(multi).await?,
        Action::AnalyzeOne => analyze_one(multi).await?,
        Action::InspectRaster => {
            let raster = prompt_path("Raster file", None)?;
            let config = prompt_config()?;
            commands::inspect(&raster, &config)?;
        }
        Action::ListServices => commands::list_services(),
    }

    Ok(())
}

async fn run_batch(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let rasters = prompt_path("Raster directory", Some("data/rasters"))?;
    let boundaries = prompt_path("Boundary directory", Some("data/boundaries"))?;
    let output = prompt_path("Output directory", Some("output"))?;
    let mut config = prompt_config()?;
    prompt_geocoding(&mut config)?;

    let items =
        flood_impact_pipeline::discover::discover(&rasters, &boundaries, &config.buildings)?;
    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    let proceed = Confirm::new()
        .with_prompt(format!("Run {} work items?", items.len()))
        .default(true)
        .interact()?;
    if !proceed {
        return Ok(());
    }

    let summary = commands::run_items(&items, &output, &config, multi).await?;
    commands::print_summary(&summary);
    Ok(())
}

async fn analyze_one(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let rasters = prompt_path("Raster directory", Some("data/rasters"))?;
    let boundaries = prompt_path("Boundary directory", Some("data/boundaries"))?;
    let mut config = prompt_config()?;

    let raster = select_file("Raster", &list_files(&rasters, RASTER_EXTENSIONS)?)?;
    let boundary_files: Vec<PathBuf> = list_files(&boundaries, BOUNDARY_EXTENSIONS)?
        .into_iter()
        .filter(|p| !config.buildings.is_building_file(p))
        .collect();
    let boundary = select_file("Boundary", &boundary_files)?;

    let (Some(raster), Some(boundary)) = (raster, boundary) else {
        return Ok(());
    };

    let default_buildings = config.buildings.building_path(&boundary).display().to_string();
    let buildings = prompt_path("Building file", Some(default_buildings.as_str()))?;
    let output = prompt_path("Output directory", Some("output"))?;
    prompt_geocoding(&mut config)?;

    let item = WorkItem::new(raster, boundary, buildings);
    let summary = commands::run_items(&[item], &output, &config, multi).await?;
    commands::print_summary(&summary);
    Ok(())
}

/// Lets the user pick one of `files`; `None` when there are none.
fn select_file(what: &str, files: &[PathBuf]) -> Result<Option<PathBuf>, dialoguer::Error> {
    if files.is_empty() {
        println!("No {} files found.", what.to_lowercase());
        return Ok(None);
    }

    let labels: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    let idx = Select::new()
        .with_prompt(what)
        .items(&labels)
        .default(0)
        .max_length(20)
        .interact()?;

    Ok(Some(files[idx].clone()))
}

fn prompt_path(prompt: &str, default: Option<&str>) -> Result<PathBuf, dialoguer::Error> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_string());
    }
    Ok(PathBuf::from(input.interact_text()?))
}

/// Asks for an optional config file and loads it.
fn prompt_config() -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let path: String = Input::new()
        .with_prompt("Config file (empty for defaults)")
        .allow_empty(true)
        .interact_text()?;

    let path = path.trim();
    let config = if path.is_empty() {
        PipelineConfig::default()
    } else {
        PipelineConfig::load(std::path::Path::new(path))?
    };
    Ok(config)
}

fn prompt_geocoding(config: &mut PipelineConfig) -> Result<(), dialoguer::Error> {
    config.geocoding.enabled = Confirm::new()
        .with_prompt("Look up postal codes?")
        .default(config.geocoding.enabled)
        .interact()?;

    if config.geocoding.enabled {
        config.geocoding.max_lookups = Input::new()
            .with_prompt("Maximum lookups per item (0 for no cap)")
            .default(config.geocoding.max_lookups)
            .interact_text()?;
    }

    Ok(())
}
