//! Command implementations shared by the subcommands and the interactive
//! menu.

use std::path::Path;
use std::time::Instant;

use flood_impact_cli_utils::{IndicatifProgress, MultiProgress};
use flood_impact_geocoder::{ReverseGeocoder, build_geocoder_by_id, service_registry};
use flood_impact_pipeline::{
    BatchSummary, PairOutcome, PipelineConfig, PipelineContext, PipelineError, WorkItem, run_batch,
};
use flood_impact_raster::geotiff::read_geotiff;

/// Loads the config file, or the defaults when no file is given.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    path.map_or_else(|| Ok(PipelineConfig::default()), PipelineConfig::load)
}

/// Builds the configured geocoder, or `None` when geocoding is disabled
/// or cannot be set up. Setup problems (e.g. a missing API key) only
/// disable geocoding for the run.
fn geocoder_for(config: &PipelineConfig) -> Option<Box<dyn ReverseGeocoder>> {
    if !config.geocoding.enabled {
        log::info!("Reverse geocoding disabled");
        return None;
    }

    let client = match reqwest::Client::builder()
        .user_agent("flood-impact/1.0")
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::warn!("Could not create HTTP client, skipping geocoding: {e}");
            return None;
        }
    };

    match build_geocoder_by_id(&config.geocoding.service, client) {
        Ok(geocoder) => Some(geocoder),
        Err(e) => {
            log::warn!("Reverse geocoding disabled: {e}");
            None
        }
    }
}

/// Runs `items` with a progress bar and returns the summary.
///
/// # Errors
///
/// Returns an error only if the output directory cannot be created.
pub async fn run_items(
    items: &[WorkItem],
    output: &Path,
    config: &PipelineConfig,
    multi: &MultiProgress,
) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let geocoder = geocoder_for(config);
    let mut ctx = PipelineContext::new(config);
    if let Some(geocoder) = geocoder.as_deref() {
        ctx = ctx.with_geocoder(geocoder);
    }

    let start = Instant::now();
    let progress = if items.len() == 1 {
        IndicatifProgress::item_spinner(multi, "Analyzing")
    } else {
        IndicatifProgress::items_bar(multi, "Analyzing")
    };
    let summary = run_batch(items, output, &ctx, progress).await?;

    log::info!(
        "Finished {} work items in {:.1}s",
        items.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(summary)
}

/// Prints one line per work item plus the totals.
pub fn print_summary(summary: &BatchSummary) {
    println!();
    println!("{:<40} OUTCOME", "ITEM");
    println!("{}", "-".repeat(80));
    for (label, outcome) in &summary.outcomes {
        println!("{label:<40} {outcome}");
    }
    println!("{}", "-".repeat(80));
    println!("{summary}");

    let failed: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|(_, o)| matches!(o, PairOutcome::Failed { .. }))
        .map(|(label, _)| label.as_str())
        .collect();
    if !failed.is_empty() {
        println!("Failed: {}", failed.join(", "));
    }
}

/// Prints raster metadata, band role resolution, and the number of
/// newly-flooded pixels over the whole raster.
///
/// # Errors
///
/// Returns an error if the raster cannot be read.
pub fn inspect(path: &Path, config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let raster = read_geotiff(path)?;
    let transform = raster.transform();
    let bounds = raster.bounds();

    println!("{}", path.display());
    println!("  size:       {} x {}", raster.width(), raster.height());
    println!("  bands:      {}", raster.band_count());
    println!("  crs:        {}", raster.crs());
    println!(
        "  transform:  [{}, {}, {}, {}, {}, {}]",
        transform.a, transform.b, transform.c, transform.d, transform.e, transform.f
    );
    println!(
        "  bounds:     ({}, {}) - ({}, {})",
        bounds.min().x,
        bounds.min().y,
        bounds.max().x,
        bounds.max().y
    );
    match raster.nodata() {
        Some(nodata) => println!("  nodata:     {nodata}"),
        None => println!("  nodata:     none"),
    }

    let roles = &config.band_roles;
    match roles.extract(&raster) {
        Ok(mask) => {
            println!(
                "  band roles: flood_extent = band {}, permanent_water = band {}",
                roles.flood_extent, roles.permanent_water
            );
            println!("  flooded:    {} pixels", mask.count(1));
        }
        Err(e) => println!("  band roles: {e}"),
    }

    Ok(())
}

/// Prints the geocoding service registry.
pub fn list_services() {
    println!("{:<12} {:<12} {:<8} BASE URL", "ID", "NAME", "DELAY");
    println!("{}", "-".repeat(70));
    for service in service_registry::all_services() {
        println!(
            "{:<12} {:<12} {:<8} {}{}",
            service.id,
            service.name,
            format!("{}ms", service.rate_limit_ms()),
            service.base_url(),
            if service.enabled { "" } else { " (disabled)" }
        );
    }
}
