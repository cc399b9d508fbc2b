use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::commands::{load_record, print_summary_text};
use crate::config::Config;
use crate::fits_image::FitsImage;
use crate::models::TrailSummary;
use crate::output::{write_products, OutputPaths};
use crate::pipeline::TrailPipeline;
use crate::wcs::SkyPoint;

/// A single trail to cut out.
#[derive(Debug, Clone)]
pub struct CutoutRequest {
    pub fits_path: PathBuf,
    pub start: SkyPoint,
    pub end: SkyPoint,
    pub object: String,
    pub record: Option<PathBuf>,
}

pub fn cutout(config: &Config, request: &CutoutRequest, format: &str) -> Result<TrailSummary> {
    let record = request
        .record
        .as_deref()
        .map(load_record)
        .transpose()?;

    let image = FitsImage::open(&request.fits_path)?;
    tracing::info!(
        "🔭 {} ({}x{}, seeing {:.2}\")",
        image.source,
        image.width,
        image.height,
        image.seeing_arcsec
    );

    let pipeline = TrailPipeline::new(config.pipeline.clone());
    let product = pipeline
        .process(&image, &request.start, &request.end)
        .with_context(|| format!("Failed to process {}", request.fits_path.display()))?;

    let output_root = config.get_output_directory();
    let paths = OutputPaths::new(Path::new(&output_root), &request.object, &request.fits_path);
    let summary = write_products(
        config,
        &paths,
        &image,
        &product,
        &request.object,
        record.as_ref(),
    )?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary_text(&summary),
    }

    Ok(summary)
}
