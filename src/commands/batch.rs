use anyhow::{Context, Result};
use std::path::Path;

use crate::commands::load_record;
use crate::config::Config;
use crate::fits_image::FitsImage;
use crate::metadata::ObservationRecord;
use crate::models::{BatchReport, PairFailure, TrailSummary};
use crate::output::{write_products, OutputPaths};
use crate::pipeline::{failure_kind, run_batch, BatchJob, TrailPipeline};
use crate::record_index::{image_file_name, RecordEntry, RecordIndex};
use crate::wcs::SkyPoint;

/// A record whose end position is known.
struct RecordJob {
    entry: RecordEntry,
    record: ObservationRecord,
    end: SkyPoint,
}

impl BatchJob for RecordJob {
    fn source(&self) -> String {
        self.entry.path.display().to_string()
    }
}

/// Cut out every trail described by the records below `root`.
pub fn run_batch_command(config: &Config, root: &Path, format: &str) -> Result<BatchReport> {
    let index = RecordIndex::build(root)?;
    if index.records().is_empty() && index.unassigned().is_empty() {
        tracing::warn!(
            "⚠️  No observation records (*.fits.fz.txt, *.fits.txt) found in {}",
            root.display()
        );
    }

    let mut jobs = Vec::new();
    let mut skipped: Vec<String> = index
        .unassigned()
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let mut invalid = Vec::new();
    for entry in index.records() {
        let source = entry.path.display().to_string();
        match load_record(&entry.path) {
            Ok(record) => match record.end {
                Some(end) => jobs.push(RecordJob {
                    entry: entry.clone(),
                    record,
                    end,
                }),
                None => {
                    tracing::info!("⏭️  Skipping {}: no end position yet", source);
                    skipped.push(source);
                }
            },
            Err(err) => {
                let kind = failure_kind(&err);
                tracing::error!("❌ {} failed ({}): {:#}", source, kind, err);
                invalid.push(PairFailure {
                    source,
                    kind: kind.to_string(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    tracing::info!(
        "🚀 Processing {} trail(s) from {} record(s)",
        jobs.len(),
        index.records().len()
    );

    let pipeline = TrailPipeline::new(config.pipeline.clone());
    let output_root = config.get_output_directory();
    let mut report = run_batch(&jobs, config.get_workers(), |job| {
        process_record(config, &index, &pipeline, Path::new(&output_root), job)
    })?;
    report.failures.extend(invalid);
    report.skipped = skipped;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_report_text(&report),
    }

    Ok(report)
}

fn process_record(
    config: &Config,
    index: &RecordIndex,
    pipeline: &TrailPipeline,
    output_root: &Path,
    job: &RecordJob,
) -> Result<TrailSummary> {
    let listed = Path::new(&job.record.file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| job.record.file_name.clone());
    let file_name = image_file_name(
        &listed,
        config.get_science_suffix(),
        config.get_image_suffix(),
    );
    let image_path = index.locate(&job.entry.path, &file_name).with_context(|| {
        format!(
            "FITS file not found: {} (listed in {})",
            file_name,
            job.entry.path.display()
        )
    })?;

    let image = FitsImage::open(&image_path)?;
    let product = pipeline
        .process(&image, &job.record.start, &job.end)
        .with_context(|| format!("Failed to process {}", image_path.display()))?;

    let paths = OutputPaths::new(output_root, &job.entry.object, &image_path);
    write_products(
        config,
        &paths,
        &image,
        &product,
        &job.entry.object,
        Some(&job.record),
    )
}

fn print_report_text(report: &BatchReport) {
    println!(
        "Processed {} of {} record(s): {} failed, {} skipped",
        report.processed.len(),
        report.total(),
        report.failures.len(),
        report.skipped.len()
    );
    for summary in &report.processed {
        println!(
            "  ✓ {} [{}] median {:.1} σ {:.1}",
            summary.source,
            summary.object.as_deref().unwrap_or("?"),
            summary.stats.median,
            summary.stats.std_dev
        );
    }
    for failure in &report.failures {
        println!("  ✗ {} ({}): {}", failure.source, failure.kind, failure.message);
    }
    for source in &report.skipped {
        println!("  - {} (skipped)", source);
    }
}
