pub mod batch;
pub mod cutout;
pub mod read_fits;

pub use batch::run_batch_command;
pub use cutout::{cutout, CutoutRequest};
pub use read_fits::read_fits;

use anyhow::{Context, Result};
use std::path::Path;

use crate::metadata::ObservationRecord;
use crate::models::TrailSummary;

/// Read and validate an observation record file.
pub fn load_record(path: &Path) -> Result<ObservationRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record: {}", path.display()))?;
    let record = ObservationRecord::parse(&text)?;
    Ok(record)
}

pub(crate) fn print_summary_text(summary: &TrailSummary) {
    println!("Trail: {}", summary.source);
    if let Some(object) = &summary.object {
        println!("  Object: {}", object);
    }
    if let Some(observed_at) = &summary.observed_at {
        println!("  Observed: {}", observed_at);
    }
    println!(
        "  Cutout: {}x{} at ({}, {}){}",
        summary.cutout.width,
        summary.cutout.height,
        summary.cutout.origin.0,
        summary.cutout.origin.1,
        if summary.cutout.clipped { " (clipped)" } else { "" }
    );
    println!(
        "  Trail: {:.1} px at {:.1}°, mask half-width {:.1} px",
        summary.geometry.length,
        summary.geometry.angle.to_degrees(),
        summary.geometry.half_width
    );
    println!(
        "  Seeing: {:.2}\" ({:.2} px at {:.3}\"/px)",
        summary.seeing_arcsec, summary.fwhm_px, summary.pixel_scale_arcsec
    );
    println!(
        "  Background: median {:.1}, σ {:.1} over {} px, display {:.1}..{:.1}",
        summary.stats.median,
        summary.stats.std_dev,
        summary.stats.count,
        summary.display_range.0,
        summary.display_range.1
    );
    if let Some(peak) = summary
        .profile
        .iter()
        .filter(|s| s.intensity.is_finite())
        .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    {
        println!(
            "  Profile peak: {:.1} at {:.2}\"",
            peak.intensity, peak.distance_arcsec
        );
    }
    for output in &summary.outputs {
        println!("  Wrote: {}", output);
    }
}
