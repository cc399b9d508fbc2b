//! Per-exposure trail extraction.
//!
//! [`TrailPipeline::process`] turns one image and one pair of sky positions
//! into a [`TrailProduct`]. [`run_batch`] fans a list of such jobs out over a
//! thread pool and keeps one failing pair from stopping the others.

use anyhow::Result;
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::cutout::{Cutout, CutoutSizer};
use crate::error::{TrailError, TrailResult};
use crate::fits_image::FitsImage;
use crate::metadata::MetadataError;
use crate::models::{BatchReport, PairFailure, TrailSummary};
use crate::profile::BrightnessProfile;
use crate::stats::RobustStats;
use crate::streak_view::StreakView;
use crate::trail::{TrailGeometry, TrailMask};
use crate::wcs::{PixelPoint, SkyPoint};

/// Endpoints closer than this, in pixels, have no usable orientation.
pub const MIN_TRAIL_LENGTH_PX: f64 = 1e-6;

/// Everything derived for one (image, trail) pair.
#[derive(Debug, Clone)]
pub struct TrailProduct {
    pub source: String,
    pub start_sky: SkyPoint,
    pub end_sky: SkyPoint,
    /// Endpoints in the parent image's pixel space.
    pub start_pixel: PixelPoint,
    pub end_pixel: PixelPoint,
    pub cutout: Cutout,
    /// Geometry in cutout-local pixel space.
    pub geometry: TrailGeometry,
    pub mask: TrailMask,
    pub stats: RobustStats,
    pub display_range: (f64, f64),
    pub profile: BrightnessProfile,
    pub streak_view: Option<StreakView>,
    pub pixel_scale_arcsec: f64,
    pub seeing_arcsec: f64,
    pub fwhm_px: f64,
    pub mag_limit: Option<f64>,
}

pub struct TrailPipeline {
    config: PipelineConfig,
}

impl TrailPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn sizer(&self) -> CutoutSizer {
        CutoutSizer {
            min_size: self.config.min_cutout_size,
            size_factor: self.config.size_factor,
            margin: self.config.margin,
        }
    }

    /// Locate the trail from `start` to `end` in `image` and measure it.
    pub fn process(
        &self,
        image: &FitsImage,
        start: &SkyPoint,
        end: &SkyPoint,
    ) -> TrailResult<TrailProduct> {
        let start_pixel = image.wcs.sky_to_pixel(start)?;
        let end_pixel = image.wcs.sky_to_pixel(end)?;

        let separation_px = start_pixel.distance(&end_pixel);
        if separation_px < MIN_TRAIL_LENGTH_PX || start.separation(end) == 0.0 {
            return Err(TrailError::DegenerateTrail { separation_px });
        }

        let region = self.sizer().size(&start_pixel, &end_pixel);
        let cutout = Cutout::extract(image, region)?;
        let start_local = cutout.to_cutout_position(&start_pixel);
        let end_local = cutout.to_cutout_position(&end_pixel);

        let pixel_scale = image.wcs.pixel_scale_arcsec();
        let fwhm_px = image.seeing_arcsec / pixel_scale;
        let half_width = fwhm_px * self.config.mask_width_multiplier;

        let geometry = TrailGeometry::from_endpoints(start_local, end_local, half_width);
        let mask = TrailMask::build(cutout.width, cutout.height, &geometry);
        let stats = RobustStats::estimate(mask.select(&cutout.data)).map_err(|e| match e {
            TrailError::EmptySelection(reason) => TrailError::EmptySelection(format!(
                "{reason} ({} mask pixels in a {}x{} cutout)",
                mask.count(),
                cutout.width,
                cutout.height
            )),
            other => other,
        })?;

        let profile = BrightnessProfile::sample(
            &cutout,
            &start_local,
            &end_local,
            self.config.profile_samples,
            pixel_scale,
            self.config.band_sigma * stats.std_dev,
        );
        let streak_view =
            StreakView::render(&cutout, &geometry, fwhm_px, self.config.streak_crop_factor);

        tracing::debug!(
            "🌠 {}: trail {:.1}px at {:.1}°, mask {} px, median {:.2}, σ {:.2}",
            image.source,
            geometry.length,
            geometry.angle.to_degrees(),
            stats.count,
            stats.median,
            stats.std_dev
        );

        Ok(TrailProduct {
            source: image.source.clone(),
            start_sky: *start,
            end_sky: *end,
            start_pixel,
            end_pixel,
            display_range: stats.display_range(self.config.display_sigma),
            cutout,
            geometry,
            mask,
            stats,
            profile,
            streak_view,
            pixel_scale_arcsec: pixel_scale,
            seeing_arcsec: image.seeing_arcsec,
            fwhm_px,
            mag_limit: image.mag_limit,
        })
    }
}

/// Something a batch can name in its logs.
pub trait BatchJob: Send + Sync {
    fn source(&self) -> String;
}

/// Run `job` over `jobs` in parallel.
///
/// A failing job never stops the others. Failures carrying a [`TrailError`] or
/// [`MetadataError`] are reported under their own kind; anything else is
/// reported as `unexpected` so it stands out.
pub fn run_batch<J, F>(jobs: &[J], workers: Option<usize>, job: F) -> Result<BatchReport>
where
    J: BatchJob,
    F: Fn(&J) -> Result<TrailSummary> + Sync + Send,
{
    let run = || {
        jobs.par_iter()
            .map(|j| (j.source(), job(j)))
            .collect::<Vec<_>>()
    };

    let results = match workers {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()?
            .install(run),
        None => run(),
    };

    let mut report = BatchReport::default();
    for (source, result) in results {
        match result {
            Ok(summary) => report.processed.push(summary),
            Err(err) => {
                let kind = failure_kind(&err);
                tracing::error!("❌ {} failed ({}): {:#}", source, kind, err);
                report.failures.push(PairFailure {
                    source,
                    kind: kind.to_string(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    tracing::info!(
        "✅ Batch finished: {} processed, {} failed",
        report.processed.len(),
        report.failures.len()
    );
    Ok(report)
}

/// Failure class reported for `err`.
pub fn failure_kind(err: &anyhow::Error) -> &'static str {
    if let Some(trail) = err.downcast_ref::<TrailError>() {
        trail.kind()
    } else if err.downcast_ref::<MetadataError>().is_some() {
        "invalid_metadata"
    } else {
        "unexpected"
    }
}
