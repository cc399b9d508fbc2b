use serde::{Deserialize, Serialize};

use crate::metadata::ObservationRecord;
use crate::pipeline::TrailProduct;
use crate::profile::ProfileSample;
use crate::stats::RobustStats;
use crate::trail::TrailGeometry;
use crate::wcs::{PixelPoint, SkyPoint};

/// Placement of a cutout inside its parent exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoutInfo {
    pub width: usize,
    pub height: usize,
    /// Parent pixel of the cutout's (0, 0)
    pub origin: (usize, usize),
    pub requested_size: f64,
    pub clipped: bool,
}

/// Serializable record of one processed trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailSummary {
    pub source: String,
    pub object: Option<String>,
    pub observed_at: Option<String>,
    pub v_mag: Option<f64>,
    /// Observatory code the end position was computed for
    pub observatory: Option<String>,
    pub exposure_s: Option<f64>,
    pub mag_limit: Option<f64>,
    pub seeing_arcsec: f64,
    pub fwhm_px: f64,
    pub pixel_scale_arcsec: f64,
    pub start_sky: SkyPoint,
    pub end_sky: SkyPoint,
    /// Endpoints in parent image pixels
    pub start_pixel: PixelPoint,
    pub end_pixel: PixelPoint,
    pub cutout: CutoutInfo,
    /// Geometry in cutout pixels
    pub geometry: TrailGeometry,
    pub stats: RobustStats,
    pub display_range: (f64, f64),
    pub profile: Vec<ProfileSample>,
    /// Files written for this trail
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl TrailSummary {
    pub fn from_product(product: &TrailProduct, record: Option<&ObservationRecord>) -> Self {
        let cutout = &product.cutout;
        Self {
            source: product.source.clone(),
            object: None,
            observed_at: record.map(|r| r.observed_at_utc()),
            v_mag: record.map(|r| r.v_mag),
            observatory: None,
            exposure_s: record.and_then(|r| r.exposure_s),
            mag_limit: product.mag_limit,
            seeing_arcsec: product.seeing_arcsec,
            fwhm_px: product.fwhm_px,
            pixel_scale_arcsec: product.pixel_scale_arcsec,
            start_sky: product.start_sky,
            end_sky: product.end_sky,
            start_pixel: product.start_pixel,
            end_pixel: product.end_pixel,
            cutout: CutoutInfo {
                width: cutout.width,
                height: cutout.height,
                origin: cutout.origin,
                requested_size: cutout.region.size,
                clipped: cutout.is_clipped(),
            },
            geometry: product.geometry,
            stats: product.stats,
            display_range: product.display_range,
            profile: product.profile.samples.clone(),
            outputs: Vec::new(),
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }
}

/// A pair that could not be processed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairFailure {
    pub source: String,
    /// Short machine-readable failure class, e.g. `empty_selection`
    pub kind: String,
    pub message: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: Vec<TrailSummary>,
    pub failures: Vec<PairFailure>,
    /// Records skipped before processing: no end position yet, or no
    /// object directory to file them under
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.processed.len() + self.failures.len() + self.skipped.len()
    }
}

/// Header overview printed by `read-fits`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitsInfo {
    pub path: String,
    pub width: usize,
    pub height: usize,
    pub crval: SkyPoint,
    pub crpix: PixelPoint,
    pub pixel_scale_arcsec: f64,
    pub has_sip: bool,
    pub seeing_arcsec: f64,
    pub fwhm_px: f64,
    pub mag_limit: Option<f64>,
    pub center_sky: SkyPoint,
}
