use serde::{Deserialize, Serialize};

use crate::cutout::Cutout;
use crate::wcs::PixelPoint;

/// One point of a brightness profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSample {
    /// Distance from the trail start, in arcsec.
    pub distance_arcsec: f64,
    /// Pixel value at the sample, `NaN` when the sample falls off the cutout.
    pub intensity: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Intensity sampled at evenly spaced points along a trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessProfile {
    pub samples: Vec<ProfileSample>,
    /// Half-width of the uncertainty band, in the image's intensity unit.
    pub band: f64,
}

impl BrightnessProfile {
    /// Sample `num_samples` points from `start` to `end` (inclusive).
    ///
    /// Each point reads the pixel at the truncated coordinates; there is no
    /// sub-pixel interpolation. The band is a single scalar for the whole
    /// profile, not a per-sample estimate.
    pub fn sample(
        cutout: &Cutout,
        start: &PixelPoint,
        end: &PixelPoint,
        num_samples: usize,
        pixel_scale_arcsec: f64,
        band: f64,
    ) -> Self {
        let total_arcsec = start.distance(end) * pixel_scale_arcsec;

        let samples = (0..num_samples)
            .map(|i| {
                let t = fraction(i, num_samples);
                let x = start.x + (end.x - start.x) * t;
                let y = start.y + (end.y - start.y) * t;
                let intensity = pixel_at(cutout, x, y);
                ProfileSample {
                    distance_arcsec: total_arcsec * t,
                    intensity,
                    lower: intensity - band,
                    upper: intensity + band,
                }
            })
            .collect();

        Self { samples, band }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample with the highest finite intensity.
    pub fn peak(&self) -> Option<&ProfileSample> {
        self.samples
            .iter()
            .filter(|s| s.intensity.is_finite())
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }
}

/// Position `i` of `n` evenly spaced points on `[0, 1]`, both ends included.
fn fraction(i: usize, n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else {
        i as f64 / (n - 1) as f64
    }
}

/// Pixel containing `(x, y)`, truncating toward zero so that `-0.5` still
/// reads column 0.
fn pixel_at(cutout: &Cutout, x: f64, y: f64) -> f64 {
    let (x, y) = (x.trunc(), y.trunc());
    if x < 0.0 || y < 0.0 || !x.is_finite() || !y.is_finite() {
        return f64::NAN;
    }
    cutout
        .get(x as usize, y as usize)
        .map(f64::from)
        .unwrap_or(f64::NAN)
}
