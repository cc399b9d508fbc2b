use anyhow::{Context, Result};
use fitrs::{Fits, FitsData, HeaderValue, Hdu};
use std::path::Path;

use crate::error::{TrailError, TrailResult};
use crate::wcs::{Card, CelestialWcs, HeaderMap, HeaderSource};

/// Header keywords copied verbatim from the source exposure into derived cutouts.
pub const PASSTHROUGH_KEYS: &[&str] = &[
    "DATE-OBS", "OBSMJD", "EXPTIME", "FILTER", "FILTERID", "FIELDID", "CCDID", "QID", "MAGZP",
    "TELESCOP", "INSTRUME", "ORIGIN",
];

impl HeaderSource for Hdu {
    fn card(&self, key: &str) -> Option<Card> {
        match self.value(key)? {
            HeaderValue::RealFloatingNumber(v) => Some(Card::Real(*v)),
            HeaderValue::IntegerNumber(v) => Some(Card::Integer(*v as i64)),
            HeaderValue::CharacterString(s) => Some(Card::Text(s.trim().to_string())),
            HeaderValue::Logical(b) => Some(Card::Logical(*b)),
            _ => None,
        }
    }
}

/// A single exposure: 2-D pixels, its celestial mapping and the scalar
/// header values the trail pipeline needs.
#[derive(Debug, Clone)]
pub struct FitsImage {
    /// Identifier used in logs and reports, normally the file path.
    pub source: String,
    pub width: usize,
    pub height: usize,
    /// Row-major pixels, `x` fastest.
    pub data: Vec<f32>,
    pub wcs: CelestialWcs,
    /// Seeing FWHM in arcsec.
    pub seeing_arcsec: f64,
    pub mag_limit: Option<f64>,
    /// Cards carried over into derived products.
    pub passthrough: HeaderMap,
}

impl FitsImage {
    /// Load the science HDU of a FITS file.
    ///
    /// The first extension is used when the file has one, the primary HDU
    /// otherwise. `SEEING` and `MAGLIM` are taken from the first HDU that
    /// carries them.
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!("📂 Opening FITS file: {}", path.display());
        let fits = Fits::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

        let hdu = fits
            .get(1)
            .or_else(|| fits.get(0))
            .with_context(|| format!("No HDU found in {}", path.display()))?;

        let (shape, pixels) = read_pixels(&hdu)?;
        let (width, height) = squeeze_shape(&shape)?;
        let wcs = CelestialWcs::from_header(&hdu)?;

        let mut seeing = None;
        let mut mag_limit = None;
        let mut passthrough = HeaderMap::new();
        let mut index = 0;
        while let Some(h) = fits.get(index) {
            if seeing.is_none() {
                seeing = h.real("SEEING");
            }
            if mag_limit.is_none() {
                mag_limit = h.real("MAGLIM");
            }
            for key in PASSTHROUGH_KEYS {
                if let Some(card) = h.card(key) {
                    passthrough.insert(*key, card);
                }
            }
            index += 1;
        }
        let seeing = seeing.ok_or(TrailError::MissingHeader("SEEING"))?;

        tracing::debug!(
            "📐 {}: {}x{} pixels, seeing {:.2}\", scale {:.3}\"/px",
            path.display(),
            width,
            height,
            seeing,
            wcs.pixel_scale_arcsec()
        );

        Ok(Self {
            source: path.display().to_string(),
            width,
            height,
            data: pixels,
            wcs,
            seeing_arcsec: seeing,
            mag_limit,
            passthrough,
        })
    }

    /// Assemble an image from already-decoded parts.
    pub fn from_parts(
        source: impl Into<String>,
        width: usize,
        height: usize,
        data: Vec<f32>,
        wcs: CelestialWcs,
        seeing_arcsec: f64,
        mag_limit: Option<f64>,
    ) -> TrailResult<Self> {
        if width * height != data.len() || width == 0 || height == 0 {
            return Err(TrailError::DimensionalityError {
                shape: vec![width, height, data.len()],
            });
        }

        Ok(Self {
            source: source.into(),
            width,
            height,
            data,
            wcs,
            seeing_arcsec,
            mag_limit,
            passthrough: HeaderMap::new(),
        })
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }
}

/// Decode the data unit of `hdu` as `f32`, integer blanks become NaN.
fn read_pixels(hdu: &Hdu) -> TrailResult<(Vec<usize>, Vec<f32>)> {
    match hdu.read_data() {
        FitsData::FloatingPoint32(arr) => Ok((arr.shape.clone(), arr.data.iter().copied().collect())),
        FitsData::FloatingPoint64(arr) => Ok((
            arr.shape.clone(),
            arr.data.iter().map(|v| *v as f32).collect(),
        )),
        FitsData::IntegersI32(arr) => Ok((
            arr.shape.clone(),
            arr.data
                .iter()
                .map(|v| v.map_or(f32::NAN, |x| x as f32))
                .collect(),
        )),
        FitsData::IntegersU32(arr) => Ok((
            arr.shape.clone(),
            arr.data
                .iter()
                .map(|v| v.map_or(f32::NAN, |x| x as f32))
                .collect(),
        )),
        _ => Err(TrailError::DimensionalityError { shape: vec![] }),
    }
}

/// Drop singleton axes; exactly two must remain. Returns `(width, height)`.
pub fn squeeze_shape(shape: &[usize]) -> TrailResult<(usize, usize)> {
    let dims: Vec<usize> = shape.iter().copied().filter(|&n| n != 1).collect();
    match dims.as_slice() {
        [w, h] if *w > 0 && *h > 0 => Ok((*w, *h)),
        _ => Err(TrailError::DimensionalityError {
            shape: shape.to_vec(),
        }),
    }
}
