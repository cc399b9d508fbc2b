//! Writing trail products to disk.
//!
//! Every processed trail lands in `<root>/<object>/` as a set of files sharing
//! the exposure's base name: `<base>_cutout.fits`, `.txt`, `.png` and
//! optionally `.json`.

use anyhow::{Context, Result};
use fitrs::{Fits, Hdu};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::fits_image::FitsImage;
use crate::metadata::ObservationRecord;
use crate::models::TrailSummary;
use crate::pipeline::TrailProduct;
use crate::streak_view::StreakView;
use crate::wcs::{Card, PixelPoint};

const START_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const END_COLOR: Rgb<u8> = Rgb([255, 50, 50]);
const MASK_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BAND_COLOR: Rgb<u8> = Rgb([90, 90, 90]);
const PROFILE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PROFILE_HEIGHT: u32 = 120;
const MARKER_SIZE: i32 = 6;

/// Strip the FITS extensions from an exposure file name.
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    for ext in [".fits.fz", ".fits", ".fit", ".fts", ".fz"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    name
}

/// Destination of the files derived from one exposure.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub base: String,
}

impl OutputPaths {
    pub fn new(root: &Path, object: &str, source: &Path) -> Self {
        Self {
            dir: root.join(object),
            base: base_name(source),
        }
    }

    fn with_ext(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_cutout.{}", self.base, ext))
    }

    pub fn fits(&self) -> PathBuf {
        self.with_ext("fits")
    }

    pub fn metadata(&self) -> PathBuf {
        self.with_ext("txt")
    }

    pub fn preview(&self) -> PathBuf {
        self.with_ext("png")
    }

    pub fn summary(&self) -> PathBuf {
        self.with_ext("json")
    }
}

/// Write every product enabled in `config` and return the finished summary.
pub fn write_products(
    config: &Config,
    paths: &OutputPaths,
    image: &FitsImage,
    product: &TrailProduct,
    object: &str,
    record: Option<&ObservationRecord>,
) -> Result<TrailSummary> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("Failed to create output directory: {}", paths.dir.display()))?;

    let mut summary = TrailSummary::from_product(product, record).with_object(object);
    summary.observatory = Some(config.get_location());
    summary
        .exposure_s
        .get_or_insert(config.get_exposure().as_secs_f64());

    if config.writes_fits() {
        let path = paths.fits();
        write_cutout_fits(&path, image, product, object, record)?;
        summary.outputs.push(path.display().to_string());
    }

    if config.writes_metadata() {
        let path = paths.metadata();
        write_metadata_text(&path, product, object, record)?;
        summary.outputs.push(path.display().to_string());
    }

    if config.writes_preview() {
        let path = paths.preview();
        write_preview_png(&path, product)?;
        summary.outputs.push(path.display().to_string());
    }

    if config.writes_summary_json() {
        let path = paths.summary();
        summary.outputs.push(path.display().to_string());
        write_summary_json(&path, &summary)?;
    }

    tracing::info!("💾 Saved {} file(s) for {}", summary.outputs.len(), paths.base);
    Ok(summary)
}

/// Save the cutout pixels with a header describing where they came from.
pub fn write_cutout_fits(
    path: &Path,
    image: &FitsImage,
    product: &TrailProduct,
    object: &str,
    record: Option<&ObservationRecord>,
) -> Result<()> {
    let cutout = &product.cutout;
    let mut hdu = Hdu::new(&[cutout.width, cutout.height], cutout.data.clone());

    for (key, card) in image.passthrough.iter().chain(cutout.wcs.to_header().iter()) {
        insert_card(&mut hdu, key, card);
    }

    // IRAF convention: cutout pixel = parent pixel + LTV.
    insert_real(&mut hdu, "LTV1", -(cutout.origin.0 as f64));
    insert_real(&mut hdu, "LTV2", -(cutout.origin.1 as f64));
    insert_real(&mut hdu, "SEEING", product.seeing_arcsec);
    if let Some(maglim) = product.mag_limit {
        insert_real(&mut hdu, "MAGLIM", maglim);
    }
    hdu.insert("OBJECT", object);
    if let Some(record) = record {
        insert_real(&mut hdu, "VMAG", record.v_mag);
    }
    insert_real(&mut hdu, "TRAILLEN", product.geometry.length);
    insert_real(&mut hdu, "TRAILPA", product.geometry.angle.to_degrees());
    insert_real(&mut hdu, "TRAILHW", product.geometry.half_width);
    insert_real(&mut hdu, "MEDIAN", product.stats.median);
    insert_real(&mut hdu, "STDDEV", product.stats.std_dev);
    insert_real(&mut hdu, "DISPMIN", product.display_range.0);
    insert_real(&mut hdu, "DISPMAX", product.display_range.1);

    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to replace existing file: {}", path.display()))?;
    }
    Fits::create(path, hdu)
        .with_context(|| format!("Failed to write FITS file: {}", path.display()))?;
    tracing::debug!("💾 Saved FITS: {}", path.display());
    Ok(())
}

fn insert_card(hdu: &mut Hdu, key: &str, card: &Card) {
    match card {
        Card::Real(v) => insert_real(hdu, key, *v),
        Card::Integer(v) => match i32::try_from(*v) {
            Ok(v) => hdu.insert(key, v),
            Err(_) => insert_real(hdu, key, *v as f64),
        },
        Card::Text(s) => hdu.insert(key, s.as_str()),
        Card::Logical(_) => tracing::trace!("⏭️  Not copying logical card {}", key),
    }
}

/// Width of the value field fitrs writes a real card into.
const REAL_FIELD_WIDTH: usize = 20;

/// Farthest a written real may move from its value, in units in the last place.
const MAX_ULP_SHIFT: i64 = 8192;

/// Insert a real-valued card that fitrs can serialize.
///
/// fitrs formats reals by repeated scaling by ten into a fixed 20-byte
/// field. The scaling leaves float noise in the mantissa and a formatted
/// value longer than the field aborts the write, while zero and infinity
/// never leave the scaling loop. Zero is stored as an integer card,
/// non-finite values are left out, and anything else is moved to the
/// nearest representation that fits, a relative change below 1e-12.
pub fn insert_real(hdu: &mut Hdu, key: &str, value: f64) {
    if value == 0.0 {
        hdu.insert(key, 0i32);
        return;
    }
    match header_real(value) {
        Some(v) => hdu.insert(key, v),
        None => tracing::warn!("⚠️  Not writing card {} = {}", key, value),
    }
}

/// Nearest neighbour of `value` whose fitrs representation fits the card.
fn header_real(value: f64) -> Option<f64> {
    if !value.is_finite() || value == 0.0 {
        return None;
    }
    let bits = value.to_bits() as i64;
    (0..=MAX_ULP_SHIFT)
        .flat_map(|step| [step, -step])
        .map(|delta| f64::from_bits((bits + delta) as u64))
        .find(|c| c.is_finite() && *c != 0.0 && formatted_len(*c) <= REAL_FIELD_WIDTH)
}

/// Length of the text fitrs produces for a nonzero finite real.
fn formatted_len(value: f64) -> usize {
    let mut mantissa = value;
    let mut exp = 0i32;
    if mantissa.abs() >= 10.0 {
        while mantissa.abs() >= 10.0 {
            mantissa /= 10.0;
            exp += 1;
        }
    } else {
        while mantissa.abs() < 1.0 {
            mantissa *= 10.0;
            exp -= 1;
        }
    }
    format!("{}E+{:02}", mantissa, exp.abs()).len()
}

pub fn write_metadata_text(
    path: &Path,
    product: &TrailProduct,
    object: &str,
    record: Option<&ObservationRecord>,
) -> Result<()> {
    fs::write(path, metadata_text(product, object, record))
        .with_context(|| format!("Failed to write metadata: {}", path.display()))
}

pub fn write_summary_json(path: &Path, summary: &TrailSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("Failed to write summary: {}", path.display()))
}

/// Plain-text companion describing the trail.
pub fn metadata_text(
    product: &TrailProduct,
    object: &str,
    record: Option<&ObservationRecord>,
) -> String {
    let or_na = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "n/a".into());
    let (lo, hi) = product.display_range;
    format!(
        "Asteroid: {}\n\
         Observation Time: {}\n\
         Vmag: {}\n\
         Mag Limit: {}\n\
         FWHM: {:.2}\"\n\
         Start: {:.6}, {:.6}\n\
         End: {:.6}, {:.6}\n\
         Median: {:.1} ADU\n\
         1σ: ±{:.1} ADU\n\
         Range: {:.1}-{:.1}\n",
        object,
        record
            .map(|r| r.observed_at_utc())
            .unwrap_or_else(|| "n/a".into()),
        or_na(record.map(|r| r.v_mag)),
        or_na(product.mag_limit),
        product.seeing_arcsec,
        product.start_sky.ra,
        product.start_sky.dec,
        product.end_sky.ra,
        product.end_sky.dec,
        product.stats.median,
        product.stats.std_dev,
        lo,
        hi,
    )
}

/// Render the cutout, the rotated streak and the profile into one PNG.
pub fn write_preview_png(path: &Path, product: &TrailProduct) -> Result<()> {
    let preview = render_preview(product);

    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create preview: {}", path.display()))?;
    let writer = std::io::BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(
        &preview,
        preview.width(),
        preview.height(),
        ColorType::Rgb8.into(),
    )?;

    tracing::debug!("🎨 Created preview: {}", path.display());
    Ok(())
}

/// Compose the preview image.
///
/// The cutout is drawn with row 0 at the bottom, the usual orientation for
/// sky images. The streak view, if any, is scaled to the cutout height and
/// placed to its right. The profile runs along the bottom.
pub fn render_preview(product: &TrailProduct) -> RgbImage {
    let cutout = &product.cutout;
    let (lo, hi) = product.display_range;
    let cw = cutout.width as u32;
    let ch = cutout.height as u32;

    let streak_scale = product
        .streak_view
        .as_ref()
        .map(|v| (ch / v.height.max(1) as u32).max(1))
        .unwrap_or(0);
    let streak_width = product
        .streak_view
        .as_ref()
        .map(|v| v.width as u32 * streak_scale)
        .unwrap_or(0);

    let width = cw + streak_width;
    let mut canvas = RgbImage::new(width, ch + PROFILE_HEIGHT);

    for y in 0..cutout.height {
        for x in 0..cutout.width {
            let value = cutout.data[y * cutout.width + x];
            canvas.put_pixel(x as u32, ch - 1 - y as u32, gray(value, lo, hi));
        }
    }

    let flip = |p: &PixelPoint| (p.x as f32, (ch as f64 - 1.0 - p.y) as f32);

    let corners = product.geometry.corners();
    for i in 0..corners.len() {
        let a = flip(&corners[i]);
        let b = flip(&corners[(i + 1) % corners.len()]);
        draw_line_segment_mut(&mut canvas, a, b, MASK_COLOR);
    }

    let (sx, sy) = flip(&product.geometry.start);
    draw_hollow_circle_mut(&mut canvas, (sx as i32, sy as i32), MARKER_SIZE, START_COLOR);
    let (ex, ey) = flip(&product.geometry.end);
    draw_hollow_rect_mut(
        &mut canvas,
        Rect::at(ex as i32 - MARKER_SIZE, ey as i32 - MARKER_SIZE)
            .of_size(2 * MARKER_SIZE as u32, 2 * MARKER_SIZE as u32),
        END_COLOR,
    );

    if let Some(view) = &product.streak_view {
        draw_streak(&mut canvas, view, cw, streak_scale, lo, hi);
    }

    draw_profile(&mut canvas, product, ch);
    canvas
}

fn gray(value: f32, lo: f64, hi: f64) -> Rgb<u8> {
    if !value.is_finite() || hi <= lo {
        return Rgb([0, 0, 0]);
    }
    let level = ((value as f64 - lo) / (hi - lo)).clamp(0.0, 1.0);
    let v = (level * 255.0).round() as u8;
    Rgb([v, v, v])
}

fn draw_streak(canvas: &mut RgbImage, view: &StreakView, x0: u32, scale: u32, lo: f64, hi: f64) {
    let top = canvas.height() - PROFILE_HEIGHT;
    for y in 0..view.height {
        for x in 0..view.width {
            let color = gray(view.data[y * view.width + x], lo, hi);
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x0 + x as u32 * scale + dx;
                    let row = (view.height - 1 - y) as u32 * scale + dy;
                    if px < canvas.width() && row < top {
                        canvas.put_pixel(px, row, color);
                    }
                }
            }
        }
    }
}

fn draw_profile(canvas: &mut RgbImage, product: &TrailProduct, top: u32) {
    let samples = &product.profile.samples;
    let finite: Vec<f64> = samples
        .iter()
        .filter(|s| s.intensity.is_finite())
        .flat_map(|s| [s.lower, s.upper])
        .collect();
    if samples.len() < 2 || finite.is_empty() {
        return;
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };
    let plot_w = (canvas.width() - 1) as f64;
    let plot_h = (PROFILE_HEIGHT - 11) as f64;

    let to_xy = |i: usize, v: f64| {
        let x = plot_w * i as f64 / (samples.len() - 1) as f64;
        let y = top as f64 + 5.0 + plot_h * (1.0 - (v - min) / span);
        (x as f32, y as f32)
    };

    for (i, pair) in samples.windows(2).enumerate() {
        if !(pair[0].intensity.is_finite() && pair[1].intensity.is_finite()) {
            continue;
        }
        draw_line_segment_mut(canvas, to_xy(i, pair[0].lower), to_xy(i + 1, pair[1].lower), BAND_COLOR);
        draw_line_segment_mut(canvas, to_xy(i, pair[0].upper), to_xy(i + 1, pair[1].upper), BAND_COLOR);
        draw_line_segment_mut(
            canvas,
            to_xy(i, pair[0].intensity),
            to_xy(i + 1, pair[1].intensity),
            PROFILE_COLOR,
        );
    }
}
