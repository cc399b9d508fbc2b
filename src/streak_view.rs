use image::{ImageBuffer, Luma};
use imageproc::geometric_transformations::{rotate, Interpolation};

use crate::cutout::Cutout;
use crate::trail::TrailGeometry;

/// Close-up of the trail rotated so that the motion runs along +x.
#[derive(Debug, Clone, PartialEq)]
pub struct StreakView {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl StreakView {
    /// Rotate `cutout` about the trail midpoint by the trail angle and crop a
    /// square of `±crop_factor·fwhm_px` around it.
    ///
    /// Returns `None` when the crop would be empty.
    pub fn render(
        cutout: &Cutout,
        geometry: &TrailGeometry,
        fwhm_px: f64,
        crop_factor: f64,
    ) -> Option<Self> {
        let half = (fwhm_px * crop_factor) as i64;
        if half <= 0 {
            return None;
        }

        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(cutout.width as u32, cutout.height as u32, cutout.data.clone())?;

        let center = (geometry.midpoint.x as f32, geometry.midpoint.y as f32);
        let rotated = rotate(
            &buffer,
            center,
            -geometry.angle as f32,
            Interpolation::Bilinear,
            Luma([f32::NAN]),
        );

        let cx = geometry.midpoint.x.round() as i64;
        let cy = geometry.midpoint.y.round() as i64;
        let x0 = (cx - half).clamp(0, cutout.width as i64) as u32;
        let x1 = (cx + half).clamp(0, cutout.width as i64) as u32;
        let y0 = (cy - half).clamp(0, cutout.height as i64) as u32;
        let y1 = (cy + half).clamp(0, cutout.height as i64) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let mut data = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                data.push(rotated.get_pixel(x, y)[0]);
            }
        }

        Some(Self {
            width: (x1 - x0) as usize,
            height: (y1 - y0) as usize,
            data,
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
