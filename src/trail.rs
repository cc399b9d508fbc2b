//! Trail geometry and the rotated-rectangle mask aligned with it.

use serde::{Deserialize, Serialize};

use crate::wcs::PixelPoint;

/// Straight-line trail between two cutout-local positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailGeometry {
    pub start: PixelPoint,
    pub end: PixelPoint,
    pub midpoint: PixelPoint,
    /// Euclidean distance between the endpoints, in pixels.
    pub length: f64,
    /// Angle of the motion vector from the +x axis, in radians.
    /// Zero when the endpoints coincide.
    pub angle: f64,
    /// Half of the mask extent perpendicular to the motion, in pixels.
    pub half_width: f64,
}

impl TrailGeometry {
    pub fn from_endpoints(start: PixelPoint, end: PixelPoint, half_width: f64) -> Self {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let angle = if dx == 0.0 && dy == 0.0 {
            0.0
        } else {
            dy.atan2(dx)
        };

        Self {
            start,
            end,
            midpoint: start.midpoint(&end),
            length: dx.hypot(dy),
            angle,
            half_width,
        }
    }

    /// Offset of `(x, y)` from the midpoint, expressed along and across the trail.
    #[inline]
    pub fn to_trail_frame(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin_t, cos_t) = self.angle.sin_cos();
        let dx = x - self.midpoint.x;
        let dy = y - self.midpoint.y;
        (dx * cos_t + dy * sin_t, -dx * sin_t + dy * cos_t)
    }

    /// Whether a pixel centre lies strictly inside the trail rectangle.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (along, across) = self.to_trail_frame(x, y);
        along.abs() < self.length / 2.0 && across.abs() < self.half_width
    }

    /// Corners of the trail rectangle, in the same pixel space as the endpoints.
    pub fn corners(&self) -> [PixelPoint; 4] {
        let (sin_t, cos_t) = self.angle.sin_cos();
        let (hl, hw) = (self.length / 2.0, self.half_width);
        [(-hl, -hw), (hl, -hw), (hl, hw), (-hl, hw)].map(|(a, c)| {
            PixelPoint::new(
                self.midpoint.x + a * cos_t - c * sin_t,
                self.midpoint.y + a * sin_t + c * cos_t,
            )
        })
    }
}

/// Boolean field over a cutout's pixel grid marking the trail rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailMask {
    pub width: usize,
    pub height: usize,
    bits: Vec<bool>,
}

impl TrailMask {
    pub fn build(width: usize, height: usize, geometry: &TrailGeometry) -> Self {
        let mut bits = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                bits.push(geometry.contains(x as f64, y as f64));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn is_set(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Values of `data` (same row-major layout as the mask) under set bits.
    pub fn select<'a>(&'a self, data: &'a [f32]) -> impl Iterator<Item = f32> + 'a {
        self.bits
            .iter()
            .zip(data.iter())
            .filter_map(|(&keep, &v)| keep.then_some(v))
    }
}
