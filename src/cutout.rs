use serde::{Deserialize, Serialize};

use crate::error::{TrailError, TrailResult};
use crate::fits_image::FitsImage;
use crate::wcs::{CelestialWcs, PixelPoint};

/// Square region of an image, in parent pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutoutRegion {
    pub center: PixelPoint,
    /// Requested side length in pixels, before rounding.
    pub size: f64,
}

impl CutoutRegion {
    /// Integral side length of the extracted square.
    pub fn side(&self) -> usize {
        self.size.round().max(1.0) as usize
    }

    /// Lower edge on each axis; may be negative or beyond the image.
    pub fn lower_edge(&self) -> (i64, i64) {
        let half = self.side() as f64 / 2.0;
        (
            (self.center.x - half).ceil() as i64,
            (self.center.y - half).ceil() as i64,
        )
    }
}

/// Chooses a cutout that holds both trail endpoints with room to spare.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoutSizer {
    pub min_size: f64,
    pub size_factor: f64,
    pub margin: f64,
}

impl Default for CutoutSizer {
    fn default() -> Self {
        Self {
            min_size: 100.0,
            size_factor: 1.5,
            margin: 50.0,
        }
    }
}

impl CutoutSizer {
    /// Center on the endpoint midpoint; side is `max(span * factor + margin, min)`.
    pub fn size(&self, start: &PixelPoint, end: &PixelPoint) -> CutoutRegion {
        let span = (start.x - end.x).abs().max((start.y - end.y).abs());
        let size = (span * self.size_factor + self.margin).max(self.min_size);

        CutoutRegion {
            center: start.midpoint(end),
            size,
        }
    }
}

/// Pixels copied out of a parent image together with a mapping valid for them.
#[derive(Debug, Clone)]
pub struct Cutout {
    pub width: usize,
    pub height: usize,
    /// Row-major pixels, `x` fastest.
    pub data: Vec<f32>,
    /// Parent pixel coordinates of this cutout's `(0, 0)` pixel.
    pub origin: (usize, usize),
    pub region: CutoutRegion,
    pub wcs: CelestialWcs,
}

impl Cutout {
    /// Copy `region` out of `image`, clipped to the image bounds.
    ///
    /// A region that only partly overlaps the image yields a smaller cutout;
    /// one that misses it entirely is an [`TrailError::EmptySelection`].
    pub fn extract(image: &FitsImage, region: CutoutRegion) -> TrailResult<Self> {
        let side = region.side() as i64;
        let (x0, y0) = region.lower_edge();

        let x_start = x0.clamp(0, image.width as i64) as usize;
        let y_start = y0.clamp(0, image.height as i64) as usize;
        let x_end = (x0 + side).clamp(0, image.width as i64) as usize;
        let y_end = (y0 + side).clamp(0, image.height as i64) as usize;

        if x_end <= x_start || y_end <= y_start {
            return Err(TrailError::EmptySelection(format!(
                "cutout centred at ({:.1}, {:.1}) with side {} does not overlap the {}x{} image",
                region.center.x, region.center.y, side, image.width, image.height
            )));
        }

        let width = x_end - x_start;
        let height = y_end - y_start;
        let mut data = Vec::with_capacity(width * height);
        for y in y_start..y_end {
            let row = y * image.width;
            data.extend_from_slice(&image.data[row + x_start..row + x_end]);
        }

        if width < side as usize || height < side as usize {
            tracing::debug!(
                "✂️  Cutout clipped to {}x{} (requested {}x{}) at image edge",
                width,
                height,
                side,
                side
            );
        }

        Ok(Self {
            width,
            height,
            data,
            origin: (x_start, y_start),
            region,
            wcs: image.wcs.shifted((x_start, y_start)),
        })
    }

    /// Translate a parent pixel position into this cutout's pixel space.
    pub fn to_cutout_position(&self, parent: &PixelPoint) -> PixelPoint {
        PixelPoint::new(
            parent.x - self.origin.0 as f64,
            parent.y - self.origin.1 as f64,
        )
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    /// True when the image edge cut into the requested square.
    pub fn is_clipped(&self) -> bool {
        let side = self.region.side();
        self.width < side || self.height < side
    }
}
