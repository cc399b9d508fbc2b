use anyhow::Result;
use std::path::Path;

use crate::fits_image::FitsImage;
use crate::models::FitsInfo;
use crate::wcs::PixelPoint;

pub fn read_fits(path: &Path, format: &str) -> Result<FitsInfo> {
    let image = FitsImage::open(path)?;
    let wcs = &image.wcs;
    let pixel_scale = wcs.pixel_scale_arcsec();
    let center = PixelPoint::new(
        (image.width as f64 - 1.0) / 2.0,
        (image.height as f64 - 1.0) / 2.0,
    );

    let info = FitsInfo {
        path: path.display().to_string(),
        width: image.width,
        height: image.height,
        crval: wcs.crval(),
        crpix: wcs.crpix(),
        pixel_scale_arcsec: pixel_scale,
        has_sip: wcs.sip().is_some(),
        seeing_arcsec: image.seeing_arcsec,
        fwhm_px: image.seeing_arcsec / pixel_scale,
        mag_limit: image.mag_limit,
        center_sky: wcs.pixel_to_sky(&center),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&info)?),
        _ => {
            println!("File: {}", info.path);
            println!("  Dimensions: {}x{}", info.width, info.height);
            println!(
                "  Reference: pixel ({:.2}, {:.2}) -> RA {:.6}, Dec {:.6}",
                info.crpix.x, info.crpix.y, info.crval.ra, info.crval.dec
            );
            println!(
                "  Center: RA {:.6}, Dec {:.6}",
                info.center_sky.ra, info.center_sky.dec
            );
            println!(
                "  Pixel scale: {:.4}\"/px{}",
                info.pixel_scale_arcsec,
                if info.has_sip { " (SIP distortion)" } else { "" }
            );
            println!(
                "  Seeing: {:.2}\" ({:.2} px)",
                info.seeing_arcsec, info.fwhm_px
            );
            match info.mag_limit {
                Some(m) => println!("  Mag limit: {:.2}", m),
                None => println!("  Mag limit: n/a"),
            }
        }
    }

    Ok(info)
}
