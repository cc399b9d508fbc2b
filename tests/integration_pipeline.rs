use fitrs::{Fits, Hdu};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use trail_cutout::commands::{cutout, read_fits, run_batch_command, CutoutRequest};
use trail_cutout::config::Config;
use trail_cutout::metadata::ObservationRecord;
use trail_cutout::output::insert_real;
use trail_cutout::pipeline::TrailPipeline;
use trail_cutout::{FitsImage, PixelPoint, SkyPoint, TrailError};

// ---- Test Harness ----

const WIDTH: usize = 200;
const HEIGHT: usize = 200;
const CRVAL: (f64, f64) = (150.0, 20.0);

/// 200x200 frame at 1"/px with background 100 and a bright 5x3 block
/// centred on pixel (100, 100).
fn synthetic_pixels(noise: Option<u64>) -> Vec<f32> {
    let mut data = vec![100.0f32; WIDTH * HEIGHT];
    if let Some(seed) = noise {
        let mut rng = StdRng::seed_from_u64(seed);
        for v in data.iter_mut() {
            *v += rng.random_range(-5.0f32..5.0);
        }
    }
    for y in 99..=101 {
        for x in 98..=102 {
            data[y * WIDTH + x] = 1000.0;
        }
    }
    data
}

fn write_exposure(path: &Path, data: Vec<f32>) {
    let mut hdu = Hdu::new(&[WIDTH, HEIGHT], data);
    hdu.insert("CTYPE1", "RA---TAN");
    hdu.insert("CTYPE2", "DEC--TAN");
    insert_real(&mut hdu, "CRPIX1", 101.0);
    insert_real(&mut hdu, "CRPIX2", 101.0);
    insert_real(&mut hdu, "CRVAL1", CRVAL.0);
    insert_real(&mut hdu, "CRVAL2", CRVAL.1);
    insert_real(&mut hdu, "CD1_1", -1.0 / 3600.0);
    insert_real(&mut hdu, "CD1_2", 0.0);
    insert_real(&mut hdu, "CD2_1", 0.0);
    insert_real(&mut hdu, "CD2_2", 1.0 / 3600.0);
    insert_real(&mut hdu, "SEEING", 2.0);
    insert_real(&mut hdu, "MAGLIM", 20.5);
    hdu.insert("FILTER", "zr");
    Fits::create(path, hdu).unwrap();
}

fn sky_at(image: &FitsImage, x: f64, y: f64) -> SkyPoint {
    image.wcs.pixel_to_sky(&PixelPoint::new(x, y))
}

fn record_text(file: &str, start: SkyPoint, end: Option<SkyPoint>) -> String {
    let mut text = format!(
        "File: {file}\nObservation Date: 2020-01-15\nObservation Time: 12:34:56.789\n\
         RA: {:.6}\nDec: {:.6}\nVmag: 17.8\n",
        start.ra, start.dec
    );
    if let Some(end) = end {
        text.push_str(&ObservationRecord::motion_block(&end, 30.0));
    }
    text
}

fn test_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.merge_with_cli(Some(output.display().to_string()), None, Some(2), true);
    config
}

// ---- Tests ----

#[test]
fn test_horizontal_trail_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let fits_path = temp_dir.path().join("frame.fits");
    write_exposure(&fits_path, synthetic_pixels(None));

    let image = FitsImage::open(&fits_path).unwrap();
    assert_eq!((image.width, image.height), (WIDTH, HEIGHT));
    assert_eq!(image.seeing_arcsec, 2.0);
    assert_eq!(image.mag_limit, Some(20.5));
    assert!((image.wcs.pixel_scale_arcsec() - 1.0).abs() < 1e-9);

    let start = sky_at(&image, 50.0, 100.0);
    let end = sky_at(&image, 150.0, 100.0);
    let product = TrailPipeline::new(Config::default().pipeline)
        .process(&image, &start, &end)
        .unwrap();

    // 1.5 * 100 + 50 = 200
    assert!(product.cutout.region.size >= 150.0);
    // Sub-pixel projection noise can move the lower edge by one pixel.
    assert!(product.cutout.width >= 199 && product.cutout.height >= 199);
    assert!((product.geometry.half_width - 4.0).abs() < 1e-9);

    // Roughly 100 x 8 pixels along y = 100; projection noise can add a row
    // or column.
    let count = product.mask.count();
    assert!((99 * 7..=101 * 9).contains(&count), "mask count {count}");
    assert_eq!(product.stats.median, 100.0);

    let profile = &product.profile;
    assert_eq!(profile.len(), 100);
    let bright: Vec<usize> = profile
        .samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.intensity > 500.0)
        .map(|(i, _)| i)
        .collect();
    assert!(!bright.is_empty());
    assert!(bright.iter().all(|i| (46..=53).contains(i)), "{bright:?}");
    assert!(profile.samples[..40].iter().all(|s| s.intensity == 100.0));
    assert!(profile.samples[60..].iter().all(|s| s.intensity == 100.0));
}

#[test]
fn test_noisy_background_statistics() {
    let temp_dir = TempDir::new().unwrap();
    let fits_path = temp_dir.path().join("noisy.fits");
    write_exposure(&fits_path, synthetic_pixels(Some(7)));

    let image = FitsImage::open(&fits_path).unwrap();
    let product = TrailPipeline::new(Config::default().pipeline)
        .process(&image, &sky_at(&image, 60.0, 60.0), &sky_at(&image, 140.0, 140.0))
        .unwrap();

    assert!((product.geometry.angle.to_degrees() - 45.0).abs() < 1e-3);
    assert!((product.stats.median - 100.0).abs() < 1.0);
    // Uniform noise on [-5, 5) has σ ≈ 2.9; a few bright pixels widen it.
    assert!(product.stats.std_dev > 2.0);
    let (lo, hi) = product.display_range;
    assert!(lo < product.stats.median && product.stats.median < hi);
    let band = product.profile.band;
    assert!((band - product.stats.std_dev).abs() < 1e-12);
}

#[test]
fn test_degenerate_and_edge_trails() {
    let temp_dir = TempDir::new().unwrap();
    let fits_path = temp_dir.path().join("frame.fits");
    write_exposure(&fits_path, synthetic_pixels(None));
    let image = FitsImage::open(&fits_path).unwrap();
    let pipeline = TrailPipeline::new(Config::default().pipeline);

    let p = sky_at(&image, 120.0, 40.0);
    assert!(matches!(
        pipeline.process(&image, &p, &p),
        Err(TrailError::DegenerateTrail { .. })
    ));

    let product = pipeline
        .process(&image, &sky_at(&image, 5.0, 5.0), &sky_at(&image, 25.0, 10.0))
        .unwrap();
    assert!(product.cutout.is_clipped());
    assert_eq!(product.cutout.origin, (0, 0));
    assert!((65..=66).contains(&product.cutout.width));
    assert_eq!(product.cutout.height, 58);
}

#[test]
fn test_cutout_command_writes_products() {
    let temp_dir = TempDir::new().unwrap();
    let fits_path = temp_dir.path().join("ztf_1_scimrefdiffimg.fits");
    write_exposure(&fits_path, synthetic_pixels(None));
    let image = FitsImage::open(&fits_path).unwrap();

    let record_path = temp_dir.path().join("ztf_1_sciimg.fits.txt");
    let start = sky_at(&image, 50.0, 100.0);
    let end = sky_at(&image, 150.0, 100.0);
    fs::write(&record_path, record_text("ztf_1_sciimg.fits", start, Some(end))).unwrap();

    let out_dir = temp_dir.path().join("cutouts");
    let config = test_config(&out_dir);
    let request = CutoutRequest {
        fits_path: fits_path.clone(),
        start,
        end,
        object: "2001 AB".to_string(),
        record: Some(record_path),
    };
    let summary = cutout(&config, &request, "json").unwrap();

    let object_dir = out_dir.join("2001 AB");
    for ext in ["fits", "txt", "png", "json"] {
        let path = object_dir.join(format!("ztf_1_scimrefdiffimg_cutout.{ext}"));
        assert!(path.is_file(), "missing {}", path.display());
    }
    assert_eq!(summary.outputs.len(), 4);
    assert_eq!(summary.v_mag, Some(17.8));
    assert_eq!(summary.observatory.as_deref(), Some("I41"));
    assert_eq!(summary.exposure_s, Some(30.0));

    let text = fs::read_to_string(object_dir.join("ztf_1_scimrefdiffimg_cutout.txt")).unwrap();
    assert!(text.contains("Asteroid: 2001 AB"));
    assert!(text.contains("Observation Time: 2020-01-15 12:34:56.789"));
    assert!(text.contains("Vmag: 17.80"));
    assert!(text.contains("Mag Limit: 20.50"));
    assert!(text.contains("Median: 100.0 ADU"));

    // The saved cutout carries a mapping consistent with the trail geometry.
    let saved = FitsImage::open(&object_dir.join("ztf_1_scimrefdiffimg_cutout.fits")).unwrap();
    assert_eq!((saved.width, saved.height), (summary.cutout.width, summary.cutout.height));
    assert_eq!(saved.seeing_arcsec, 2.0);
    let local = saved.wcs.sky_to_pixel(&start).unwrap();
    assert!((local.x - summary.geometry.start.x).abs() < 1e-3);
    assert!((local.y - summary.geometry.start.y).abs() < 1e-3);

    let json = fs::read_to_string(object_dir.join("ztf_1_scimrefdiffimg_cutout.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["profile"].as_array().unwrap().len(), 100);
    assert_eq!(value["object"], "2001 AB");
}

#[test]
fn test_batch_continues_past_failures() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("mostoutput");
    let object_dir = root.join("433");
    fs::create_dir_all(&object_dir).unwrap();

    let image_path = object_dir.join("ztf_a_scimrefdiffimg.fits");
    write_exposure(&image_path, synthetic_pixels(None));
    let image = FitsImage::open(&image_path).unwrap();
    let start = sky_at(&image, 50.0, 100.0);
    let end = sky_at(&image, 150.0, 100.0);

    // Good pair
    fs::write(
        object_dir.join("ztf_a_sciimg.fits.fz.txt"),
        record_text("ztf_a_sciimg.fits", start, Some(end)),
    )
    .unwrap();
    // No end position yet
    fs::write(
        object_dir.join("ztf_b_sciimg.fits.fz.txt"),
        record_text("ztf_a_sciimg.fits", start, None),
    )
    .unwrap();
    // Image missing
    fs::write(
        object_dir.join("ztf_c_sciimg.fits.fz.txt"),
        record_text("ztf_c_sciimg.fits", start, Some(end)),
    )
    .unwrap();
    // Zero motion
    fs::write(
        object_dir.join("ztf_d_sciimg.fits.fz.txt"),
        record_text("ztf_a_sciimg.fits", start, Some(start)),
    )
    .unwrap();
    // Broken record
    fs::write(object_dir.join("ztf_e_sciimg.fits.fz.txt"), "File: x.fits\n").unwrap();
    // No object directory
    fs::write(
        root.join("ztf_f_sciimg.fits.fz.txt"),
        record_text("ztf_a_sciimg.fits", start, Some(end)),
    )
    .unwrap();

    let out_dir = temp_dir.path().join("cutouts");
    let report = run_batch_command(&test_config(&out_dir), &root, "text").unwrap();

    assert_eq!(report.total(), 6);
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().any(|s| s.ends_with("ztf_f_sciimg.fits.fz.txt")));
    assert_eq!(report.failures.len(), 3);

    let kind_of = |name: &str| {
        report
            .failures
            .iter()
            .find(|f| f.source.contains(name))
            .map(|f| f.kind.clone())
    };
    assert_eq!(kind_of("ztf_c").as_deref(), Some("unexpected"));
    assert_eq!(kind_of("ztf_d").as_deref(), Some("degenerate_trail"));
    assert_eq!(kind_of("ztf_e").as_deref(), Some("invalid_metadata"));

    let processed = &report.processed[0];
    assert_eq!(processed.object.as_deref(), Some("433"));
    assert!(out_dir
        .join("433")
        .join("ztf_a_scimrefdiffimg_cutout.fits")
        .is_file());
}

#[test]
fn test_read_fits_reports_astrometry() {
    let temp_dir = TempDir::new().unwrap();
    let fits_path = temp_dir.path().join("frame.fits");
    write_exposure(&fits_path, synthetic_pixels(None));

    let info = read_fits(&fits_path, "json").unwrap();
    assert_eq!((info.width, info.height), (WIDTH, HEIGHT));
    assert!((info.pixel_scale_arcsec - 1.0).abs() < 1e-9);
    assert!((info.fwhm_px - 2.0).abs() < 1e-9);
    assert!(!info.has_sip);
    assert!((info.crval.ra - CRVAL.0).abs() < 1e-12);
    assert!((info.crpix.x - 100.0).abs() < 1e-12);
}

#[test]
fn test_missing_seeing_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let fits_path = temp_dir.path().join("noseeing.fits");
    let mut hdu = Hdu::new(&[16, 16], vec![1.0f32; 256]);
    hdu.insert("CTYPE1", "RA---TAN");
    hdu.insert("CTYPE2", "DEC--TAN");
    insert_real(&mut hdu, "CRPIX1", 8.0);
    insert_real(&mut hdu, "CRPIX2", 8.0);
    insert_real(&mut hdu, "CRVAL1", 10.0);
    insert_real(&mut hdu, "CRVAL2", 10.0);
    insert_real(&mut hdu, "CDELT1", -1.0 / 3600.0);
    insert_real(&mut hdu, "CDELT2", 1.0 / 3600.0);
    Fits::create(&fits_path, hdu).unwrap();

    let err = FitsImage::open(&fits_path).unwrap_err();
    assert_eq!(
        err.downcast_ref::<TrailError>(),
        Some(&TrailError::MissingHeader("SEEING"))
    );
}
