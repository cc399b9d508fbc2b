//! Celestial coordinate mapping for FITS images.
//!
//! Only the two celestial axes of a header are kept. Any spectral, Stokes or
//! other axes are dropped before a [`CelestialWcs`] is built, so every
//! projection here is strictly 2-D.
//!
//! Pixel coordinates are zero-based: the centre of the first pixel is `(0, 0)`
//! and `CRPIX` from the header is shifted down by one on load.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{TrailError, TrailResult};

/// A position on the sky, both components in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPoint {
    pub ra: f64,
    pub dec: f64,
}

impl SkyPoint {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Great-circle separation to `other`, in degrees.
    pub fn separation(&self, other: &SkyPoint) -> f64 {
        let (ra1, dec1) = (self.ra.to_radians(), self.dec.to_radians());
        let (ra2, dec2) = (other.ra.to_radians(), other.dec.to_radians());
        let sin_ddec = ((dec2 - dec1) / 2.0).sin();
        let sin_dra = ((ra2 - ra1) / 2.0).sin();
        let h = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
        (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
    }
}

/// A position in pixel space. Not necessarily integral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(&self, other: &PixelPoint) -> PixelPoint {
        PixelPoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn distance(&self, other: &PixelPoint) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A single header value, independent of the FITS reader that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    Real(f64),
    Integer(i64),
    Text(String),
    Logical(bool),
}

impl Card {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Card::Real(v) => Some(*v),
            Card::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Card::Text(s) => Some(s.trim()),
            _ => None,
        }
    }
}

/// Keyword lookup over a FITS header.
pub trait HeaderSource {
    fn card(&self, key: &str) -> Option<Card>;

    fn real(&self, key: &str) -> Option<f64> {
        self.card(key).and_then(|c| c.as_f64())
    }

    fn text(&self, key: &str) -> Option<String> {
        self.card(key)
            .and_then(|c| c.as_str().map(|s| s.to_string()))
    }
}

/// In-memory header, used for synthetic images and for building output headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    cards: BTreeMap<String, Card>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, card: Card) {
        self.cards.insert(key.into(), card);
    }

    pub fn with(mut self, key: impl Into<String>, card: Card) -> Self {
        self.insert(key, card);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Card)> {
        self.cards.iter()
    }
}

impl HeaderSource for HeaderMap {
    fn card(&self, key: &str) -> Option<Card> {
        self.cards.get(key).cloned()
    }
}

/// SIP polynomial distortion terms, stored as `(p, q, coefficient)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SipDistortion {
    pub a_order: usize,
    pub b_order: usize,
    pub ap_order: usize,
    pub bp_order: usize,
    pub a: Vec<(usize, usize, f64)>,
    pub b: Vec<(usize, usize, f64)>,
    pub ap: Vec<(usize, usize, f64)>,
    pub bp: Vec<(usize, usize, f64)>,
}

impl SipDistortion {
    fn from_header(header: &impl HeaderSource) -> Option<Self> {
        let a_order = header.real("A_ORDER")? as usize;
        let b_order = header.real("B_ORDER").map(|v| v as usize).unwrap_or(a_order);
        let ap_order = header.real("AP_ORDER").map(|v| v as usize).unwrap_or(0);
        let bp_order = header.real("BP_ORDER").map(|v| v as usize).unwrap_or(0);

        Some(Self {
            a_order,
            b_order,
            ap_order,
            bp_order,
            a: read_poly(header, "A", a_order),
            b: read_poly(header, "B", b_order),
            ap: read_poly(header, "AP", ap_order),
            bp: read_poly(header, "BP", bp_order),
        })
    }

    /// Pixel offset from CRPIX to distortion-corrected intermediate offset.
    fn forward(&self, u: f64, v: f64) -> (f64, f64) {
        (u + eval_poly(&self.a, u, v), v + eval_poly(&self.b, u, v))
    }

    /// Inverse of [`forward`](Self::forward), by AP/BP when present and by
    /// fixed-point iteration otherwise.
    fn inverse(&self, up: f64, vp: f64) -> (f64, f64) {
        if !self.ap.is_empty() || !self.bp.is_empty() {
            return (up + eval_poly(&self.ap, up, vp), vp + eval_poly(&self.bp, up, vp));
        }

        let (mut u, mut v) = (up, vp);
        for _ in 0..50 {
            let nu = up - eval_poly(&self.a, u, v);
            let nv = vp - eval_poly(&self.b, u, v);
            let converged = (nu - u).abs() < 1e-12 && (nv - v).abs() < 1e-12;
            u = nu;
            v = nv;
            if converged {
                break;
            }
        }
        (u, v)
    }
}

fn read_poly(header: &impl HeaderSource, prefix: &str, order: usize) -> Vec<(usize, usize, f64)> {
    let mut terms = Vec::new();
    for p in 0..=order {
        for q in 0..=(order - p) {
            if let Some(c) = header.real(&format!("{prefix}_{p}_{q}")) {
                if c != 0.0 {
                    terms.push((p, q, c));
                }
            }
        }
    }
    terms
}

fn eval_poly(terms: &[(usize, usize, f64)], u: f64, v: f64) -> f64 {
    terms
        .iter()
        .map(|&(p, q, c)| c * u.powi(p as i32) * v.powi(q as i32))
        .sum()
}

/// Forward gnomonic (TAN) projection, all angles in radians.
///
/// Returns `(ξ, η)` in radians, or `None` when the point lies on or behind the
/// tangent plane.
fn tan_project(ra: f64, dec: f64, crval_ra: f64, crval_dec: f64) -> Option<(f64, f64)> {
    let da = ra - crval_ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None;
    }

    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

/// Inverse gnomonic (TAN) projection, all angles in radians.
fn inverse_tan_project(xi: f64, eta: f64, crval_ra: f64, crval_dec: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let rho_sq = xi * xi + eta * eta;

    if rho_sq < 1e-30 {
        return (crval_ra, crval_dec);
    }

    let rho = rho_sq.sqrt();
    let c = rho.atan();
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = crval_ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra, dec)
}

/// A 2-D celestial astrometric solution (gnomonic projection, optional SIP).
#[derive(Debug, Clone, PartialEq)]
pub struct CelestialWcs {
    /// Zero-based reference pixel.
    crpix: Vector2<f64>,
    /// Reference sky position in degrees.
    crval: SkyPoint,
    /// Linear transform from pixel offsets to intermediate world coordinates (degrees).
    cd: Matrix2<f64>,
    cd_inv: Matrix2<f64>,
    sip: Option<SipDistortion>,
}

impl CelestialWcs {
    /// Build a pure TAN solution. `crpix` is zero-based.
    pub fn new(crpix: PixelPoint, crval: SkyPoint, cd: Matrix2<f64>) -> TrailResult<Self> {
        let cd_inv = cd.try_inverse().ok_or_else(|| {
            TrailError::InvalidAstrometry("CD matrix is singular".to_string())
        })?;
        if !cd.iter().all(|v| v.is_finite()) {
            return Err(TrailError::InvalidAstrometry(
                "CD matrix has non-finite entries".to_string(),
            ));
        }

        Ok(Self {
            crpix: Vector2::new(crpix.x, crpix.y),
            crval,
            cd,
            cd_inv,
            sip: None,
        })
    }

    pub fn with_sip(mut self, sip: SipDistortion) -> Self {
        self.sip = Some(sip);
        self
    }

    /// Extract the celestial solution from a header that may describe more
    /// than two axes.
    pub fn from_header(header: &impl HeaderSource) -> TrailResult<Self> {
        let naxis = header.real("NAXIS").map(|v| v as usize).unwrap_or(2);
        let scan = naxis.max(2);

        let mut lon_axis = None;
        let mut lat_axis = None;
        let mut projection = String::new();
        for i in 1..=scan {
            let Some(ctype) = header.text(&format!("CTYPE{i}")) else {
                continue;
            };
            let ctype = ctype.to_ascii_uppercase();
            if ctype.starts_with("RA") {
                lon_axis = Some(i);
                projection = ctype.chars().skip(5).collect::<String>();
            } else if ctype.starts_with("DEC") {
                lat_axis = Some(i);
            }
        }

        let (Some(lon), Some(lat)) = (lon_axis, lat_axis) else {
            return Err(TrailError::InvalidAstrometry(
                "no RA/DEC axis pair among CTYPE keywords".to_string(),
            ));
        };

        let projection = projection.trim_start_matches('-').to_string();
        if !matches!(projection.as_str(), "TAN" | "TAN-SIP" | "TPV") {
            return Err(TrailError::InvalidAstrometry(format!(
                "unsupported projection '{projection}'"
            )));
        }

        // Pixel axes tied to the celestial world axes, in data order.
        let (px, py) = (lon.min(lat), lon.max(lat));

        let non_singleton: Vec<usize> = (1..=naxis)
            .filter(|i| {
                header
                    .real(&format!("NAXIS{i}"))
                    .map(|n| n as usize != 1)
                    .unwrap_or(true)
            })
            .collect();
        if header.real("NAXIS1").is_some() && non_singleton != vec![px, py] {
            return Err(TrailError::InvalidAstrometry(format!(
                "celestial axes {px} and {py} do not match image axes {non_singleton:?}"
            )));
        }

        let crpix = PixelPoint::new(
            require(header, &format!("CRPIX{px}"))? - 1.0,
            require(header, &format!("CRPIX{py}"))? - 1.0,
        );
        let crval = SkyPoint::new(
            require(header, &format!("CRVAL{lon}"))?,
            require(header, &format!("CRVAL{lat}"))?,
        );

        let cd = linear_transform(header, [lon, lat], [px, py])?;
        let wcs = Self::new(crpix, crval, cd)?;

        Ok(match (projection.as_str(), SipDistortion::from_header(header)) {
            ("TAN-SIP", Some(sip)) => wcs.with_sip(sip),
            _ => wcs,
        })
    }

    pub fn crpix(&self) -> PixelPoint {
        PixelPoint::new(self.crpix.x, self.crpix.y)
    }

    pub fn crval(&self) -> SkyPoint {
        self.crval
    }

    pub fn cd(&self) -> &Matrix2<f64> {
        &self.cd
    }

    pub fn sip(&self) -> Option<&SipDistortion> {
        self.sip.as_ref()
    }

    /// Project a sky position into zero-based pixel coordinates.
    pub fn sky_to_pixel(&self, sky: &SkyPoint) -> TrailResult<PixelPoint> {
        let (xi, eta) = tan_project(
            sky.ra.to_radians(),
            sky.dec.to_radians(),
            self.crval.ra.to_radians(),
            self.crval.dec.to_radians(),
        )
        .ok_or_else(|| {
            TrailError::InvalidAstrometry(format!(
                "({:.6}, {:.6}) lies behind the tangent plane",
                sky.ra, sky.dec
            ))
        })?;

        let world = Vector2::new(xi.to_degrees(), eta.to_degrees());
        let offset = self.cd_inv * world;
        let (u, v) = match &self.sip {
            Some(sip) => sip.inverse(offset.x, offset.y),
            None => (offset.x, offset.y),
        };

        Ok(PixelPoint::new(self.crpix.x + u, self.crpix.y + v))
    }

    /// Map a zero-based pixel position back onto the sky.
    pub fn pixel_to_sky(&self, pixel: &PixelPoint) -> SkyPoint {
        let (u, v) = (pixel.x - self.crpix.x, pixel.y - self.crpix.y);
        let (u, v) = match &self.sip {
            Some(sip) => sip.forward(u, v),
            None => (u, v),
        };

        let world = self.cd * Vector2::new(u, v);
        let (ra, dec) = inverse_tan_project(
            world.x.to_radians(),
            world.y.to_radians(),
            self.crval.ra.to_radians(),
            self.crval.dec.to_radians(),
        );

        SkyPoint::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// Plate scale along each pixel axis, in arcsec per pixel.
    pub fn pixel_scales_arcsec(&self) -> [f64; 2] {
        [
            self.cd.column(0).norm() * 3600.0,
            self.cd.column(1).norm() * 3600.0,
        ]
    }

    /// Mean plate scale of the two pixel axes, in arcsec per pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let [sx, sy] = self.pixel_scales_arcsec();
        (sx + sy) / 2.0
    }

    /// The same solution expressed for a sub-image whose first pixel sits at
    /// `origin` in this image.
    pub fn shifted(&self, origin: (usize, usize)) -> Self {
        let mut shifted = self.clone();
        shifted.crpix.x -= origin.0 as f64;
        shifted.crpix.y -= origin.1 as f64;
        shifted
    }

    /// Header cards describing this solution as a 2-axis FITS WCS.
    pub fn to_header(&self) -> HeaderMap {
        let suffix = if self.sip.is_some() { "-SIP" } else { "" };
        let mut header = HeaderMap::new()
            .with("CTYPE1", Card::Text(format!("RA---TAN{suffix}")))
            .with("CTYPE2", Card::Text(format!("DEC--TAN{suffix}")))
            .with("CRPIX1", Card::Real(self.crpix.x + 1.0))
            .with("CRPIX2", Card::Real(self.crpix.y + 1.0))
            .with("CRVAL1", Card::Real(self.crval.ra))
            .with("CRVAL2", Card::Real(self.crval.dec))
            .with("CD1_1", Card::Real(self.cd[(0, 0)]))
            .with("CD1_2", Card::Real(self.cd[(0, 1)]))
            .with("CD2_1", Card::Real(self.cd[(1, 0)]))
            .with("CD2_2", Card::Real(self.cd[(1, 1)]));

        if let Some(sip) = &self.sip {
            header.insert("A_ORDER", Card::Integer(sip.a_order as i64));
            header.insert("B_ORDER", Card::Integer(sip.b_order as i64));
            for (name, terms) in [("A", &sip.a), ("B", &sip.b), ("AP", &sip.ap), ("BP", &sip.bp)] {
                for &(p, q, c) in terms {
                    header.insert(format!("{name}_{p}_{q}"), Card::Real(c));
                }
            }
            if !sip.ap.is_empty() {
                header.insert("AP_ORDER", Card::Integer(sip.ap_order as i64));
            }
            if !sip.bp.is_empty() {
                header.insert("BP_ORDER", Card::Integer(sip.bp_order as i64));
            }
        }

        header
    }
}

fn require(header: &impl HeaderSource, key: &str) -> TrailResult<f64> {
    header
        .real(key)
        .ok_or_else(|| TrailError::InvalidAstrometry(format!("missing {key}")))
}

/// Build the 2x2 pixel-to-world matrix in degrees from CD, PC/CDELT or CROTA2.
fn linear_transform(
    header: &impl HeaderSource,
    world: [usize; 2],
    pixel: [usize; 2],
) -> TrailResult<Matrix2<f64>> {
    let cd_key = |w: usize, p: usize| format!("CD{w}_{p}");
    let has_cd = world
        .iter()
        .any(|&w| pixel.iter().any(|&p| header.real(&cd_key(w, p)).is_some()));

    if has_cd {
        let at = |w: usize, p: usize| header.real(&cd_key(w, p)).unwrap_or(0.0);
        return Ok(Matrix2::new(
            at(world[0], pixel[0]),
            at(world[0], pixel[1]),
            at(world[1], pixel[0]),
            at(world[1], pixel[1]),
        ));
    }

    let cdelt = [
        require(header, &format!("CDELT{}", world[0]))?,
        require(header, &format!("CDELT{}", world[1]))?,
    ];

    let has_pc = world
        .iter()
        .any(|&w| pixel.iter().any(|&p| header.real(&format!("PC{w}_{p}")).is_some()));

    if has_pc {
        let pc = |w: usize, p: usize| {
            header
                .real(&format!("PC{w}_{p}"))
                .unwrap_or(if w == p { 1.0 } else { 0.0 })
        };
        return Ok(Matrix2::new(
            cdelt[0] * pc(world[0], pixel[0]),
            cdelt[0] * pc(world[0], pixel[1]),
            cdelt[1] * pc(world[1], pixel[0]),
            cdelt[1] * pc(world[1], pixel[1]),
        ));
    }

    let rho = header
        .real(&format!("CROTA{}", world[1]))
        .unwrap_or(0.0)
        .to_radians();
    let (sin_r, cos_r) = rho.sin_cos();
    Ok(Matrix2::new(
        cdelt[0] * cos_r,
        -cdelt[1] * sin_r,
        cdelt[0] * sin_r,
        cdelt[1] * cos_r,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCSEC: f64 = 1.0 / 3600.0;

    fn simple_wcs() -> CelestialWcs {
        CelestialWcs::new(
            PixelPoint::new(1535.0, 1540.0),
            SkyPoint::new(150.25, 20.5),
            Matrix2::new(-ARCSEC, 0.0, 0.0, ARCSEC),
        )
        .unwrap()
    }

    fn tan_header() -> HeaderMap {
        HeaderMap::new()
            .with("NAXIS", Card::Integer(2))
            .with("NAXIS1", Card::Integer(3072))
            .with("NAXIS2", Card::Integer(3080))
            .with("CTYPE1", Card::Text("RA---TAN".into()))
            .with("CTYPE2", Card::Text("DEC--TAN".into()))
            .with("CRPIX1", Card::Real(1536.0))
            .with("CRPIX2", Card::Real(1541.0))
            .with("CRVAL1", Card::Real(150.25))
            .with("CRVAL2", Card::Real(20.5))
            .with("CD1_1", Card::Real(-2.815e-4))
            .with("CD1_2", Card::Real(1.2e-6))
            .with("CD2_1", Card::Real(-1.1e-6))
            .with("CD2_2", Card::Real(-2.815e-4))
    }

    #[test]
    fn test_reference_pixel_maps_to_reference_sky() {
        let wcs = simple_wcs();
        let sky = wcs.pixel_to_sky(&wcs.crpix());
        assert!((sky.ra - 150.25).abs() < 1e-12);
        assert!((sky.dec - 20.5).abs() < 1e-12);

        let px = wcs.sky_to_pixel(&SkyPoint::new(150.25, 20.5)).unwrap();
        assert!((px.x - 1535.0).abs() < 1e-9);
        assert!((px.y - 1540.0).abs() < 1e-9);
    }

    #[test]
    fn test_sky_pixel_roundtrip() {
        let wcs = CelestialWcs::from_header(&tan_header()).unwrap();
        let points = [
            SkyPoint::new(150.0, 20.0),
            SkyPoint::new(150.5, 20.9),
            SkyPoint::new(149.8, 20.3),
            SkyPoint::new(150.25, 20.5),
        ];

        for sky in points {
            let px = wcs.sky_to_pixel(&sky).unwrap();
            let back = wcs.pixel_to_sky(&px);
            assert!(
                (back.ra - sky.ra).abs() < 1e-9 && (back.dec - sky.dec).abs() < 1e-9,
                "Roundtrip failed for {:?}: got {:?}",
                sky,
                back
            );
        }
    }

    #[test]
    fn test_pixel_sky_roundtrip_across_ra_zero() {
        let wcs = CelestialWcs::new(
            PixelPoint::new(100.0, 100.0),
            SkyPoint::new(0.01, -5.0),
            Matrix2::new(-ARCSEC, 0.0, 0.0, ARCSEC),
        )
        .unwrap();

        for x in [0.0, 50.5, 100.0, 199.0] {
            let px = PixelPoint::new(x, 37.25);
            let sky = wcs.pixel_to_sky(&px);
            assert!((0.0..360.0).contains(&sky.ra));
            let back = wcs.sky_to_pixel(&sky).unwrap();
            assert!((back.x - px.x).abs() < 1e-6);
            assert!((back.y - px.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_east_left_orientation() {
        // With CD1_1 < 0, RA grows toward smaller x.
        let wcs = simple_wcs();
        let left = wcs.pixel_to_sky(&PixelPoint::new(1500.0, 1540.0));
        let right = wcs.pixel_to_sky(&PixelPoint::new(1570.0, 1540.0));
        assert!(left.ra > right.ra);
    }

    #[test]
    fn test_pixel_scale_is_mean_of_axes() {
        let wcs = CelestialWcs::new(
            PixelPoint::new(0.0, 0.0),
            SkyPoint::new(10.0, 10.0),
            Matrix2::new(-1.0 * ARCSEC, 0.0, 0.0, 1.2 * ARCSEC),
        )
        .unwrap();
        let [sx, sy] = wcs.pixel_scales_arcsec();
        assert!((sx - 1.0).abs() < 1e-12);
        assert!((sy - 1.2).abs() < 1e-12);
        assert!((wcs.pixel_scale_arcsec() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_from_header_pc_cdelt() {
        let header = HeaderMap::new()
            .with("CTYPE1", Card::Text("RA---TAN".into()))
            .with("CTYPE2", Card::Text("DEC--TAN".into()))
            .with("CRPIX1", Card::Integer(11))
            .with("CRPIX2", Card::Integer(21))
            .with("CRVAL1", Card::Real(45.0))
            .with("CRVAL2", Card::Real(-30.0))
            .with("CDELT1", Card::Real(-0.001))
            .with("CDELT2", Card::Real(0.001))
            .with("PC1_1", Card::Real(1.0))
            .with("PC2_2", Card::Real(1.0));
        let wcs = CelestialWcs::from_header(&header).unwrap();

        assert_eq!(wcs.crpix(), PixelPoint::new(10.0, 20.0));
        assert!((wcs.cd()[(0, 0)] + 0.001).abs() < 1e-15);
        assert!((wcs.cd()[(1, 1)] - 0.001).abs() < 1e-15);
        assert!((wcs.pixel_scale_arcsec() - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_from_header_crota() {
        let header = HeaderMap::new()
            .with("CTYPE1", Card::Text("RA---TAN".into()))
            .with("CTYPE2", Card::Text("DEC--TAN".into()))
            .with("CRPIX1", Card::Real(1.0))
            .with("CRPIX2", Card::Real(1.0))
            .with("CRVAL1", Card::Real(45.0))
            .with("CRVAL2", Card::Real(10.0))
            .with("CDELT1", Card::Real(-0.001))
            .with("CDELT2", Card::Real(0.001))
            .with("CROTA2", Card::Real(90.0));
        let wcs = CelestialWcs::from_header(&header).unwrap();

        assert!(wcs.cd()[(0, 0)].abs() < 1e-15);
        assert!((wcs.cd()[(0, 1)] + 0.001).abs() < 1e-15);
        assert!((wcs.cd()[(1, 0)] + 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_from_header_drops_extra_axes() {
        let header = tan_header()
            .with("NAXIS", Card::Integer(3))
            .with("NAXIS3", Card::Integer(1))
            .with("CTYPE3", Card::Text("FREQ".into()))
            .with("CRPIX3", Card::Real(1.0))
            .with("CRVAL3", Card::Real(1.4e9))
            .with("CD3_3", Card::Real(1e6));
        let wcs = CelestialWcs::from_header(&header).unwrap();
        let reference = CelestialWcs::from_header(&tan_header()).unwrap();
        assert_eq!(wcs, reference);
    }

    #[test]
    fn test_from_header_rejects_non_celestial() {
        let header = HeaderMap::new()
            .with("CTYPE1", Card::Text("LINEAR".into()))
            .with("CTYPE2", Card::Text("LINEAR".into()));
        let err = CelestialWcs::from_header(&header).unwrap_err();
        assert!(matches!(err, TrailError::InvalidAstrometry(_)));
    }

    #[test]
    fn test_from_header_missing_reference() {
        let header = HeaderMap::new()
            .with("CTYPE1", Card::Text("RA---TAN".into()))
            .with("CTYPE2", Card::Text("DEC--TAN".into()))
            .with("CD1_1", Card::Real(-ARCSEC))
            .with("CD2_2", Card::Real(ARCSEC));
        let err = CelestialWcs::from_header(&header).unwrap_err();
        assert_eq!(err, TrailError::InvalidAstrometry("missing CRPIX1".into()));
    }

    #[test]
    fn test_singular_cd_rejected() {
        let err = CelestialWcs::new(
            PixelPoint::new(0.0, 0.0),
            SkyPoint::new(0.0, 0.0),
            Matrix2::new(1.0, 1.0, 1.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, TrailError::InvalidAstrometry(_)));
    }

    #[test]
    fn test_behind_tangent_plane() {
        let wcs = simple_wcs();
        let err = wcs.sky_to_pixel(&SkyPoint::new(330.25, -20.5)).unwrap_err();
        assert!(matches!(err, TrailError::InvalidAstrometry(_)));
    }

    #[test]
    fn test_sip_roundtrip_without_inverse_terms() {
        let header = tan_header()
            .with("CTYPE1", Card::Text("RA---TAN-SIP".into()))
            .with("CTYPE2", Card::Text("DEC--TAN-SIP".into()))
            .with("A_ORDER", Card::Integer(2))
            .with("B_ORDER", Card::Integer(2))
            .with("A_2_0", Card::Real(2.0e-6))
            .with("A_1_1", Card::Real(-1.0e-6))
            .with("B_0_2", Card::Real(1.5e-6));
        let wcs = CelestialWcs::from_header(&header).unwrap();
        assert!(wcs.sip().is_some());

        for (x, y) in [(10.0, 20.0), (3000.0, 100.0), (1535.0, 1540.0), (2500.5, 2999.25)] {
            let px = PixelPoint::new(x, y);
            let back = wcs.sky_to_pixel(&wcs.pixel_to_sky(&px)).unwrap();
            assert!(
                (back.x - x).abs() < 1e-6 && (back.y - y).abs() < 1e-6,
                "SIP roundtrip failed for ({x}, {y}): got {:?}",
                back
            );
        }
    }

    #[test]
    fn test_shifted_preserves_sky_positions() {
        let wcs = simple_wcs();
        let shifted = wcs.shifted((1000, 1200));
        let sky = wcs.pixel_to_sky(&PixelPoint::new(1100.5, 1300.25));
        let local = shifted.sky_to_pixel(&sky).unwrap();
        assert!((local.x - 100.5).abs() < 1e-6);
        assert!((local.y - 100.25).abs() < 1e-6);
    }

    #[test]
    fn test_to_header_reloads() {
        let wcs = CelestialWcs::from_header(&tan_header()).unwrap();
        let reloaded = CelestialWcs::from_header(&wcs.to_header()).unwrap();
        assert!((reloaded.crpix().x - wcs.crpix().x).abs() < 1e-12);
        assert!((reloaded.crpix().y - wcs.crpix().y).abs() < 1e-12);
        assert_eq!(reloaded.cd(), wcs.cd());
    }

    #[test]
    fn test_to_header_keeps_inverse_sip_order() {
        let header = tan_header()
            .with("CTYPE1", Card::Text("RA---TAN-SIP".into()))
            .with("CTYPE2", Card::Text("DEC--TAN-SIP".into()))
            .with("A_ORDER", Card::Integer(2))
            .with("B_ORDER", Card::Integer(2))
            .with("A_2_0", Card::Real(2.0e-6))
            .with("B_0_2", Card::Real(1.5e-6))
            .with("AP_ORDER", Card::Integer(3))
            .with("BP_ORDER", Card::Integer(3))
            .with("AP_2_0", Card::Real(-2.0e-6))
            .with("AP_3_0", Card::Real(4.0e-12))
            .with("BP_0_3", Card::Real(-3.0e-12));
        let wcs = CelestialWcs::from_header(&header).unwrap();
        let sip = wcs.sip().unwrap();
        assert_eq!((sip.ap_order, sip.bp_order), (3, 3));

        let written = wcs.to_header();
        assert_eq!(written.real("AP_ORDER"), Some(3.0));
        assert_eq!(written.real("BP_ORDER"), Some(3.0));
        let reloaded = CelestialWcs::from_header(&written).unwrap();
        assert_eq!(reloaded.sip(), wcs.sip());
        assert!(reloaded.sip().unwrap().ap.contains(&(3, 0, 4.0e-12)));
    }

    #[test]
    fn test_separation() {
        let a = SkyPoint::new(10.0, 0.0);
        let b = SkyPoint::new(10.0, 1.0);
        assert!((a.separation(&b) - 1.0).abs() < 1e-12);
        assert_eq!(a.separation(&a), 0.0);
    }
}
