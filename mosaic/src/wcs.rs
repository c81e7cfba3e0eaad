//! World Coordinate System parameter extraction and transforms.
//!
//! A FITS header describes the mapping between pixel and sky coordinates
//! through a reference point (CRVAL/CRPIX) and a linear part given either
//! as a CD matrix, a PC matrix with per-axis CDELT scales, or legacy
//! CDELT/CROTA2 keywords. This module normalizes all three layouts into an
//! immutable [`Wcs`] value carrying the CD matrix, and provides the
//! gnomonic (TAN) sky<->pixel transforms used to place images on a mosaic.
//!
//! Rotation extraction follows the classic GETROT decomposition: per-axis
//! rotation angles are recovered from the CD matrix columns and compared,
//! and a mismatch beyond [`SKEW_TOLERANCE_DEG`] is reported as skew rather
//! than silently averaged.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

use crate::header::Header;

/// Maximum allowed difference between the x- and y-axis rotation angles
/// before a header is rejected as skewed, in degrees.
pub const SKEW_TOLERANCE_DEG: f64 = 0.001;

/// Errors raised while resolving WCS information from a header.
#[derive(Error, Debug)]
pub enum WcsError {
    #[error("required WCS keyword {0} is missing")]
    MissingKeyword(&'static str),

    #[error("x/y axes have different rotation angles (x={xrot:.6}, y={yrot:.6} deg): skew detected")]
    Skew { xrot: f64, yrot: f64 },

    #[error("CD matrix is singular and cannot be inverted")]
    SingularMatrix,

    #[error("sky position ra={ra_deg:.6}, dec={dec_deg:.6} does not project onto the tangent plane")]
    Unprojectable { ra_deg: f64, dec_deg: f64 },
}

/// Immutable WCS description of one image: reference sky coordinate,
/// reference pixel and the pixel-to-sky CD matrix in degrees per pixel.
///
/// Canvas growth and allocation construct new values rather than mutating
/// keyword maps in place, so a `Wcs` can never be observed half-updated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wcs {
    /// Reference right ascension in degrees
    crval1: f64,
    /// Reference declination in degrees
    crval2: f64,
    /// Reference pixel x, FITS 1-based
    crpix1: f64,
    /// Reference pixel y, FITS 1-based
    crpix2: f64,
    /// Pixel offset -> sky offset matrix, degrees per pixel
    cd: Matrix2<f64>,
}

/// Read the linear pixel-to-sky matrix out of a header.
///
/// Accepts CD matrix keywords, CDELT scales with an optional PC matrix,
/// or CDELT with the legacy CROTA2 rotation. Off-diagonal CD/PC elements
/// default to zero when absent, per the FITS convention.
fn cd_from_header(header: &Header) -> Result<Matrix2<f64>, WcsError> {
    if header.contains("CD1_1") || header.contains("CD2_2") {
        let cd11 = header
            .get_f64("CD1_1")
            .ok_or(WcsError::MissingKeyword("CD1_1"))?;
        let cd22 = header
            .get_f64("CD2_2")
            .ok_or(WcsError::MissingKeyword("CD2_2"))?;
        let cd12 = header.get_f64("CD1_2").unwrap_or(0.0);
        let cd21 = header.get_f64("CD2_1").unwrap_or(0.0);
        return Ok(Matrix2::new(cd11, cd12, cd21, cd22));
    }

    let cdelt1 = header
        .get_f64("CDELT1")
        .ok_or(WcsError::MissingKeyword("CDELT1"))?;
    let cdelt2 = header
        .get_f64("CDELT2")
        .ok_or(WcsError::MissingKeyword("CDELT2"))?;

    if header.contains("PC1_1")
        || header.contains("PC1_2")
        || header.contains("PC2_1")
        || header.contains("PC2_2")
    {
        let pc11 = header.get_f64("PC1_1").unwrap_or(1.0);
        let pc12 = header.get_f64("PC1_2").unwrap_or(0.0);
        let pc21 = header.get_f64("PC2_1").unwrap_or(0.0);
        let pc22 = header.get_f64("PC2_2").unwrap_or(1.0);
        return Ok(Matrix2::new(
            cdelt1 * pc11,
            cdelt1 * pc12,
            cdelt2 * pc21,
            cdelt2 * pc22,
        ));
    }

    let rot = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
    Ok(Matrix2::new(
        cdelt1 * rot.cos(),
        -cdelt2 * rot.sin(),
        cdelt1 * rot.sin(),
        cdelt2 * rot.cos(),
    ))
}

/// Decompose a CD matrix into rotation and signed per-axis scales.
///
/// Returns `(rotation_deg, cdelt1, cdelt2)` where the rotation is the sky
/// position angle of the pixel +y axis and the scale signs encode the
/// axis-flip orientation of the header.
fn decompose_cd(cd: &Matrix2<f64>) -> Result<(f64, f64, f64), WcsError> {
    let (cd11, cd12) = (cd[(0, 0)], cd[(0, 1)]);
    let (cd21, cd22) = (cd[(1, 0)], cd[(1, 1)]);

    // Exactly axis-aligned: both scale signs survive unchanged.
    if cd12 == 0.0 && cd21 == 0.0 {
        return Ok((0.0, cd11, cd22));
    }

    let det = cd11 * cd22 - cd12 * cd21;
    let sgn = if det < 0.0 { -1.0 } else { 1.0 };

    let cdelt1 = sgn * (cd11 * cd11 + cd21 * cd21).sqrt();
    let cdelt2 = (cd12 * cd12 + cd22 * cd22).sqrt();

    let xrot = (sgn * cd21).atan2(sgn * cd11).to_degrees();
    let yrot = (-cd12).atan2(cd22).to_degrees();

    if wrap_angle_deg(xrot - yrot).abs() > SKEW_TOLERANCE_DEG {
        return Err(WcsError::Skew { xrot, yrot });
    }

    Ok((yrot, cdelt1, cdelt2))
}

/// Extract rotation angle and per-axis pixel scale from header keywords.
///
/// Returns `(rotation_deg, cdelt1, cdelt2)` with scales in degrees per
/// pixel, signs preserved. Deterministic and side-effect free; fails on
/// missing keywords or on axes whose rotations disagree beyond
/// [`SKEW_TOLERANCE_DEG`].
pub fn get_rotation_and_scale(header: &Header) -> Result<(f64, f64, f64), WcsError> {
    decompose_cd(&cd_from_header(header)?)
}

impl Wcs {
    /// Build a TAN-projection WCS from a reference sky position, pixel
    /// scale magnitude, rotation angle and per-axis sign convention.
    ///
    /// `crpix1`/`crpix2` follow the FITS 1-based convention. `cdbase`
    /// holds the per-axis sign multipliers applied to `px_scale`.
    pub fn tan(
        ra_deg: f64,
        dec_deg: f64,
        crpix1: f64,
        crpix2: f64,
        px_scale: f64,
        rot_deg: f64,
        cdbase: (f64, f64),
    ) -> Self {
        let cdelt1 = cdbase.0.signum() * px_scale;
        let cdelt2 = cdbase.1.signum() * px_scale;
        let rot = rot_deg.to_radians();
        let cd = Matrix2::new(
            cdelt1 * rot.cos(),
            -cdelt2 * rot.sin(),
            cdelt1 * rot.sin(),
            cdelt2 * rot.cos(),
        );
        Self {
            crval1: ra_deg,
            crval2: dec_deg,
            crpix1,
            crpix2,
            cd,
        }
    }

    /// Parse a WCS out of header keywords.
    ///
    /// CRVAL1/2 and a scale description are required; CRPIX1/2 default to
    /// 1.0 when absent, the usual reader behavior for headers that omit
    /// the reference pixel.
    pub fn from_header(header: &Header) -> Result<Self, WcsError> {
        let crval1 = header
            .get_f64("CRVAL1")
            .ok_or(WcsError::MissingKeyword("CRVAL1"))?;
        let crval2 = header
            .get_f64("CRVAL2")
            .ok_or(WcsError::MissingKeyword("CRVAL2"))?;
        let crpix1 = header.get_f64("CRPIX1").unwrap_or(1.0);
        let crpix2 = header.get_f64("CRPIX2").unwrap_or(1.0);
        let cd = cd_from_header(header)?;
        Ok(Self {
            crval1,
            crval2,
            crpix1,
            crpix2,
            cd,
        })
    }

    /// Reference sky coordinate (CRVAL1, CRVAL2) in degrees.
    pub fn reference_sky(&self) -> (f64, f64) {
        (self.crval1, self.crval2)
    }

    /// Reference pixel (CRPIX1, CRPIX2), FITS 1-based.
    pub fn reference_pixel(&self) -> (f64, f64) {
        (self.crpix1, self.crpix2)
    }

    /// Rotation angle and signed per-axis scales of this WCS.
    pub fn rotation_and_scale(&self) -> Result<(f64, f64, f64), WcsError> {
        decompose_cd(&self.cd)
    }

    /// New WCS with the reference pixel shifted by whole-canvas padding.
    ///
    /// Used when the mosaic grid grows at the low-x/low-y edges so that
    /// the sky mapping of previously written pixels is unchanged.
    pub fn with_crpix_offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            crpix1: self.crpix1 + dx,
            crpix2: self.crpix2 + dy,
            ..*self
        }
    }

    /// Map a sky coordinate to 0-based pixel coordinates on this grid.
    pub fn sky_to_pixel(&self, ra_deg: f64, dec_deg: f64) -> Result<(f64, f64), WcsError> {
        let (xi, eta) = tan_project(ra_deg, dec_deg, self.crval1, self.crval2)?;
        let inv = self.cd.try_inverse().ok_or(WcsError::SingularMatrix)?;
        let offset = inv * Vector2::new(xi, eta);
        Ok((
            self.crpix1 - 1.0 + offset.x,
            self.crpix2 - 1.0 + offset.y,
        ))
    }

    /// Map 0-based pixel coordinates on this grid to a sky coordinate.
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let offset = self.cd * Vector2::new(x - (self.crpix1 - 1.0), y - (self.crpix2 - 1.0));
        tan_deproject(offset.x, offset.y, self.crval1, self.crval2)
    }

    /// Emit the WCS keywords for this value.
    ///
    /// The cards round-trip: feeding the result back through
    /// [`get_rotation_and_scale`] and [`Wcs::from_header`] reproduces this
    /// value to floating-point precision.
    pub fn to_header(&self) -> Header {
        let mut header = Header::new();
        header.insert("CTYPE1", "RA---TAN");
        header.insert("CTYPE2", "DEC--TAN");
        header.insert("CUNIT1", "deg");
        header.insert("CUNIT2", "deg");
        header.insert("CRVAL1", self.crval1);
        header.insert("CRVAL2", self.crval2);
        header.insert("CRPIX1", self.crpix1);
        header.insert("CRPIX2", self.crpix2);
        header.insert("CD1_1", self.cd[(0, 0)]);
        header.insert("CD1_2", self.cd[(0, 1)]);
        header.insert("CD2_1", self.cd[(1, 0)]);
        header.insert("CD2_2", self.cd[(1, 1)]);
        header
    }
}

/// Wrap an angle difference into (-180, 180] degrees.
pub(crate) fn wrap_angle_deg(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Gnomonic projection of a sky coordinate about a tangent point.
///
/// Returns standard coordinates (xi, eta) in degrees. Fails for positions
/// at or beyond 90 degrees from the tangent point, where the projection
/// diverges.
fn tan_project(
    ra_deg: f64,
    dec_deg: f64,
    ra0_deg: f64,
    dec0_deg: f64,
) -> Result<(f64, f64), WcsError> {
    let ra = ra_deg.to_radians();
    let dec = dec_deg.to_radians();
    let ra0 = ra0_deg.to_radians();
    let dec0 = dec0_deg.to_radians();

    let cos_c = dec0.sin() * dec.sin() + dec0.cos() * dec.cos() * (ra - ra0).cos();
    if cos_c <= 0.0 {
        return Err(WcsError::Unprojectable { ra_deg, dec_deg });
    }

    let xi = dec.cos() * (ra - ra0).sin() / cos_c;
    let eta = (dec0.cos() * dec.sin() - dec0.sin() * dec.cos() * (ra - ra0).cos()) / cos_c;
    Ok((xi.to_degrees(), eta.to_degrees()))
}

/// Inverse gnomonic projection: standard coordinates back to sky.
fn tan_deproject(xi_deg: f64, eta_deg: f64, ra0_deg: f64, dec0_deg: f64) -> (f64, f64) {
    let xi = xi_deg.to_radians();
    let eta = eta_deg.to_radians();
    let ra0 = ra0_deg.to_radians();
    let dec0 = dec0_deg.to_radians();

    let denom = dec0.cos() - eta * dec0.sin();
    let ra = ra0 + xi.atan2(denom);
    let dec = (dec0.sin() + eta * dec0.cos()).atan2((xi * xi + denom * denom).sqrt());

    (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tan_header(px_scale: f64, rot_deg: f64, cdbase: (f64, f64)) -> Header {
        Wcs::tan(180.0, 20.0, 51.0, 51.0, px_scale, rot_deg, cdbase).to_header()
    }

    #[test]
    fn test_extract_unrotated_cd() {
        let mut header = Header::new();
        header.insert("CD1_1", -2.5e-4);
        header.insert("CD2_2", 2.5e-4);

        let (rot, cdelt1, cdelt2) = get_rotation_and_scale(&header).unwrap();
        assert_relative_eq!(rot, 0.0);
        assert_relative_eq!(cdelt1, -2.5e-4);
        assert_relative_eq!(cdelt2, 2.5e-4);
    }

    #[test]
    fn test_extract_rotated_cd_preserves_sign() {
        let header = tan_header(1.0e-3, 30.0, (-1.0, 1.0));
        let (rot, cdelt1, cdelt2) = get_rotation_and_scale(&header).unwrap();

        assert_relative_eq!(rot, 30.0, epsilon = 1e-9);
        assert_relative_eq!(cdelt1, -1.0e-3, epsilon = 1e-12);
        assert_relative_eq!(cdelt2, 1.0e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_extract_cdelt_crota2() {
        let mut header = Header::new();
        header.insert("CDELT1", -4.0e-4);
        header.insert("CDELT2", 4.0e-4);
        header.insert("CROTA2", 45.0);

        let (rot, cdelt1, cdelt2) = get_rotation_and_scale(&header).unwrap();
        assert_relative_eq!(rot, 45.0, epsilon = 1e-9);
        assert_relative_eq!(cdelt1, -4.0e-4, epsilon = 1e-12);
        assert_relative_eq!(cdelt2, 4.0e-4, epsilon = 1e-12);
    }

    #[test]
    fn test_extract_cdelt_pc_matrix() {
        // PC matrix convention keeps the rotation separate from the scales
        let rot = 10.0f64.to_radians();
        let mut header = Header::new();
        header.insert("CDELT1", 3.0e-4);
        header.insert("CDELT2", 3.0e-4);
        header.insert("PC1_1", rot.cos());
        header.insert("PC1_2", -rot.sin());
        header.insert("PC2_1", rot.sin());
        header.insert("PC2_2", rot.cos());

        let (rot_deg, cdelt1, cdelt2) = get_rotation_and_scale(&header).unwrap();
        assert_relative_eq!(rot_deg, 10.0, epsilon = 1e-9);
        assert_relative_eq!(cdelt1, 3.0e-4, epsilon = 1e-12);
        assert_relative_eq!(cdelt2, 3.0e-4, epsilon = 1e-12);
    }

    #[test]
    fn test_extract_missing_keywords() {
        let header = Header::new();
        assert!(matches!(
            get_rotation_and_scale(&header),
            Err(WcsError::MissingKeyword("CDELT1"))
        ));
    }

    #[test]
    fn test_extract_skew_detected() {
        // x axis rotated 5 degrees, y axis unrotated
        let rot = 5.0f64.to_radians();
        let s = 1.0e-3;
        let mut header = Header::new();
        header.insert("CD1_1", s * rot.cos());
        header.insert("CD2_1", s * rot.sin());
        header.insert("CD1_2", -s * 1.0e-6);
        header.insert("CD2_2", s);

        assert!(matches!(
            get_rotation_and_scale(&header),
            Err(WcsError::Skew { .. })
        ));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let header = tan_header(2.0e-4, 72.5, (-1.0, 1.0));
        let first = get_rotation_and_scale(&header).unwrap();
        let second = get_rotation_and_scale(&header).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_header_round_trip() {
        let wcs = Wcs::tan(210.5, -15.25, 100.0, 80.0, 2.75e-4, 123.4, (-1.0, 1.0));
        let parsed = Wcs::from_header(&wcs.to_header()).unwrap();

        let (rot_a, s1_a, s2_a) = wcs.rotation_and_scale().unwrap();
        let (rot_b, s1_b, s2_b) = parsed.rotation_and_scale().unwrap();
        assert_relative_eq!(rot_a, rot_b, epsilon = 1e-9);
        assert_relative_eq!(s1_a, s1_b, epsilon = 1e-15);
        assert_relative_eq!(s2_a, s2_b, epsilon = 1e-15);
        assert_eq!(wcs.reference_pixel(), parsed.reference_pixel());
        assert_eq!(wcs.reference_sky(), parsed.reference_sky());
    }

    #[test]
    fn test_sky_pixel_round_trip() {
        let wcs = Wcs::tan(180.0, 45.0, 51.0, 51.0, 1.0e-3, 15.0, (-1.0, 1.0));

        for &(x, y) in &[(50.0, 50.0), (0.0, 0.0), (99.0, 12.0), (13.5, 77.25)] {
            let (ra, dec) = wcs.pixel_to_sky(x, y);
            let (x2, y2) = wcs.sky_to_pixel(ra, dec).unwrap();
            assert_relative_eq!(x, x2, epsilon = 1e-8);
            assert_relative_eq!(y, y2, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_reference_pixel_maps_to_reference_sky() {
        let wcs = Wcs::tan(33.0, -8.0, 11.0, 21.0, 5.0e-4, 0.0, (1.0, 1.0));
        let (ra, dec) = wcs.pixel_to_sky(10.0, 20.0);
        assert_relative_eq!(ra, 33.0, epsilon = 1e-10);
        assert_relative_eq!(dec, -8.0, epsilon = 1e-10);
    }

    #[test]
    fn test_pixel_offset_follows_scale_direction() {
        // cdelt1 < 0: RA increases toward -x, dec toward +y
        let s = 1.0e-3;
        let wcs = Wcs::tan(180.0, 0.0, 51.0, 51.0, s, 0.0, (-1.0, 1.0));

        let (x, y) = wcs.sky_to_pixel(180.0 + 10.0 * s, 0.0).unwrap();
        assert_relative_eq!(x, 40.0, epsilon = 1e-6);
        assert_relative_eq!(y, 50.0, epsilon = 1e-6);

        let (x, y) = wcs.sky_to_pixel(180.0, 10.0 * s).unwrap();
        assert_relative_eq!(x, 50.0, epsilon = 1e-6);
        assert_relative_eq!(y, 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unprojectable_position() {
        let wcs = Wcs::tan(0.0, 0.0, 1.0, 1.0, 1.0e-3, 0.0, (1.0, 1.0));
        assert!(matches!(
            wcs.sky_to_pixel(180.0, 0.0),
            Err(WcsError::Unprojectable { .. })
        ));
    }

    #[test]
    fn test_crpix_offset_preserves_sky_mapping() {
        let wcs = Wcs::tan(120.0, 35.0, 51.0, 51.0, 1.0e-3, 20.0, (-1.0, 1.0));
        let shifted = wcs.with_crpix_offset(17.0, 4.0);

        let (ra, dec) = wcs.pixel_to_sky(30.0, 60.0);
        let (ra2, dec2) = shifted.pixel_to_sky(30.0 + 17.0, 60.0 + 4.0);
        assert_relative_eq!(ra, ra2, epsilon = 1e-10);
        assert_relative_eq!(dec, dec2, epsilon = 1e-10);
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle_deg(190.0), -170.0);
        assert_relative_eq!(wrap_angle_deg(-190.0), 170.0);
        assert_relative_eq!(wrap_angle_deg(360.0), 0.0);
        assert_relative_eq!(wrap_angle_deg(180.0), 180.0);
    }
}
