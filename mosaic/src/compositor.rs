//! Inlining of images onto the mosaic canvas.
//!
//! Each piece is placed independently from its own WCS: the sky position
//! of its centre pixel is located on the canvas grid, the piece is
//! resampled to the canvas pixel spacing and orientation if they differ,
//! and its pixels are copied over the destination region. Later pieces
//! overwrite earlier ones where they overlap; there is no averaging or
//! feathering, so the processing order decides the outcome.

use ndarray::{s, Array2};
use thiserror::Error;

use crate::canvas::{MosaicCanvas, Placement, BACKGROUND_FILL, EXPAND_PAD_DEG};
use crate::image::SkyImage;
use crate::resample::{self, ResamplePolicy};
use crate::wcs::{wrap_angle_deg, WcsError};

/// Rotation differences below this threshold are treated as aligned, in
/// degrees.
const ROTATION_MATCH_DEG: f64 = 1.0e-6;

/// Placement tuning for [`inline_with_options`].
#[derive(Debug, Clone)]
pub struct InlineOptions {
    /// Grow the canvas to fit pieces that fall outside its bounds.
    pub allow_expand: bool,
    /// Interpolation used when a piece must be rescaled or rotated.
    pub resample: ResamplePolicy,
    /// Extra margin, in degrees, added to each canvas edge crossed during
    /// an expansion.
    pub expand_pad_deg: f64,
    /// Cap on canvas area growth per expansion, in percent; `None`
    /// disables the check.
    pub max_expand_pct: Option<f64>,
    /// Trim this many edge pixels from each side of every piece before
    /// placement.
    pub trim_px: Option<usize>,
    /// Shift each piece so its median matches this background level.
    pub bg_ref: Option<f64>,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            allow_expand: true,
            resample: ResamplePolicy::default(),
            expand_pad_deg: EXPAND_PAD_DEG,
            max_expand_pct: None,
            trim_px: None,
            bg_ref: None,
        }
    }
}

/// Errors raised while placing a single image on the canvas.
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error(transparent)]
    Wcs(#[from] WcsError),

    #[error(
        "'{name}' spans canvas pixels x [{xlo}, {xhi}) y [{ylo}, {yhi}) outside the \
         {width}x{height} canvas and expansion is disabled"
    )]
    OutOfBounds {
        name: String,
        xlo: i64,
        xhi: i64,
        ylo: i64,
        yhi: i64,
        width: usize,
        height: usize,
    },

    #[error(
        "expanding to {new_width}x{new_height} would grow the canvas area by {pct:.1}%, \
         over the {limit:.1}% cap"
    )]
    ExpansionCapExceeded {
        new_width: usize,
        new_height: usize,
        pct: f64,
        limit: f64,
    },

    #[error("image '{0}' has a zero-length axis")]
    EmptyImage(String),

    #[error("trim of {trim_px} px per side consumes the whole {width}x{height} image '{name}'")]
    TrimExceedsImage {
        name: String,
        trim_px: usize,
        width: usize,
        height: usize,
    },
}

/// Place images onto the canvas in order, with default placement options.
///
/// Later images overwrite earlier pixel values where footprints overlap.
/// Returns one [`Placement`] per image; the same records are appended to
/// the canvas log. Processing stops at the first failing image, leaving
/// the canvas exactly as the preceding images left it.
pub fn inline(
    canvas: &mut MosaicCanvas,
    images: &[SkyImage],
    allow_expand: bool,
) -> Result<Vec<Placement>, PlacementError> {
    inline_with_options(
        canvas,
        images,
        &InlineOptions {
            allow_expand,
            ..InlineOptions::default()
        },
    )
}

/// Place images onto the canvas in order. See [`inline`].
pub fn inline_with_options(
    canvas: &mut MosaicCanvas,
    images: &[SkyImage],
    options: &InlineOptions,
) -> Result<Vec<Placement>, PlacementError> {
    let mut records = Vec::with_capacity(images.len());
    for image in images {
        let record = place_one(canvas, image, options)?;
        canvas.record(record.clone());
        records.push(record);
    }
    Ok(records)
}

/// Place one image; the canvas is untouched unless the placement
/// succeeds, apart from a completed expansion.
fn place_one(
    canvas: &mut MosaicCanvas,
    image: &SkyImage,
    options: &InlineOptions,
) -> Result<Placement, PlacementError> {
    let name = image.name().to_string();
    let (ht, wd) = image.data().dim();
    if ht == 0 || wd == 0 {
        return Err(PlacementError::EmptyImage(name));
    }

    let (rot_ref, cdelt1_ref, cdelt2_ref) = canvas.wcs().rotation_and_scale()?;
    let scale_x = cdelt1_ref.abs();
    let scale_y = cdelt2_ref.abs();

    // Sky position of the piece centre, from the piece's own WCS
    let (ctr_x, ctr_y) = (wd / 2, ht / 2);
    let (ra, dec) = image.wcs().pixel_to_sky(ctr_x as f64, ctr_y as f64);

    let mut data = image.data().to_owned();

    if let Some(trim) = options.trim_px.filter(|&t| t > 0) {
        if 2 * trim >= wd || 2 * trim >= ht {
            return Err(PlacementError::TrimExceedsImage {
                name,
                trim_px: trim,
                width: wd,
                height: ht,
            });
        }
        data = data.slice(s![trim..ht - trim, trim..wd - trim]).to_owned();
    }

    if let Some(bg) = options.bg_ref {
        let offset = bg - median(&data);
        data.mapv_inplace(|v| v + offset);
    }

    let (rot, cdelt1, cdelt2) = image.wcs().rotation_and_scale()?;

    // Rescale to the canvas pixel spacing
    if !scales_match(cdelt1.abs(), scale_x) || !scales_match(cdelt2.abs(), scale_y) {
        data = resample::scale(
            &data,
            cdelt1.abs() / scale_x,
            cdelt2.abs() / scale_y,
            options.resample,
        );
    }

    // Rotate into the canvas orientation; an exact half-turn is cheaper
    // as a double flip
    let mut rot_d = wrap_angle_deg(rot - rot_ref);
    let mut flip_x = false;
    let mut flip_y = false;
    if (rot_d.abs() - 180.0).abs() < ROTATION_MATCH_DEG {
        flip_x = true;
        flip_y = true;
        rot_d = 0.0;
    }
    if rot_d.abs() > ROTATION_MATCH_DEG {
        data = resample::rotate(&data, rot_d, options.resample, BACKGROUND_FILL);
    }

    // Mismatched axis-sign conventions mirror the piece
    flip_x ^= (cdelt1 < 0.0) != (cdelt1_ref < 0.0);
    flip_y ^= (cdelt2 < 0.0) != (cdelt2_ref < 0.0);
    if flip_x || flip_y {
        data = resample::flip(&data, flip_x, flip_y);
    }

    let (ht, wd) = data.dim();
    let (ctr_x, ctr_y) = (wd / 2, ht / 2);

    // Locate the piece centre on the canvas grid, to the nearest pixel
    let (x0f, y0f) = canvas.wcs().sky_to_pixel(ra, dec)?;
    let x0 = x0f.round() as i64;
    let y0 = y0f.round() as i64;

    let mut xlo = x0 - ctr_x as i64;
    let mut xhi = xlo + wd as i64;
    let mut ylo = y0 - ctr_y as i64;
    let mut yhi = ylo + ht as i64;

    let canvas_wd = canvas.width() as i64;
    let canvas_ht = canvas.height() as i64;
    let mut expanded = false;

    if xlo < 0 || ylo < 0 || xhi > canvas_wd || yhi > canvas_ht {
        if !options.allow_expand {
            return Err(PlacementError::OutOfBounds {
                name,
                xlo,
                xhi,
                ylo,
                yhi,
                width: canvas_wd as usize,
                height: canvas_ht as usize,
            });
        }

        let pad_x = (options.expand_pad_deg / scale_x).max(0.0) as i64;
        let pad_y = (options.expand_pad_deg / scale_y).max(0.0) as i64;

        let left = if xlo < 0 { -xlo + pad_x } else { 0 };
        let right = if xhi > canvas_wd {
            xhi - canvas_wd + pad_x
        } else {
            0
        };
        let bottom = if ylo < 0 { -ylo + pad_y } else { 0 };
        let top = if yhi > canvas_ht {
            yhi - canvas_ht + pad_y
        } else {
            0
        };

        let new_wd = (canvas_wd + left + right) as usize;
        let new_ht = (canvas_ht + bottom + top) as usize;

        if let Some(limit) = options.max_expand_pct {
            let old_area = (canvas_wd * canvas_ht) as f64;
            let pct = ((new_wd * new_ht) as f64 / old_area - 1.0) * 100.0;
            if pct > limit {
                return Err(PlacementError::ExpansionCapExceeded {
                    new_width: new_wd,
                    new_height: new_ht,
                    pct,
                    limit,
                });
            }
        }

        canvas.grow(left as usize, bottom as usize, new_wd, new_ht);
        xlo += left;
        xhi += left;
        ylo += bottom;
        yhi += bottom;
        expanded = true;
    }

    canvas
        .data_mut()
        .slice_mut(s![ylo as usize..yhi as usize, xlo as usize..xhi as usize])
        .assign(&data);

    Ok(Placement {
        name,
        x: xlo + ctr_x as i64,
        y: ylo + ctr_y as i64,
        expanded,
    })
}

/// Relative comparison of scale magnitudes, tolerant of keyword
/// round-off.
fn scales_match(a: f64, b: f64) -> bool {
    float_cmp::approx_eq!(f64, a, b, epsilon = 1.0e-8 * a.abs().max(b.abs()), ulps = 4)
}

/// Median pixel value, ignoring non-finite pixels.
fn median(data: &Array2<f64>) -> f64 {
    let mut values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
