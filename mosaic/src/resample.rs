//! Pixel-grid resampling: scale, rotate and flip.
//!
//! All operations resample by inverse mapping so every output pixel is
//! computed exactly once, which keeps results deterministic for a given
//! [`ResamplePolicy`]. Samples falling outside the source grid take the
//! caller-supplied fill value.

use ndarray::{Array2, Axis};

/// Interpolation used when a source grid must be resampled onto the
/// canvas pixel spacing or orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplePolicy {
    /// Nearest-neighbour lookup. Exact for axis-aligned integer moves.
    #[default]
    Nearest,
    /// Bilinear interpolation of the four surrounding source pixels.
    Bilinear,
}

/// Mirror an image about its vertical and/or horizontal axis.
pub fn flip(data: &Array2<f64>, flip_x: bool, flip_y: bool) -> Array2<f64> {
    let mut view = data.view();
    if flip_x {
        view.invert_axis(Axis(1));
    }
    if flip_y {
        view.invert_axis(Axis(0));
    }
    view.to_owned()
}

/// Resample an image by independent x/y scale factors.
///
/// Output dimensions are the rounded scaled dimensions, never less than
/// one pixel per axis.
pub fn scale(data: &Array2<f64>, sx: f64, sy: f64, policy: ResamplePolicy) -> Array2<f64> {
    let (ht, wd) = data.dim();
    let new_wd = ((wd as f64 * sx).round() as usize).max(1);
    let new_ht = ((ht as f64 * sy).round() as usize).max(1);

    // Effective factors after rounding the output dimensions
    let ax = new_wd as f64 / wd as f64;
    let ay = new_ht as f64 / ht as f64;

    let mut out = Array2::zeros((new_ht, new_wd));
    for yo in 0..new_ht {
        for xo in 0..new_wd {
            let src_x = (xo as f64 + 0.5) / ax - 0.5;
            let src_y = (yo as f64 + 0.5) / ay - 0.5;
            out[[yo, xo]] = sample(data, src_x, src_y, policy).unwrap_or(0.0);
        }
    }
    out
}

/// Rotate an image counter-clockwise about its centre.
///
/// The output grid is the bounding box of the rotated source rectangle;
/// pixels with no source coverage take `fill`.
pub fn rotate(data: &Array2<f64>, angle_deg: f64, policy: ResamplePolicy, fill: f64) -> Array2<f64> {
    let (ht, wd) = data.dim();
    let angle = angle_deg.to_radians();
    let (sin_a, cos_a) = angle.sin_cos();

    let new_wd = rotated_extent(wd as f64 * cos_a.abs() + ht as f64 * sin_a.abs());
    let new_ht = rotated_extent(wd as f64 * sin_a.abs() + ht as f64 * cos_a.abs());

    let src_cx = (wd as f64 - 1.0) / 2.0;
    let src_cy = (ht as f64 - 1.0) / 2.0;
    let dst_cx = (new_wd as f64 - 1.0) / 2.0;
    let dst_cy = (new_ht as f64 - 1.0) / 2.0;

    let mut out = Array2::from_elem((new_ht, new_wd), fill);
    for yo in 0..new_ht {
        for xo in 0..new_wd {
            let dx = xo as f64 - dst_cx;
            let dy = yo as f64 - dst_cy;
            // Inverse rotation back into the source frame
            let src_x = cos_a * dx + sin_a * dy + src_cx;
            let src_y = -sin_a * dx + cos_a * dy + src_cy;
            if let Some(v) = sample(data, src_x, src_y, policy) {
                out[[yo, xo]] = v;
            }
        }
    }
    out
}

/// Bounding-box extent of a rotated axis, tolerant of the floating-point
/// dust that trig at exact right angles leaves behind.
fn rotated_extent(v: f64) -> usize {
    ((v - 1.0e-9).ceil().max(1.0)) as usize
}

/// Sample the source grid at fractional coordinates.
///
/// Returns `None` when the position lies outside the grid entirely.
fn sample(data: &Array2<f64>, x: f64, y: f64, policy: ResamplePolicy) -> Option<f64> {
    let (ht, wd) = data.dim();
    match policy {
        ResamplePolicy::Nearest => {
            let xi = x.round();
            let yi = y.round();
            if xi < 0.0 || yi < 0.0 || xi >= wd as f64 || yi >= ht as f64 {
                return None;
            }
            Some(data[[yi as usize, xi as usize]])
        }
        ResamplePolicy::Bilinear => {
            if x < -0.5 || y < -0.5 || x > wd as f64 - 0.5 || y > ht as f64 - 0.5 {
                return None;
            }
            let x0 = x.floor();
            let y0 = y.floor();
            let fx = x - x0;
            let fy = y - y0;

            let clamp_x = |v: f64| (v.max(0.0) as usize).min(wd - 1);
            let clamp_y = |v: f64| (v.max(0.0) as usize).min(ht - 1);
            let (x0i, x1i) = (clamp_x(x0), clamp_x(x0 + 1.0));
            let (y0i, y1i) = (clamp_y(y0), clamp_y(y0 + 1.0));

            let top = data[[y0i, x0i]] * (1.0 - fx) + data[[y0i, x1i]] * fx;
            let bottom = data[[y1i, x0i]] * (1.0 - fx) + data[[y1i, x1i]] * fx;
            Some(top * (1.0 - fy) + bottom * fy)
        }
    }
}
