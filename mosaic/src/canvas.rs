//! Mosaic canvas: the accumulating output image.
//!
//! A canvas is allocated once from the reference image's sky position and
//! pixel scale, then mutated in place by the compositor as pieces are
//! inlined. Growth is copy-and-grow: the pixel buffer is reallocated with
//! padding and a new WCS value is constructed with the reference pixel
//! shifted, so previously written pixels keep their sky mapping.

use ndarray::{s, Array2};
use thiserror::Error;

use crate::header::Header;
use crate::image::SkyImage;
use crate::wcs::Wcs;

/// Value used for canvas pixels no input image has covered.
pub const BACKGROUND_FILL: f64 = 0.0;

/// Default extra margin, in degrees, added to each canvas edge crossed
/// during an expansion.
pub const EXPAND_PAD_DEG: f64 = 0.01;

/// Grid side used when no field of view is given and the canvas relies
/// entirely on expansion to reach its final size.
const UNBOUNDED_SEED_SIDE: usize = 16;

/// Record of one successfully inlined image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Identifier of the source image
    pub name: String,
    /// Canvas x coordinate of the placed image centre, after any expansion
    pub x: i64,
    /// Canvas y coordinate of the placed image centre, after any expansion
    pub y: i64,
    /// Whether the canvas had to grow to fit this image
    pub expanded: bool,
}

/// Errors raised while allocating the output canvas.
#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("field of view must be positive and finite, got {0} deg")]
    InvalidFov(f64),

    #[error("pixel scale must be positive and finite, got {0} deg/px")]
    InvalidPixelScale(f64),

    #[error("field of view {fov_deg} deg at {px_scale} deg/px yields a sub-pixel grid")]
    DegenerateGrid { fov_deg: f64, px_scale: f64 },
}

/// The accumulating mosaic output: pixel grid, WCS and placement log.
#[derive(Debug, Clone)]
pub struct MosaicCanvas {
    data: Array2<f64>,
    wcs: Wcs,
    placements: Vec<Placement>,
}

impl MosaicCanvas {
    /// Allocate a blank canvas centred on a reference sky position.
    ///
    /// With a field of view the grid spans `round(fov_deg / px_scale)`
    /// pixels per side, rounded up to an even count, and the reference
    /// coordinate maps to the grid centre. Without one, a small seed grid
    /// is allocated and the compositor's expansion is expected to grow it
    /// around the pieces as they arrive.
    ///
    /// `rot_deg` and the `cdbase` axis signs are baked into the canvas
    /// WCS, so extracting rotation and scale from [`Self::header`]
    /// reproduces the values given here.
    pub fn allocate(
        ra_deg: f64,
        dec_deg: f64,
        fov_deg: Option<f64>,
        px_scale: f64,
        rot_deg: f64,
        cdbase: (f64, f64),
    ) -> Result<Self, AllocationError> {
        if !px_scale.is_finite() || px_scale <= 0.0 {
            return Err(AllocationError::InvalidPixelScale(px_scale));
        }

        let side = match fov_deg {
            None => UNBOUNDED_SEED_SIDE,
            Some(fov) => {
                if !fov.is_finite() || fov <= 0.0 {
                    return Err(AllocationError::InvalidFov(fov));
                }
                let side = (fov / px_scale).round() as usize;
                if side == 0 {
                    return Err(AllocationError::DegenerateGrid {
                        fov_deg: fov,
                        px_scale,
                    });
                }
                side + side % 2
            }
        };

        // FITS 1-based reference pixel at the grid centre
        let crpix = (side / 2) as f64 + 1.0;
        let wcs = Wcs::tan(ra_deg, dec_deg, crpix, crpix, px_scale, rot_deg, cdbase);

        Ok(Self {
            data: Array2::from_elem((side, side), BACKGROUND_FILL),
            wcs,
            placements: Vec::new(),
        })
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    /// All placements recorded so far, in processing order.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Header keywords describing this canvas.
    pub fn header(&self) -> Header {
        let mut header = self.wcs.to_header();
        header.insert("NAXIS1", self.width() as i64);
        header.insert("NAXIS2", self.height() as i64);
        header.insert("OBJECT", "MOSAIC");
        header.insert("EQUINOX", 2000.0);
        header
    }

    /// Convert into a plain image for serialization.
    pub fn into_image(self) -> SkyImage {
        SkyImage::new("MOSAIC", self.data, self.wcs)
    }

    /// Grow the pixel grid to `(new_ht, new_wd)`, shifting existing
    /// content right/up by `(pad_left, pad_bottom)` pixels.
    ///
    /// The WCS reference pixel moves by the same amount, so every
    /// previously written pixel keeps its sky coordinate.
    pub(crate) fn grow(&mut self, pad_left: usize, pad_bottom: usize, new_wd: usize, new_ht: usize) {
        let (ht, wd) = self.data.dim();
        let mut new_data = Array2::from_elem((new_ht, new_wd), BACKGROUND_FILL);
        new_data
            .slice_mut(s![pad_bottom..pad_bottom + ht, pad_left..pad_left + wd])
            .assign(&self.data);
        self.data = new_data;
        self.wcs = self.wcs.with_crpix_offset(pad_left as f64, pad_bottom as f64);
    }

    pub(crate) fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub(crate) fn record(&mut self, placement: Placement) {
        self.placements.push(placement);
    }
}
