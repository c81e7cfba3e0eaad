//! Mosaic composition driver.
//!
//! Orchestrates a whole run: resolves the item list (already-loaded
//! images or paths to load), allocates the canvas from the first item's
//! WCS, and inlines every item in order. Per-item failures after the
//! first are logged and skipped, so one bad file never costs the whole
//! mosaic; the first item is the base the canvas is built from and its
//! failure is fatal.
//!
//! Logging happens here and only here. The extractor, allocator and
//! compositor stay pure and report structured errors; this module turns
//! those into warn/info messages with the offending item's identifier so
//! a partial mosaic is never silent.

use std::path::PathBuf;

use log::{info, warn};
use thiserror::Error;

use crate::canvas::{AllocationError, MosaicCanvas};
use crate::compositor::{inline_with_options, InlineOptions};
use crate::fits::{self, LoadError};
use crate::image::SkyImage;
use crate::wcs::WcsError;

/// One entry of the composition list: an image already in memory, or a
/// path to load on demand.
#[derive(Debug)]
pub enum MosaicItem {
    Loaded(SkyImage),
    Path(PathBuf),
}

impl MosaicItem {
    /// Identifier used in log messages.
    fn label(&self, index: usize) -> String {
        match self {
            MosaicItem::Loaded(image) if image.name().is_empty() => format!("image{}", index),
            MosaicItem::Loaded(image) => image.name().to_string(),
            MosaicItem::Path(path) => path.display().to_string(),
        }
    }

    /// Produce the image, loading from disk when necessary.
    fn resolve(self) -> Result<SkyImage, LoadError> {
        match self {
            MosaicItem::Loaded(image) => Ok(image),
            MosaicItem::Path(path) => {
                info!("reading file '{}'", path.display());
                fits::load(&path)
            }
        }
    }
}

impl From<SkyImage> for MosaicItem {
    fn from(image: SkyImage) -> Self {
        MosaicItem::Loaded(image)
    }
}

impl From<PathBuf> for MosaicItem {
    fn from(path: PathBuf) -> Self {
        MosaicItem::Path(path)
    }
}

impl From<&str> for MosaicItem {
    fn from(path: &str) -> Self {
        MosaicItem::Path(PathBuf::from(path))
    }
}

/// Fatal errors of a mosaic run.
#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("item list is empty; nothing to mosaic")]
    EmptyItemList,

    #[error("failed to load reference image '{name}': {source}")]
    ReferenceLoad {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error("cannot resolve WCS of reference image '{name}': {source}")]
    ReferenceWcs {
        name: String,
        #[source]
        source: WcsError,
    },

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Compose a mosaic from an ordered item list.
///
/// With `fov_deg` the canvas is a fixed grid of that angular span and
/// pieces falling outside it are skipped; without it the canvas starts
/// minimal and grows to fit every piece. Load or placement failures on
/// items after the first are logged and skipped. The completed canvas is
/// returned as long as the first item resolves.
pub fn compose(
    items: Vec<MosaicItem>,
    fov_deg: Option<f64>,
) -> Result<MosaicCanvas, MosaicError> {
    compose_with_options(items, fov_deg, InlineOptions::default())
}

/// [`compose`] with explicit placement options.
///
/// `options.allow_expand` is overridden to match the field-of-view mode:
/// expansion is enabled exactly when `fov_deg` is `None`.
pub fn compose_with_options(
    items: Vec<MosaicItem>,
    fov_deg: Option<f64>,
    mut options: InlineOptions,
) -> Result<MosaicCanvas, MosaicError> {
    options.allow_expand = fov_deg.is_none();

    let mut items = items.into_iter().enumerate();

    // The first item is the base: its WCS shapes the whole canvas.
    let Some((_, first)) = items.next() else {
        return Err(MosaicError::EmptyItemList);
    };
    let name0 = first.label(0);
    let image0 = first.resolve().map_err(|source| MosaicError::ReferenceLoad {
        name: name0.clone(),
        source,
    })?;

    let (rot_deg, cdelt1, cdelt2) = image0
        .wcs()
        .rotation_and_scale()
        .map_err(|source| MosaicError::ReferenceWcs {
            name: name0.clone(),
            source,
        })?;
    let (ra_deg, dec_deg) = image0.wcs().reference_sky();
    let px_scale = cdelt1.abs();
    let cdbase = (cdelt1.signum(), cdelt2.signum());

    let mut canvas = MosaicCanvas::allocate(ra_deg, dec_deg, fov_deg, px_scale, rot_deg, cdbase)?;
    info!(
        "allocated {}x{} canvas at ra={:.6} dec={:.6} rot={:.3} scale={:.3e} deg/px",
        canvas.width(),
        canvas.height(),
        ra_deg,
        dec_deg,
        rot_deg,
        px_scale
    );

    let mut placed = 0usize;
    // `skipped` is shared between the `inline_one` closure and the resolve-error
    // arm below; a Cell lets both increment it without a borrow conflict.
    let skipped = std::cell::Cell::new(0usize);

    let mut inline_one = |canvas: &mut MosaicCanvas, image: SkyImage, name: &str| {
        match inline_with_options(canvas, std::slice::from_ref(&image), &options) {
            Ok(records) => {
                let record = &records[0];
                info!(
                    "placed '{}' at ({}, {}){}",
                    name,
                    record.x,
                    record.y,
                    if record.expanded {
                        " after expanding the canvas"
                    } else {
                        ""
                    }
                );
                placed += 1;
            }
            Err(err) => {
                warn!("skipping '{}': {}", name, err);
                skipped.set(skipped.get() + 1);
            }
        }
    };

    inline_one(&mut canvas, image0, &name0);

    for (index, item) in items {
        let name = item.label(index);
        match item.resolve() {
            Ok(image) => inline_one(&mut canvas, image, &name),
            Err(err) => {
                warn!("skipping '{}': {}", name, err);
                skipped.set(skipped.get() + 1);
            }
        }
    }

    info!(
        "mosaic complete: {} placed, {} skipped, final canvas {}x{}",
        placed,
        skipped.get(),
        canvas.width(),
        canvas.height()
    );

    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wcs::Wcs;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    const SCALE: f64 = 1.0e-3;

    fn test_image(name: &str, ra: f64, dec: f64, value: f64) -> SkyImage {
        let wcs = Wcs::tan(ra, dec, 6.0, 6.0, SCALE, 0.0, (-1.0, 1.0));
        SkyImage::new(name, Array2::from_elem((10, 10), value), wcs)
    }

    #[test]
    fn test_empty_item_list() {
        assert!(matches!(
            compose(Vec::new(), None),
            Err(MosaicError::EmptyItemList)
        ));
    }

    #[test]
    fn test_single_image_mosaic() {
        let image = test_image("only", 180.0, 0.0, 4.0);
        let canvas = compose(vec![image.into()], Some(0.05)).unwrap();

        assert_eq!(canvas.placements().len(), 1);
        assert_eq!(canvas.placements()[0].name, "only");
        let covered = canvas.data().iter().filter(|&&v| v == 4.0).count();
        assert_eq!(covered, 100);
    }

    #[test]
    fn test_reference_load_failure_is_fatal() {
        let items = vec![MosaicItem::from("/nonexistent/path/ref.fits")];
        assert!(matches!(
            compose(items, None),
            Err(MosaicError::ReferenceLoad { .. })
        ));
    }

    #[test]
    fn test_later_load_failure_is_skipped() {
        let items = vec![
            test_image("base", 180.0, 0.0, 1.0).into(),
            MosaicItem::from("/nonexistent/path/missing.fits"),
            test_image("tail", 180.0 + 12.0 * SCALE, 0.0, 2.0).into(),
        ];
        let canvas = compose(items, None).unwrap();

        // Items 1 and 3 made it in; item 2 is absent
        assert_eq!(canvas.placements().len(), 2);
        assert_eq!(canvas.placements()[0].name, "base");
        assert_eq!(canvas.placements()[1].name, "tail");
        assert!(canvas.data().iter().any(|&v| v == 1.0));
        assert!(canvas.data().iter().any(|&v| v == 2.0));
    }

    #[test]
    fn test_fixed_fov_skips_out_of_bounds_items() {
        let items = vec![
            test_image("base", 180.0, 0.0, 1.0).into(),
            test_image("far", 180.0 + 1.0, 0.0, 2.0).into(),
        ];
        let canvas = compose(items, Some(0.02)).unwrap();

        assert_eq!(canvas.width(), 20);
        assert_eq!(canvas.placements().len(), 1);
        assert!(!canvas.data().iter().any(|&v| v == 2.0));
    }

    #[test]
    fn test_unbounded_mosaic_grows_around_items() {
        let items = vec![
            test_image("a", 180.0, 0.0, 1.0).into(),
            test_image("b", 180.0 - 10.0 * SCALE, 0.0, 2.0).into(),
            test_image("c", 180.0 - 20.0 * SCALE, 0.0, 3.0).into(),
        ];
        let canvas = compose(items, None).unwrap();

        assert!(canvas.width() >= 30);
        for value in [1.0, 2.0, 3.0] {
            let covered = canvas.data().iter().filter(|&&v| v == value).count();
            assert_eq!(covered, 100, "value {} lost coverage", value);
        }
    }

    #[test]
    fn test_canvas_matches_reference_orientation() {
        let image = test_image("ref", 200.0, -45.0, 1.0);
        let canvas = compose(vec![image.into()], Some(0.1)).unwrap();

        let (rot, cdelt1, cdelt2) = canvas.wcs().rotation_and_scale().unwrap();
        assert_relative_eq!(rot, 0.0, epsilon = 1e-9);
        assert_relative_eq!(cdelt1, -SCALE, epsilon = 1e-15);
        assert_relative_eq!(cdelt2, SCALE, epsilon = 1e-15);
    }
}
