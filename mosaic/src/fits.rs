//! FITS file loading and writing.
//!
//! The boundary with on-disk data: pixel grids travel as 64-bit floats
//! and WCS keywords are probed into a [`Header`] so the rest of the crate
//! never touches a file handle. Written headers round-trip through
//! [`crate::wcs::get_rotation_and_scale`].

use std::path::Path;

use fitsio::errors::Error as FitsError;
use fitsio::hdu::HduInfo;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::{ArrayD, Axis, Ix2};
use thiserror::Error;

use crate::header::{Header, Value};
use crate::image::SkyImage;
use crate::wcs::WcsError;

/// Keywords probed out of a primary header on load. Off-diagonal matrix
/// terms are optional; absence means zero.
const WCS_KEYWORDS: &[&str] = &[
    "CRVAL1", "CRVAL2", "CRPIX1", "CRPIX2", "CD1_1", "CD1_2", "CD2_1", "CD2_2", "CDELT1",
    "CDELT2", "CROTA2", "PC1_1", "PC1_2", "PC2_1", "PC2_2", "EQUINOX",
];

/// Errors raised while loading an image from disk.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("FITS I/O error: {0}")]
    Fits(#[from] FitsError),

    #[error("unsupported image layout {0:?}; expected a 2-D primary HDU")]
    UnsupportedLayout(Vec<usize>),

    #[error("WCS resolution failed: {0}")]
    Wcs(#[from] WcsError),
}

/// Load the primary HDU of a FITS file as a [`SkyImage`].
///
/// Data cubes whose leading axes are singletons are squeezed down to two
/// dimensions; anything else is rejected. The WCS is resolved here, so a
/// successful load always yields a placeable image.
pub fn load(path: &Path) -> Result<SkyImage, LoadError> {
    let mut file = FitsFile::open(path)?;
    let hdu = file.primary_hdu()?;

    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => return Err(LoadError::UnsupportedLayout(Vec::new())),
    };

    let mut data: ArrayD<f64> = hdu.read_image(&mut file)?;
    while data.ndim() > 2 && data.shape()[0] == 1 {
        data = data.index_axis_move(Axis(0), 0);
    }
    let data = data
        .into_dimensionality::<Ix2>()
        .map_err(|_| LoadError::UnsupportedLayout(shape))?;

    let mut header = Header::new();
    for &keyword in WCS_KEYWORDS {
        if let Ok(value) = hdu.read_key::<f64>(&mut file, keyword) {
            header.insert(keyword, value);
        }
    }

    let name = path.display().to_string();
    Ok(SkyImage::from_header(name, data, &header)?)
}

/// Write an image to disk as a 64-bit float primary HDU.
///
/// An existing file at `path` is overwritten. The image's WCS keywords
/// are emitted alongside `OBJECT` and `EQUINOX` cards.
pub fn save(image: &SkyImage, path: &Path) -> Result<(), FitsError> {
    let (ht, wd) = image.data().dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[ht, wd],
    };

    let mut file = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = file.primary_hdu()?;

    for (keyword, value) in image.wcs().to_header().iter() {
        match value {
            Value::Real(v) => hdu.write_key(&mut file, keyword, *v)?,
            Value::Integer(v) => hdu.write_key(&mut file, keyword, *v)?,
            Value::Text(v) => hdu.write_key(&mut file, keyword, v.clone())?,
            Value::Logical(_) => {}
        }
    }
    hdu.write_key(&mut file, "OBJECT", image.name().to_string())?;
    hdu.write_key(&mut file, "EQUINOX", 2000.0)?;

    let pixels: Vec<f64> = image.data().iter().copied().collect();
    hdu.write_image(&mut file, &pixels)?;

    Ok(())
}
