//! Astronomical image: pixel grid plus resolved WCS.

use ndarray::Array2;

use crate::header::Header;
use crate::wcs::{Wcs, WcsError};

/// One astronomical image: a named 2-D pixel grid and its WCS.
///
/// Arrays use the (height, width) shape convention, indexed `[y, x]`.
/// The WCS is resolved at construction time, so any `SkyImage` handed to
/// the compositor is known to be placeable; images with missing or
/// inconsistent WCS keywords are rejected here, never mosaicked with an
/// identity transform.
#[derive(Debug, Clone)]
pub struct SkyImage {
    name: String,
    data: Array2<f64>,
    wcs: Wcs,
}

impl SkyImage {
    pub fn new(name: impl Into<String>, data: Array2<f64>, wcs: Wcs) -> Self {
        Self {
            name: name.into(),
            data,
            wcs,
        }
    }

    /// Build an image from raw pixels and header keywords, resolving the
    /// WCS eagerly.
    pub fn from_header(
        name: impl Into<String>,
        data: Array2<f64>,
        header: &Header,
    ) -> Result<Self, WcsError> {
        let wcs = Wcs::from_header(header)?;
        Ok(Self::new(name, data, wcs))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_header_requires_wcs() {
        let data = Array2::zeros((4, 4));
        let header = Header::new();
        assert!(SkyImage::from_header("empty", data, &header).is_err());
    }

    #[test]
    fn test_dimensions() {
        let wcs = Wcs::tan(10.0, 10.0, 1.0, 1.0, 1.0e-3, 0.0, (1.0, 1.0));
        let image = SkyImage::new("img", Array2::zeros((3, 7)), wcs);
        assert_eq!(image.width(), 7);
        assert_eq!(image.height(), 3);
    }
}
