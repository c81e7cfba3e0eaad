//! WCS-aligned mosaic composition of astronomical images.
//!
//! Takes a sequence of FITS images, each carrying pixel data and World
//! Coordinate System metadata, and composes them into a single image on
//! a common pixel grid. The first image fixes the canvas orientation and
//! scale; every image is then placed at its sky-aligned position, with
//! the canvas either bounded by an explicit field of view or grown on
//! demand around the pieces. Later images overwrite earlier ones where
//! footprints overlap, and a missing or malformed input after the first
//! is skipped rather than aborting the run.

pub mod canvas;
pub mod compositor;
pub mod driver;
pub mod fits;
pub mod header;
pub mod image;
pub mod resample;
pub mod wcs;

pub use canvas::{AllocationError, MosaicCanvas, Placement};
pub use compositor::{inline, inline_with_options, InlineOptions, PlacementError};
pub use driver::{compose, compose_with_options, MosaicError, MosaicItem};
pub use fits::LoadError;
pub use header::{Header, Value};
pub use image::SkyImage;
pub use resample::ResamplePolicy;
pub use wcs::{get_rotation_and_scale, Wcs, WcsError};
