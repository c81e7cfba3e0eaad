//! Compose FITS images into a single WCS-aligned mosaic.
//!
//! Inputs are processed in order; at overlapping sky positions later
//! files overwrite earlier ones. Without `--fov` the output canvas grows
//! to fit every input. A file that fails to load or place is skipped
//! with a warning, except the first input, whose failure is fatal.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use mosaic::{compose_with_options, fits, InlineOptions, MosaicItem, ResamplePolicy};

#[derive(Parser, Debug)]
#[command(
    name = "mosaic",
    about = "Compose FITS images into a WCS-aligned mosaic"
)]
struct Args {
    /// Write mosaic output to FILE (overwritten if present)
    #[arg(short, long, value_name = "FILE")]
    outfile: PathBuf,

    /// Output field of view in degrees; the canvas grows to fit the
    /// inputs when omitted
    #[arg(long, value_name = "DEG")]
    fov: Option<f64>,

    /// Trim N edge pixels from each side of every input
    #[arg(long, value_name = "N")]
    trim_px: Option<usize>,

    /// Use bilinear resampling instead of nearest neighbour
    #[arg(long)]
    bilinear: bool,

    /// Input FITS files, processed in order
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let items: Vec<MosaicItem> = args.inputs.into_iter().map(MosaicItem::Path).collect();
    let options = InlineOptions {
        resample: if args.bilinear {
            ResamplePolicy::Bilinear
        } else {
            ResamplePolicy::Nearest
        },
        trim_px: args.trim_px,
        ..InlineOptions::default()
    };

    let canvas =
        compose_with_options(items, args.fov, options).context("mosaic composition failed")?;

    info!("writing output to '{}'", args.outfile.display());
    fits::save(&canvas.into_image(), &args.outfile)
        .with_context(|| format!("failed to write '{}'", args.outfile.display()))?;

    Ok(())
}
