//! Preview montages for `--show`.
//!
//! Every frame of the Z=0, C=0 plane is tiled left to right, top to bottom
//! into one 8-bit grayscale PNG, scaled by the global min/max of the plane.

use anyhow::{Context, Result};
use beatsort::stack::Stack;
use image::{GrayImage, Luma};
use ndarray::s;
use std::path::{Path, PathBuf};

/// Tiles per montage row for `frames` tiles (close to square).
fn grid_cols(frames: usize) -> usize {
    ((frames as f64).sqrt().ceil() as usize).max(1)
}

/// Render the first depth and channel of `stack` as a frame montage.
pub fn montage(stack: &Stack) -> GrayImage {
    let (rows, cols, _, _, frames) = stack.dim();
    let plane = stack.slice(s![.., .., 0, 0, ..]);
    let (lo, hi) = plane
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = if hi > lo { hi - lo } else { 1.0 };
    let per_row = grid_cols(frames);
    let grid_rows = frames.div_ceil(per_row).max(1);
    let mut img = GrayImage::new((per_row * cols) as u32, (grid_rows * rows) as u32);
    for t in 0..frames {
        let (oy, ox) = ((t / per_row) * rows, (t % per_row) * cols);
        for y in 0..rows {
            for x in 0..cols {
                let v = ((plane[[y, x, t]] - lo) / span * 255.0).round().clamp(0.0, 255.0);
                img.put_pixel((ox + x) as u32, (oy + y) as u32, Luma([v as u8]));
            }
        }
    }
    img
}

/// `<output-stem>_<label>.png` beside `output`.
pub fn preview_path(output: &Path, label: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preview".to_string());
    output.with_file_name(format!("{stem}_{label}.png"))
}

pub fn write_montage(stack: &Stack, output: &Path, label: &str) -> Result<PathBuf> {
    let path = preview_path(output, label);
    montage(stack)
        .save(&path)
        .with_context(|| format!("writing preview {}", path.display()))?;
    tracing::info!(path = %path.display(), label, "wrote preview");
    Ok(path)
}
