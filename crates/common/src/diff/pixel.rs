//! Pixel-level comparison of rendered pages

use std::path::{Path, PathBuf};

use image::{GenericImageView, Pixel, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

/// Per-channel difference tolerated before a pixel counts as changed
const CHANNEL_TOLERANCE: i32 = 5;

const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Outcome of comparing two raster images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelDiffSummary {
    /// Number of differing pixels
    pub diff_pixels: u64,

    /// Pixels in the compared canvas
    pub total_pixels: u64,

    /// Percentage of pixels that differ
    pub diff_percent: f64,

    /// Both inputs hashed to the same digest
    pub identical: bool,

    /// The materialized difference image
    pub artifact: PathBuf,
}

/// Pluggable image comparison capability
pub trait ImageDiffer: Send + Sync {
    /// Compare `before` and `after`, writing a highlight image to `output`
    fn diff_images(&self, before: &Path, after: &Path, output: &Path) -> Result<PixelDiffSummary>;
}

/// Default pixel-by-pixel differ.
///
/// Differing pixels are painted opaque red, matching pixels are kept but dimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelDiffer;

impl PixelDiffer {
    fn pixels_differ(a: &Rgba<u8>, b: &Rgba<u8>) -> bool {
        a.channels()
            .iter()
            .zip(b.channels())
            .any(|(x, y)| (*x as i32 - *y as i32).abs() > CHANNEL_TOLERANCE)
    }

    fn dimmed(pixel: &Rgba<u8>) -> Rgba<u8> {
        let c = pixel.channels();
        Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128])
    }
}

impl ImageDiffer for PixelDiffer {
    fn diff_images(&self, before: &Path, after: &Path, output: &Path) -> Result<PixelDiffSummary> {
        let before_hash = hash_file(before)?;
        let after_hash = hash_file(after)?;

        let before_img = image::open(before)?;

        if before_hash == after_hash {
            let mut dimmed = before_img.to_rgba8();
            for pixel in dimmed.pixels_mut() {
                *pixel = Self::dimmed(pixel);
            }
            dimmed.save(output)?;
            debug!("Pixel diff {} -> {}: identical", before.display(), after.display());
            return Ok(PixelDiffSummary {
                diff_pixels: 0,
                total_pixels: (dimmed.width() as u64) * (dimmed.height() as u64),
                diff_percent: 0.0,
                identical: true,
                artifact: output.to_path_buf(),
            });
        }

        let after_img = image::open(after)?;

        if before_img.dimensions() != after_img.dimensions() {
            warn!(
                "Screenshot dimensions differ: before {:?} vs after {:?}",
                before_img.dimensions(),
                after_img.dimensions()
            );
        }

        let width = before_img.width().max(after_img.width());
        let height = before_img.height().max(after_img.height());
        let before_rgba = before_img.to_rgba8();
        let after_rgba = after_img.to_rgba8();

        let mut diff_img = RgbaImage::new(width, height);
        let mut diff_pixels = 0u64;
        let total_pixels = (width as u64) * (height as u64);

        for y in 0..height {
            for x in 0..width {
                let a = before_rgba.get_pixel_checked(x, y);
                let b = after_rgba.get_pixel_checked(x, y);
                let out = match (a, b) {
                    (Some(a), Some(b)) if !Self::pixels_differ(a, b) => Self::dimmed(b),
                    _ => {
                        diff_pixels += 1;
                        DIFF_COLOR
                    }
                };
                diff_img.put_pixel(x, y, out);
            }
        }

        diff_img.save(output)?;

        let diff_percent = if total_pixels == 0 {
            0.0
        } else {
            (diff_pixels as f64 / total_pixels as f64) * 100.0
        };

        debug!(
            "Pixel diff {} -> {}: {} of {} pixels differ",
            before.display(),
            after.display(),
            diff_pixels,
            total_pixels
        );

        Ok(PixelDiffSummary {
            diff_pixels,
            total_pixels,
            diff_percent,
            identical: false,
            artifact: output.to_path_buf(),
        })
    }
}

/// Hash a file using SHA256
pub fn hash_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
