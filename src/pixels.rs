//! PNG helpers for 28x28 digits.
//!
//! Inference consumes a normalized grayscale vector; these helpers produce one
//! from a PNG file and write raw MNIST pixels back out as PNG.

use std::path::Path;

use image::{GrayImage, ImageFormat};

use crate::idx::{HEIGHT, WIDTH};
use crate::{Error, Result};

/// Decode a 28x28 PNG into `WIDTH * HEIGHT` values in `[0, 1]`, row-major.
///
/// Colour images are reduced with the luma weights `0.299 R + 0.587 G + 0.114 B`
/// after premultiplying by alpha, so fully transparent pixels read as 0.
pub fn load_grayscale<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let img = image::open(path)
        .map_err(|e| Error::Image(format!("failed to decode {}: {e}", path.display())))?;

    let (w, h) = (img.width() as usize, img.height() as usize);
    if w != WIDTH || h != HEIGHT {
        return Err(Error::Image(format!(
            "image must be {WIDTH}x{HEIGHT}, got {w}x{h}"
        )));
    }

    let rgba = img.to_rgba8();
    Ok(rgba
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            luma(premultiply(r, a), premultiply(g, a), premultiply(b, a)) / 255.0
        })
        .collect())
}

/// Write `WIDTH * HEIGHT` raw bytes as an 8-bit grayscale PNG.
pub fn save_grayscale<P: AsRef<Path>>(path: P, pixels: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let img = GrayImage::from_raw(WIDTH as u32, HEIGHT as u32, pixels.to_vec()).ok_or_else(
        || {
            Error::Image(format!(
                "expected {} pixels, got {}",
                WIDTH * HEIGHT,
                pixels.len()
            ))
        },
    )?;
    img.save_with_format(path, ImageFormat::Png)
        .map_err(|e| Error::Image(format!("failed to write {}: {e}", path.display())))
}

/// 8-bit channel scaled by alpha through 16-bit intermediates, truncating.
#[inline]
fn premultiply(c: u8, a: u8) -> u8 {
    let c16 = u32::from(c) * 0x101;
    let a16 = u32::from(a) * 0x101;
    ((c16 * a16 / 0xffff) >> 8) as u8
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> f64 {
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}
