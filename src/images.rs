//! Image decoding helpers for fingerprinting
//!
//! Rejects HTML error pages before handing bytes to the decoder, which
//! guesses the format itself, then flattens transparency onto white so every
//! listing photo is hashed against the same background.

use anyhow::{bail, Context, Result};
use image::{DynamicImage, Rgb, RgbImage};

/// Checks if bytes look like HTML content (case-insensitive check of first 50 bytes).
///
/// CDNs love to answer 200 with an error page.
pub fn is_html_content(bytes: &[u8]) -> bool {
    let check_len = bytes.len().min(50);
    let prefix = bytes[0..check_len].to_ascii_lowercase();
    let prefix = prefix.trim_ascii_start();

    prefix.starts_with(b"<!doctype") || prefix.starts_with(b"<html")
}

/// Decode raw bytes into an opaque RGB image, compositing any alpha channel
/// over a white background.
pub fn decode_flattened(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        bail!("empty image body");
    }
    if is_html_content(bytes) {
        bail!("body is html, not an image");
    }

    let img = image::load_from_memory(bytes).context("Failed to decode image")?;
    Ok(flatten_on_white(&img))
}

/// Alpha-composite onto white. Images without alpha pass through unchanged.
pub fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
