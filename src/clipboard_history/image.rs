//! Clipboard image helpers
//!
//! Header-only dimension probing for captured images, plus the PNG/RGBA
//! conversions the system clipboard adapters need.

use anyhow::{Context, Result};
use std::io::Cursor;
use tracing::debug;

/// Probe pixel dimensions from the encoded image header without decoding
/// pixel data.
///
/// Returns `None` for anything the `image` crate cannot recognise; callers
/// keep the bytes either way.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dims) => Some(dims),
        Err(e) => {
            debug!(error = %e, size = bytes.len(), "Could not probe image dimensions");
            None
        }
    }
}

/// Encode raw RGBA pixels as PNG bytes
pub fn encode_rgba_to_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>> {
    let rgba_image = image::RgbaImage::from_raw(width, height, rgba)
        .context("RGBA buffer does not match image dimensions")?;

    let mut png_data = Vec::new();
    rgba_image
        .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .context("Failed to encode image as PNG")?;

    debug!(width, height, png_size = png_data.len(), "Encoded clipboard image as PNG");
    Ok(png_data)
}

/// Decode encoded image bytes into (width, height, RGBA pixels)
pub fn decode_to_rgba(bytes: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let img = image::load_from_memory(bytes).context("Failed to decode clipboard image")?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok((width, height, rgba.into_raw()))
}

#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let pixels = vec![0u8; (width * height * 4) as usize];
    encode_rgba_to_png(width, height, pixels).expect("encode test png")
}
