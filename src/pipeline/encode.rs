//! Image encoding: `DynamicImage` → PNG bytes → base64 `ImageData`.
//!
//! Rasterised pages are kept as PNG bytes so the chunker can size chunks by
//! what actually goes over the wire. The base64 wrap happens only when the
//! vision backend builds its request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
///
/// PNG is lossless; JPEG artefacts on rendered text degrade OCR accuracy at
/// low DPI.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap PNG bytes for a multimodal request.
///
/// `detail: "high"` lets GPT-4-class models tile the full image; with
/// `low` fine print and small table cells are lost.
pub fn to_image_data(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

/// Size of `byte_len` bytes once base64-encoded, in MiB.
pub fn base64_mb(byte_len: u64) -> f64 {
    byte_len as f64 * 4.0 / 3.0 / (1024.0 * 1024.0)
}
