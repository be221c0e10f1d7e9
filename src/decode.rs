use crate::error::DecodeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::GrayImage;

/// Splits an optional data-URL header (`data:image/png;base64,`) from the
/// encoded body.
///
/// Everything up to the first comma is treated as header; without a comma the
/// whole payload is the body.
pub fn split_data_url(payload: &str) -> (Option<&str>, &str) {
    match payload.split_once(',') {
        Some((header, body)) => (Some(header), body),
        None => (None, payload),
    }
}

/// Decodes a base64 image payload into a single-channel raster.
///
/// The image format is detected from the decoded bytes, and the result is
/// always converted to 8-bit grayscale.
pub fn decode_base64_image(payload: &str) -> Result<GrayImage, DecodeError> {
    let (header, body) = split_data_url(payload);
    if let Some(header) = header {
        log::debug!("Header removed: {}", header);
    }

    // Payloads pasted from logs or forms may be line-wrapped.
    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(body.as_bytes())?;
    log::debug!("Decoded {} bytes of base64 payload", bytes.len());

    decode_image_bytes(&bytes)
}

/// Decodes raw encoded image bytes (PNG, JPEG, ...) into a grayscale raster.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    log::debug!(
        "Image created: size={}x{}, color={:?}",
        image.width(),
        image.height(),
        image.color()
    );
    Ok(image.to_luma8())
}
