//! Image encoding and export

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbImage};

use crate::error::EngineError;

/// Save an image to disk, creating parent directories as needed.
/// The format is inferred from the file extension.
pub fn export_image<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<(), EngineError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image
        .save(path)
        .map_err(|e| EngineError::Encode(format!("{}: {}", path.display(), e)))
}

/// Encode an image as JPEG bytes, for callers that stream results.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EngineError> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| EngineError::Encode(format!("JPEG encode error: {}", e)))?;
    Ok(buf.into_inner())
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, EngineError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| EngineError::Encode(format!("PNG encode error: {}", e)))?;
    Ok(buf.into_inner())
}
