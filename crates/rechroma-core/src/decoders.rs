//! Image and mask decoding

use std::path::Path;

use image::{GrayImage, RgbImage};

use crate::error::EngineError;

/// Decode an image file into 8-bit RGB.
pub fn decode_image<P: AsRef<Path>>(path: P) -> Result<RgbImage, EngineError> {
    let path = path.as_ref();
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| EngineError::Decode(format!("{}: {}", path.display(), e)))
}

/// Decode an in-memory encoded image into 8-bit RGB.
pub fn decode_from_memory(bytes: &[u8]) -> Result<RgbImage, EngineError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| EngineError::Decode(e.to_string()))
}

/// Decode a brush mask into a single-channel image.
///
/// Any non-zero pixel counts as coverage; color masks are reduced to
/// luminance first.
pub fn decode_mask<P: AsRef<Path>>(path: P) -> Result<GrayImage, EngineError> {
    let path = path.as_ref();
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|e| EngineError::Decode(format!("{}: {}", path.display(), e)))
}

/// Decode an in-memory encoded mask into a single-channel image.
pub fn decode_mask_from_memory(bytes: &[u8]) -> Result<GrayImage, EngineError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_luma8())
        .map_err(|e| EngineError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_from_memory(b"definitely not an image");
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_decode_png_roundtrip() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .expect("encode");

        let decoded = decode_from_memory(&bytes.into_inner()).expect("decode");
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(decoded.get_pixel(0, 0).0, [10, 200, 30]);
    }
}
