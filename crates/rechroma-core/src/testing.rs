//! Shared helpers for unit tests

use image::RgbImage;

use crate::error::EngineError;
use crate::plane::{self, Plane};
use crate::predictor::{ChromaPatch, ChromaPredictor, PATCH_SIZE};

/// Predictor that returns the same chroma offset everywhere, regardless
/// of the luma it sees. Useful because a uniform prediction makes the
/// global and tiled passes coincide exactly.
pub struct UniformPredictor {
    pub chroma_a: f32,
    pub chroma_b: f32,
}

impl ChromaPredictor for UniformPredictor {
    fn predict(&self, _luma: &Plane) -> Result<ChromaPatch, EngineError> {
        Ok(ChromaPatch {
            chroma_a: plane::filled(PATCH_SIZE, PATCH_SIZE, self.chroma_a),
            chroma_b: plane::filled(PATCH_SIZE, PATCH_SIZE, self.chroma_b),
        })
    }
}

/// Solid gray RGB image.
pub fn gray_image(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, image::Rgb([value, value, value]))
}

/// Constant-valued plane.
pub fn uniform_field(width: u32, height: u32, value: f32) -> Plane {
    plane::filled(width, height, value)
}
