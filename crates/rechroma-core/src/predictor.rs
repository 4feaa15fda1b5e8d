//! Predictor contract
//!
//! The chroma predictor is an external collaborator: a trained model that
//! maps a fixed-size luminance patch to a two-channel chroma prediction.
//! The engine never owns one globally; callers inject a handle into the
//! entry points.

use crate::error::EngineError;
use crate::plane::Plane;

/// Side length of the fixed-resolution patch every predictor consumes
/// and produces.
pub const PATCH_SIZE: u32 = 256;

/// Two signed chroma channels at [`PATCH_SIZE`] resolution.
///
/// The value scale is whatever the model was trained to produce; the
/// engine treats it as an unscaled chroma offset and applies its own
/// clamps downstream.
pub struct ChromaPatch {
    pub chroma_a: Plane,
    pub chroma_b: Plane,
}

impl ChromaPatch {
    /// Check that both channels are [`PATCH_SIZE`] square.
    pub fn validate(&self) -> Result<(), EngineError> {
        for plane in [&self.chroma_a, &self.chroma_b] {
            let (width, height) = plane.dimensions();
            if width != PATCH_SIZE || height != PATCH_SIZE {
                return Err(EngineError::PatchSize {
                    width,
                    height,
                    expected: PATCH_SIZE,
                });
            }
        }
        Ok(())
    }
}

/// Black-box luma-to-chroma predictor.
///
/// `luma` is a [`PATCH_SIZE`]-square plane normalized to [0, 1].
/// Implementations must be shareable across threads; the tiled pass calls
/// `predict` from a rayon pool. A backend that cannot run concurrently
/// must serialize internally (see the `onnx` backend's session mutex).
pub trait ChromaPredictor: Send + Sync {
    fn predict(&self, luma: &Plane) -> Result<ChromaPatch, EngineError>;
}
