//! Rechroma Core Library
//!
//! Tile-based chrominance reconstruction for grayscale photographs.
//! A fixed-resolution chroma predictor (an external model, injected as a
//! [`ChromaPredictor`] handle) is run globally and over an overlapping
//! tile grid; the results are blended, stretched back to full vibrancy,
//! and recombined with the original luminance. Brushed regions can then
//! be re-colored locally with [`refine::refine_image`].

pub mod color;
pub mod decoders;
pub mod error;
pub mod exporters;
pub mod models;
pub mod pipeline;
pub mod plane;
pub mod predictor;
pub mod refine;
pub mod tiles;

// ONNX predictor backend (optional, enabled with the "onnx" feature)
#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use color::{parse_hex_color, TargetColor};
pub use error::EngineError;
pub use models::{CancelToken, ColorizeOptions, RefineOptions};
pub use pipeline::{colorize_image, colorize_image_cancellable, ChromaField};
pub use predictor::{ChromaPatch, ChromaPredictor, PATCH_SIZE};
pub use refine::{refine_image, RefineRequest};

#[cfg(feature = "onnx")]
pub use onnx::OnnxPredictor;
