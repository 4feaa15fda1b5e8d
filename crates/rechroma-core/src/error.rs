//! Engine error types

use thiserror::Error;

/// Errors surfaced by the colorization engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid target color {0:?}: expected #RRGGBB")]
    InvalidColor(String),

    #[error("predictor failed: {0}")]
    Predictor(String),

    #[error("predictor returned a {width}x{height} patch, expected {expected}x{expected}")]
    PatchSize {
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
