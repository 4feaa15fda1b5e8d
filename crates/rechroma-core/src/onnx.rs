//! ONNX predictor backend (feature `onnx`)

use std::path::Path;

use ndarray::Array4;
use parking_lot::Mutex;
use ort::session::Session;

use crate::error::EngineError;
use crate::plane::Plane;
use crate::predictor::{ChromaPatch, ChromaPredictor, PATCH_SIZE};

/// Chroma predictor backed by an ONNX Runtime session.
///
/// The session is not safe for concurrent `run` calls, so inference is
/// serialized behind a mutex; the surrounding resize and accumulation
/// work still parallelizes.
pub struct OnnxPredictor {
    session: Mutex<Session>,
}

impl OnnxPredictor {
    /// Load a model from an `.onnx` file.
    ///
    /// Expected graph: input `(1, 1, 256, 256)` f32 luma in [0, 1],
    /// output `(1, 2, 256, 256)` f32 chroma.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(2))
            .and_then(|b| b.commit_from_file(path.as_ref()))
            .map_err(|e| {
                EngineError::Predictor(format!(
                    "failed to load ONNX model {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl ChromaPredictor for OnnxPredictor {
    fn predict(&self, luma: &Plane) -> Result<ChromaPatch, EngineError> {
        let (width, height) = luma.dimensions();
        if width != PATCH_SIZE || height != PATCH_SIZE {
            return Err(EngineError::PatchSize {
                width,
                height,
                expected: PATCH_SIZE,
            });
        }

        let side = PATCH_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 1, side, side));
        for (x, y, pixel) in luma.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel[0];
        }

        let input = ort::value::Tensor::from_array(tensor)
            .map_err(|e| EngineError::Predictor(format!("failed to build input tensor: {}", e)))?;

        let data: Vec<f32> = {
            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| EngineError::Predictor(format!("inference failed: {}", e)))?;
            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EngineError::Predictor(format!("failed to extract output: {}", e)))?;
            data.to_vec()
        };

        let plane_len = side * side;
        if data.len() < plane_len * 2 {
            return Err(EngineError::Predictor(format!(
                "unexpected output length {} (need {})",
                data.len(),
                plane_len * 2
            )));
        }

        let chroma_a = Plane::from_raw(PATCH_SIZE, PATCH_SIZE, data[..plane_len].to_vec())
            .expect("plane buffer matches dimensions");
        let chroma_b = Plane::from_raw(
            PATCH_SIZE,
            PATCH_SIZE,
            data[plane_len..plane_len * 2].to_vec(),
        )
        .expect("plane buffer matches dimensions");

        Ok(ChromaPatch { chroma_a, chroma_b })
    }
}
