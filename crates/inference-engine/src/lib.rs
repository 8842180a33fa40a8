//! Inference Engine Seam
//!
//! Describes networks and tensors, defines the backend trait a real
//! engine plugs into, and runs submitted frames through a backend on a
//! tokio worker.

mod engine;
mod tensor;
mod worker;

pub use engine::{InferenceBackend, MockBackend};
pub use tensor::{ElementType, InputTensor, NetworkDescription, OutputTensor, TensorDesc};
pub use worker::{InferenceRequest, InferenceResponse, InferenceWorker};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Inference worker stopped")]
    WorkerStopped,
}
