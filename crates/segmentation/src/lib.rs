//! Semantic Segmentation Pipeline
//!
//! Turns the raw output of a segmentation network into color-coded masks:
//! - Input/output shape negotiation against the declared network
//! - Deterministic class color table
//! - Argmax and per-class score decoding
//! - Ordered frame submission and result retrieval over an inference worker

pub mod color;
pub mod config;
pub mod decode;
pub mod pipeline;
pub mod result;
pub mod shape;
pub mod stage;

pub use color::{ClassPalette, ColorTable, FrozenPalette, Rgb};
pub use config::SegmentationConfig;
pub use pipeline::SegmentationPipeline;
pub use result::SegmentationResult;
pub use shape::{InputShape, IoShapes, OutputLayout};
pub use stage::SegmentationStage;

use inference_engine::{ElementType, InferenceError};
use thiserror::Error;

/// Segmentation error types
#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid class index {index} (supported range 0..{max})")]
    InvalidIndex { index: i64, max: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Pipeline busy: {in_flight} frames already in flight")]
    Busy { in_flight: usize },

    #[error("Unsupported element type {0} for class id output")]
    UnsupportedElement(ElementType),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}
