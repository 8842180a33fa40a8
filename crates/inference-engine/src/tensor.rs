//! Tensor descriptors and buffers exchanged with an inference backend

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::InferenceError;

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    F32,
    I32,
    I64,
    U8,
}

impl ElementType {
    /// Whether the element type holds integer values
    pub fn is_integer(&self) -> bool {
        !matches!(self, ElementType::F32)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "u8",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape and type of one network input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
    /// Tensor name as declared by the model
    pub name: String,
    /// Dimensions, outermost first
    pub dims: Vec<usize>,
    /// Element type
    pub element: ElementType,
}

impl TensorDesc {
    pub fn new(name: impl Into<String>, dims: &[usize], element: ElementType) -> Self {
        Self {
            name: name.into(),
            dims: dims.to_vec(),
            element,
        }
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inputs and outputs a loaded network declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescription {
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
}

impl NetworkDescription {
    pub fn new(inputs: Vec<TensorDesc>, outputs: Vec<TensorDesc>) -> Self {
        Self { inputs, outputs }
    }
}

/// Prepared input buffer (row-major, already laid out for the network)
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(pub ArrayD<f32>);

impl InputTensor {
    /// Build an input tensor from a flat row-major buffer
    pub fn from_shape_vec(dims: &[usize], data: Vec<f32>) -> Result<Self, InferenceError> {
        let actual = data.len();
        ArrayD::from_shape_vec(IxDyn(dims), data)
            .map(InputTensor)
            .map_err(|_| InferenceError::InvalidInputShape {
                expected: format!("{:?} ({} elements)", dims, dims.iter().product::<usize>()),
                actual: format!("{} elements", actual),
            })
    }

    /// Zero-filled input of the given shape
    pub fn zeros(dims: &[usize]) -> Self {
        InputTensor(ArrayD::zeros(IxDyn(dims)))
    }

    pub fn dims(&self) -> &[usize] {
        self.0.shape()
    }
}

/// Row-major output buffer returned by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTensor {
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
}

macro_rules! output_from_vec {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Build an output tensor from a flat row-major buffer
        pub fn $name(dims: &[usize], data: Vec<$ty>) -> Result<Self, InferenceError> {
            let actual = data.len();
            ArrayD::from_shape_vec(IxDyn(dims), data)
                .map(OutputTensor::$variant)
                .map_err(|_| InferenceError::InvalidInputShape {
                    expected: format!("{:?} ({} elements)", dims, dims.iter().product::<usize>()),
                    actual: format!("{} elements", actual),
                })
        }
    };
}

impl OutputTensor {
    output_from_vec!(from_f32, F32, f32);
    output_from_vec!(from_i32, I32, i32);
    output_from_vec!(from_i64, I64, i64);
    output_from_vec!(from_u8, U8, u8);

    /// Dimensions of the buffer
    pub fn dims(&self) -> &[usize] {
        match self {
            OutputTensor::F32(a) => a.shape(),
            OutputTensor::I32(a) => a.shape(),
            OutputTensor::I64(a) => a.shape(),
            OutputTensor::U8(a) => a.shape(),
        }
    }

    /// Element type of the buffer
    pub fn element(&self) -> ElementType {
        match self {
            OutputTensor::F32(_) => ElementType::F32,
            OutputTensor::I32(_) => ElementType::I32,
            OutputTensor::I64(_) => ElementType::I64,
            OutputTensor::U8(_) => ElementType::U8,
        }
    }
}
