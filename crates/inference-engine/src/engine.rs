//! Inference backend seam and the mock backend used for development

use ndarray::{ArrayD, IxDyn};
use tracing::{debug, info};

use crate::tensor::{ElementType, InputTensor, NetworkDescription, OutputTensor, TensorDesc};
use crate::InferenceError;

/// An inference engine that can run one loaded network.
///
/// The engine owns the model; callers only see the declared tensors and
/// exchange prepared buffers with it.
pub trait InferenceBackend: Send + 'static {
    /// Inputs and outputs the loaded network declares
    fn network(&self) -> &NetworkDescription;

    /// Run inference on one prepared input
    fn infer(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError>;
}

/// Mock backend producing deterministic vertical class bands.
///
/// Band positions shift by one column per call so that consecutive
/// frames differ.
pub struct MockBackend {
    network: NetworkDescription,
    classes: usize,
    calls: u64,
    fail_at: Option<u64>,
}

impl MockBackend {
    /// Mock network with an NCHW image input and an `H x W x classes`
    /// score output
    pub fn probabilities(input_hw: (usize, usize), output_hw: (usize, usize), classes: usize) -> Self {
        info!(
            "Creating mock backend: {}x{} scores over {} classes",
            output_hw.0, output_hw.1, classes
        );
        Self::with_output(
            input_hw,
            TensorDesc::new("scores", &[output_hw.0, output_hw.1, classes], ElementType::F32),
            classes,
        )
    }

    /// Mock network with an NCHW image input and an `H x W` class id output
    pub fn class_ids(input_hw: (usize, usize), output_hw: (usize, usize), classes: usize) -> Self {
        info!(
            "Creating mock backend: {}x{} class ids over {} classes",
            output_hw.0, output_hw.1, classes
        );
        Self::with_output(
            input_hw,
            TensorDesc::new("class_ids", &[output_hw.0, output_hw.1], ElementType::I32),
            classes,
        )
    }

    /// Mock network declaring an arbitrary output tensor
    pub fn with_output(input_hw: (usize, usize), output: TensorDesc, classes: usize) -> Self {
        let input = TensorDesc::new("image", &[1, 3, input_hw.0, input_hw.1], ElementType::F32);
        Self {
            network: NetworkDescription::new(vec![input], vec![output]),
            classes: classes.max(1),
            calls: 0,
            fail_at: None,
        }
    }

    /// Make the call with the given zero-based number fail
    pub fn fail_at(mut self, call: u64) -> Self {
        self.fail_at = Some(call);
        self
    }

    /// Number of inference calls served so far
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn band_class(&self, x: usize, width: usize) -> usize {
        let shifted = (x + self.calls as usize) % width.max(1);
        shifted * self.classes / width.max(1)
    }

    fn output_desc(&self) -> Result<&TensorDesc, InferenceError> {
        self.network
            .outputs
            .first()
            .ok_or_else(|| InferenceError::ModelLoadError("Mock network has no output".to_string()))
    }
}

impl InferenceBackend for MockBackend {
    fn network(&self) -> &NetworkDescription {
        &self.network
    }

    fn infer(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        let expected = &self.network.inputs[0].dims;
        if input.dims() != expected.as_slice() {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", input.dims()),
            });
        }

        if self.fail_at == Some(self.calls) {
            self.calls += 1;
            return Err(InferenceError::InferenceFailed(format!(
                "Mock failure on call {}",
                self.calls - 1
            )));
        }

        let desc = self.output_desc()?.clone();
        let (height, width) = match desc.dims.as_slice() {
            [h, w] | [h, w, _] => (*h, *w),
            other => {
                return Err(InferenceError::InferenceFailed(format!(
                    "Mock backend cannot fill output of shape {:?}",
                    other
                )))
            }
        };

        let output = if desc.rank() == 3 {
            let channels = desc.dims[2];
            let mut scores = ArrayD::<f32>::zeros(IxDyn(&desc.dims));
            for y in 0..height {
                for x in 0..width {
                    let class = self.band_class(x, width) % channels;
                    scores[[y, x, class].as_slice()] = 1.0;
                }
            }
            match desc.element {
                ElementType::F32 => OutputTensor::F32(scores),
                ElementType::I32 => OutputTensor::I32(scores.mapv(|v| v as i32)),
                ElementType::I64 => OutputTensor::I64(scores.mapv(|v| v as i64)),
                ElementType::U8 => OutputTensor::U8(scores.mapv(|v| v as u8)),
            }
        } else {
            let ids = ArrayD::from_shape_fn(IxDyn(&desc.dims), |idx| self.band_class(idx[1], width));
            match desc.element {
                ElementType::I64 => OutputTensor::I64(ids.mapv(|v| v as i64)),
                ElementType::U8 => OutputTensor::U8(ids.mapv(|v| v as u8)),
                ElementType::F32 => OutputTensor::F32(ids.mapv(|v| v as f32)),
                ElementType::I32 => OutputTensor::I32(ids.mapv(|v| v as i32)),
            }
        };

        debug!("Mock inference call {} produced {:?}", self.calls, output.dims());
        self.calls += 1;
        Ok(output)
    }
}
