//! Input/output shape negotiation

use inference_engine::{NetworkDescription, TensorDesc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::SegmentationError;

/// How the network encodes classes in its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputLayout {
    /// One class id per pixel (`H x W`, or `H x W x 1`)
    ClassIndex { height: usize, width: usize },
    /// One score per class per pixel (`H x W x C`)
    Probabilities {
        height: usize,
        width: usize,
        classes: usize,
    },
}

impl OutputLayout {
    pub fn height(&self) -> usize {
        match *self {
            OutputLayout::ClassIndex { height, .. } | OutputLayout::Probabilities { height, .. } => height,
        }
    }

    pub fn width(&self) -> usize {
        match *self {
            OutputLayout::ClassIndex { width, .. } | OutputLayout::Probabilities { width, .. } => width,
        }
    }

    /// Score channels per pixel (1 for class id layouts)
    pub fn channels(&self) -> usize {
        match *self {
            OutputLayout::ClassIndex { .. } => 1,
            OutputLayout::Probabilities { classes, .. } => classes,
        }
    }
}

/// Negotiated NCHW network input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    /// Dims of a single-image input tensor
    pub fn dims(&self) -> [usize; 4] {
        [1, self.channels, self.height, self.width]
    }
}

/// Shapes recorded once when the stage is set up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoShapes {
    pub input: InputShape,
    pub layout: OutputLayout,
    /// Output dims exactly as declared by the network
    pub output_dims: Vec<usize>,
}

impl IoShapes {
    /// Match a network's declared tensors against the supported layouts
    pub fn negotiate(network: &NetworkDescription, max_classes: usize) -> Result<Self, SegmentationError> {
        let input = match network.inputs.as_slice() {
            [input] => negotiate_input(input)?,
            inputs => {
                return Err(SegmentationError::Configuration(format!(
                    "Expected exactly 1 network input, found {}",
                    inputs.len()
                )))
            }
        };

        let output = match network.outputs.as_slice() {
            [output] => output,
            outputs => {
                return Err(SegmentationError::Configuration(format!(
                    "Expected exactly 1 network output, found {}",
                    outputs.len()
                )))
            }
        };
        let layout = negotiate_output(output, max_classes)?;

        info!(
            "Negotiated segmentation shapes: input {:?}, output '{}' {:?} as {:?}",
            input.dims(),
            output.name,
            output.dims,
            layout
        );

        Ok(Self {
            input,
            layout,
            output_dims: output.dims.clone(),
        })
    }
}

fn negotiate_input(desc: &TensorDesc) -> Result<InputShape, SegmentationError> {
    match desc.dims.as_slice() {
        [1, c, h, w] if *c > 0 && *h > 0 && *w > 0 => Ok(InputShape {
            channels: *c,
            height: *h,
            width: *w,
        }),
        dims => Err(SegmentationError::Configuration(format!(
            "Input '{}' must be a single NCHW image, got shape {:?}",
            desc.name, dims
        ))),
    }
}

fn negotiate_output(desc: &TensorDesc, max_classes: usize) -> Result<OutputLayout, SegmentationError> {
    if desc.dims.contains(&0) {
        return Err(SegmentationError::Configuration(format!(
            "Output '{}' has an empty dimension: {:?}",
            desc.name, desc.dims
        )));
    }

    match *desc.dims.as_slice() {
        [height, width] if desc.element.is_integer() => Ok(OutputLayout::ClassIndex { height, width }),
        [_, _] => Err(SegmentationError::Configuration(format!(
            "Output '{}' is 2-D but holds {} values; class id outputs must be integer",
            desc.name, desc.element
        ))),
        [height, width, 1] if desc.element.is_integer() => Ok(OutputLayout::ClassIndex { height, width }),
        [_, _, classes] if classes > max_classes => Err(SegmentationError::Configuration(format!(
            "Output '{}' has {} classes, at most {} are supported",
            desc.name, classes, max_classes
        ))),
        [height, width, classes] => Ok(OutputLayout::Probabilities {
            height,
            width,
            classes,
        }),
        _ => Err(SegmentationError::Configuration(format!(
            "Unexpected output shape {:?} for '{}'; only 2-D and 3-D outputs are supported",
            desc.dims, desc.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::ElementType;

    fn network(output: &[usize], element: ElementType) -> NetworkDescription {
        NetworkDescription::new(
            vec![TensorDesc::new("image", &[1, 3, 32, 48], ElementType::F32)],
            vec![TensorDesc::new("out", output, element)],
        )
    }

    #[test]
    fn test_class_index_layout() {
        let shapes = IoShapes::negotiate(&network(&[16, 24], ElementType::I32), 256).unwrap();
        assert_eq!(shapes.layout, OutputLayout::ClassIndex { height: 16, width: 24 });
        assert_eq!(shapes.input.dims(), [1, 3, 32, 48]);
    }

    #[test]
    fn test_single_channel_integer_is_class_index() {
        let shapes = IoShapes::negotiate(&network(&[16, 24, 1], ElementType::I64), 256).unwrap();
        assert_eq!(shapes.layout, OutputLayout::ClassIndex { height: 16, width: 24 });
        assert_eq!(shapes.output_dims, vec![16, 24, 1]);
    }

    #[test]
    fn test_probability_layout() {
        let shapes = IoShapes::negotiate(&network(&[16, 24, 21], ElementType::F32), 256).unwrap();
        assert_eq!(
            shapes.layout,
            OutputLayout::Probabilities {
                height: 16,
                width: 24,
                classes: 21
            }
        );
        assert_eq!(shapes.layout.channels(), 21);
    }

    #[test]
    fn test_rejects_4d_output() {
        let err = IoShapes::negotiate(&network(&[1, 21, 16, 24], ElementType::F32), 256).unwrap_err();
        assert!(matches!(err, SegmentationError::Configuration(_)));
    }

    #[test]
    fn test_rejects_float_class_ids() {
        let err = IoShapes::negotiate(&network(&[16, 24], ElementType::F32), 256).unwrap_err();
        assert!(matches!(err, SegmentationError::Configuration(_)));
    }

    #[test]
    fn test_rejects_too_many_classes() {
        let err = IoShapes::negotiate(&network(&[4, 4, 300], ElementType::F32), 256).unwrap_err();
        assert!(matches!(err, SegmentationError::Configuration(_)));
    }

    #[test]
    fn test_rejects_multiple_outputs() {
        let mut net = network(&[4, 4], ElementType::I32);
        net.outputs.push(TensorDesc::new("aux", &[4, 4], ElementType::I32));
        assert!(matches!(
            IoShapes::negotiate(&net, 256),
            Err(SegmentationError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_batched_input() {
        let net = NetworkDescription::new(
            vec![TensorDesc::new("image", &[2, 3, 32, 48], ElementType::F32)],
            vec![TensorDesc::new("out", &[4, 4], ElementType::I32)],
        );
        assert!(matches!(
            IoShapes::negotiate(&net, 256),
            Err(SegmentationError::Configuration(_))
        ));
    }
}
