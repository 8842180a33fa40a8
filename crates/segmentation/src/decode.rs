//! Raw output tensor decoding

use image::RgbImage;
use inference_engine::OutputTensor;
use ndarray::{Array2, ArrayViewD, Axis, Ix3};

use crate::color::ClassPalette;
use crate::shape::{IoShapes, OutputLayout};
use crate::SegmentationError;

/// Reduce an output tensor to one validated class index per pixel.
///
/// Every index is checked against `palette` before returning, so a
/// subsequent [`render_mask`] cannot fail halfway through.
pub fn class_indices<P: ClassPalette + ?Sized>(
    shapes: &IoShapes,
    tensor: &OutputTensor,
    palette: &P,
) -> Result<Array2<usize>, SegmentationError> {
    if tensor.dims() != shapes.output_dims.as_slice() {
        return Err(SegmentationError::ShapeMismatch {
            expected: shapes.output_dims.clone(),
            actual: tensor.dims().to_vec(),
        });
    }

    match shapes.layout {
        OutputLayout::ClassIndex { height, width } => {
            let ids: Vec<i64> = match tensor {
                OutputTensor::I32(a) => a.iter().map(|&v| i64::from(v)).collect(),
                OutputTensor::I64(a) => a.iter().copied().collect(),
                OutputTensor::U8(a) => a.iter().map(|&v| i64::from(v)).collect(),
                OutputTensor::F32(_) => return Err(SegmentationError::UnsupportedElement(tensor.element())),
            };
            let indices = ids
                .into_iter()
                .map(|id| palette.check_index(id))
                .collect::<Result<Vec<_>, _>>()?;
            Array2::from_shape_vec((height, width), indices).map_err(|_| SegmentationError::ShapeMismatch {
                expected: vec![height, width],
                actual: tensor.dims().to_vec(),
            })
        }
        OutputLayout::Probabilities { .. } => {
            let indices = match tensor {
                OutputTensor::F32(a) => argmax_channels(a.view())?,
                OutputTensor::I32(a) => argmax_channels(a.view())?,
                OutputTensor::I64(a) => argmax_channels(a.view())?,
                OutputTensor::U8(a) => argmax_channels(a.view())?,
            };
            for &index in indices.iter() {
                palette.check_index(index as i64)?;
            }
            Ok(indices)
        }
    }
}

/// Index of the highest score along the last axis of an `H x W x C` tensor.
///
/// Ties go to the lowest channel; NaN scores never win.
pub fn argmax_channels<T>(scores: ArrayViewD<'_, T>) -> Result<Array2<usize>, SegmentationError>
where
    T: Copy + PartialOrd,
{
    let actual = scores.shape().to_vec();
    let scores = scores.into_dimensionality::<Ix3>().map_err(|_| {
        let mut expected = actual.clone();
        expected.resize(3, 1);
        SegmentationError::ShapeMismatch { expected, actual }
    })?;

    let is_nan = |v: T| v.partial_cmp(&v).is_none();
    let reduced = scores.map_axis(Axis(2), |lane| {
        let mut best = 0;
        let mut best_score: Option<T> = None;
        for (channel, &score) in lane.iter().enumerate() {
            if is_nan(score) {
                continue;
            }
            match best_score {
                Some(current) if score <= current => {}
                _ => {
                    best = channel;
                    best_score = Some(score);
                }
            }
        }
        best
    });
    Ok(reduced)
}

/// Paint each class index with its palette color
pub fn render_mask<P: ClassPalette + ?Sized>(
    indices: &Array2<usize>,
    palette: &mut P,
) -> Result<RgbImage, SegmentationError> {
    let (height, width) = indices.dim();
    let mut mask = RgbImage::new(width as u32, height as u32);
    for ((y, x), &class) in indices.indexed_iter() {
        let color = palette.class_color(class as i64)?;
        mask.put_pixel(x as u32, y as u32, image::Rgb(color));
    }
    Ok(mask)
}
