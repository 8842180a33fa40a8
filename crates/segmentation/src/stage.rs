//! Segmentation stage: negotiated shapes plus the class color table

use image::RgbImage;
use inference_engine::{NetworkDescription, OutputTensor};
use tracing::{debug, info};

use crate::color::{ColorTable, FrozenPalette, Rgb};
use crate::config::SegmentationConfig;
use crate::decode::{class_indices, render_mask};
use crate::result::SegmentationResult;
use crate::shape::{InputShape, IoShapes, OutputLayout};
use crate::SegmentationError;

/// Decodes raw network outputs into color masks
pub struct SegmentationStage {
    shapes: IoShapes,
    colors: ColorTable,
}

impl SegmentationStage {
    /// Negotiate shapes against `network`; fails before any inference runs
    pub fn new(network: &NetworkDescription, config: &SegmentationConfig) -> Result<Self, SegmentationError> {
        if config.max_classes == 0 {
            return Err(SegmentationError::Configuration(
                "max_classes must be at least 1".to_string(),
            ));
        }
        let shapes = IoShapes::negotiate(network, config.max_classes)?;
        info!(
            "Segmentation stage ready: {}x{} output, color seed {}",
            shapes.layout.height(),
            shapes.layout.width(),
            config.color_seed
        );
        Ok(Self {
            shapes,
            colors: ColorTable::new(config.color_seed, config.max_classes),
        })
    }

    pub fn shapes(&self) -> &IoShapes {
        &self.shapes
    }

    pub fn input_shape(&self) -> InputShape {
        self.shapes.input
    }

    pub fn layout(&self) -> OutputLayout {
        self.shapes.layout
    }

    /// Color assigned to a class
    pub fn class_color(&mut self, class: i64) -> Result<Rgb, SegmentationError> {
        self.colors.color(class)
    }

    /// Colors generated so far
    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    /// Pre-generate colors for every class the output can hold and
    /// return a palette usable from other threads
    pub fn frozen_palette(&mut self) -> FrozenPalette {
        let classes = match self.shapes.layout {
            OutputLayout::Probabilities { classes, .. } => classes,
            OutputLayout::ClassIndex { .. } => self.colors.max_classes(),
        };
        self.colors.prefill(classes);
        self.colors.freeze()
    }

    /// Decode one output tensor into a mask tagged with `frame_id` and `extra`
    pub fn decode<A>(
        &mut self,
        frame_id: u64,
        output: &OutputTensor,
        extra: A,
    ) -> Result<SegmentationResult<A>, SegmentationError> {
        let mask = self.render(output)?;
        debug!("Decoded frame {} into {}x{} mask", frame_id, mask.width(), mask.height());
        Ok(SegmentationResult::new(frame_id, mask, extra))
    }

    /// Decode one output tensor and return only the mask image
    pub fn render(&mut self, output: &OutputTensor) -> Result<RgbImage, SegmentationError> {
        let indices = class_indices(&self.shapes, output, &self.colors)?;
        render_mask(&indices, &mut self.colors)
    }
}
