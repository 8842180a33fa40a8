//! Segmentation Demo
//!
//! Feeds synthetic frames through the segmentation pipeline using the mock
//! backend and writes each mask, plus the mask blended over its frame, as
//! PNG files.

use image::{Rgb, RgbImage};
use inference_engine::{InputTensor, MockBackend};
use segmentation::{SegmentationConfig, SegmentationError, SegmentationPipeline};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Demo error types
#[derive(Error, Debug)]
pub enum DemoError {
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Invalid log level: {0}")]
    LogLevel(String),
}

/// Output encoding of the mock network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockLayout {
    Probabilities,
    ClassIds,
}

/// Demo settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Number of frames to run
    pub frames: u32,

    /// Directory receiving the PNG files
    pub output_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub layout: MockLayout,
    pub input_height: usize,
    pub input_width: usize,
    pub output_height: usize,
    pub output_width: usize,
    pub classes: usize,

    pub segmentation: SegmentationConfig,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            frames: 8,
            output_dir: PathBuf::from("segmentation-output"),
            log_level: "info".to_string(),
            layout: MockLayout::Probabilities,
            input_height: 128,
            input_width: 128,
            output_height: 64,
            output_width: 64,
            classes: 6,
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl DemoSettings {
    /// Load settings from an optional TOML file, then `SEGMENTATION__*`
    /// environment variables (e.g. `SEGMENTATION__FRAMES=4`,
    /// `SEGMENTATION__SEGMENTATION__COLOR_SEED=7`)
    pub fn load(path: Option<&Path>) -> Result<Self, DemoError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("segmentation").required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SEGMENTATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    fn backend(&self) -> MockBackend {
        let input = (self.input_height, self.input_width);
        let output = (self.output_height, self.output_width);
        match self.layout {
            MockLayout::Probabilities => MockBackend::probabilities(input, output, self.classes),
            MockLayout::ClassIds => MockBackend::class_ids(input, output, self.classes),
        }
    }
}

/// Initialize logging
pub fn init_logging(level: &str) -> Result<(), DemoError> {
    let level = Level::from_str(level).map_err(|_| DemoError::LogLevel(level.to_string()))?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Diagonal gradient standing in for a camera frame
pub fn synthetic_frame(width: u32, height: u32, frame: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = ((x + y + frame * 8) % 256) as u8;
        Rgb([v, v / 2, 255 - v])
    })
}

/// Lay out an RGB frame as a normalized `1 x 3 x H x W` tensor
pub fn frame_to_input(frame: &RgbImage) -> Result<InputTensor, DemoError> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in frame.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }
    let input = InputTensor::from_shape_vec(&[1, 3, height, width], data).map_err(SegmentationError::from)?;
    Ok(input)
}

/// Run the demo; returns the number of frames written
pub async fn run_demo(settings: &DemoSettings) -> Result<u32, DemoError> {
    std::fs::create_dir_all(&settings.output_dir)?;

    let mut pipeline: SegmentationPipeline<RgbImage> =
        SegmentationPipeline::new(settings.backend(), &settings.segmentation)?;
    let input_shape = pipeline.stage().input_shape();
    info!(
        "Running {} frames through {:?} pipeline, input {:?}",
        settings.frames,
        pipeline.stage().layout(),
        input_shape.dims()
    );

    let mut written = 0;
    let mut submitted = 0;
    while written < settings.frames {
        while submitted < settings.frames && pipeline.is_ready() {
            let frame = synthetic_frame(input_shape.width as u32, input_shape.height as u32, submitted);
            let input = frame_to_input(&frame)?;
            pipeline.submit(input, frame)?;
            submitted += 1;
        }

        let Some(result) = pipeline.processed_result().await else {
            break;
        };
        let result = result?;

        let mask_path = settings.output_dir.join(format!("mask_{:04}.png", result.frame_id));
        result.mask().save(&mask_path)?;

        let overlay = result.overlay(&result.extra, settings.segmentation.overlay_alpha);
        overlay.save(settings.output_dir.join(format!("overlay_{:04}.png", result.frame_id)))?;

        info!("Wrote {}", mask_path.display());
        written += 1;
    }

    pipeline.shutdown().await;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_input_is_planar() {
        let frame = RgbImage::from_pixel(2, 1, Rgb([255, 0, 51]));
        let input = frame_to_input(&frame).unwrap();

        assert_eq!(input.dims(), &[1, 3, 1, 2]);
        assert_eq!(input.0[[0, 0, 0, 1].as_slice()], 1.0);
        assert_eq!(input.0[[0, 1, 0, 0].as_slice()], 0.0);
        assert!((input.0[[0, 2, 0, 1].as_slice()] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.toml");
        std::fs::write(
            &path,
            "frames = 2\nlayout = \"class_ids\"\n\n[segmentation]\ncolor_seed = 7\n",
        )
        .unwrap();

        let settings = DemoSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.frames, 2);
        assert_eq!(settings.layout, MockLayout::ClassIds);
        assert_eq!(settings.segmentation.color_seed, 7);
        assert_eq!(settings.segmentation.max_classes, 256);
        assert_eq!(settings.classes, 6);
    }

    #[tokio::test]
    async fn test_run_demo_writes_masks() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DemoSettings {
            frames: 3,
            output_dir: dir.path().to_path_buf(),
            input_height: 16,
            input_width: 16,
            output_height: 8,
            output_width: 8,
            segmentation: SegmentationConfig::low_latency(),
            ..Default::default()
        };

        let written = run_demo(&settings).await.unwrap();
        assert_eq!(written, 3);

        let mask = image::open(dir.path().join("mask_0002.png")).unwrap().to_rgb8();
        assert_eq!(mask.dimensions(), (8, 8));
        let overlay = image::open(dir.path().join("overlay_0000.png")).unwrap().to_rgb8();
        assert_eq!(overlay.dimensions(), (16, 16));
    }
}
