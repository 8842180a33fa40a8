//! Segmentation configuration

use serde::{Deserialize, Serialize};

use crate::color::{DEFAULT_COLOR_SEED, DEFAULT_MAX_CLASSES};

/// Segmentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Largest number of classes accepted from the network
    pub max_classes: usize,

    /// Seed of the class color generator
    pub color_seed: u32,

    /// Mask opacity when blending over a frame (0-1)
    pub overlay_alpha: f32,

    /// Frames that may be queued for inference at once
    pub queue_capacity: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_classes: DEFAULT_MAX_CLASSES,
            color_seed: DEFAULT_COLOR_SEED,
            overlay_alpha: 0.5,
            queue_capacity: 4,
        }
    }
}

impl SegmentationConfig {
    /// Create config for a single in-flight frame
    pub fn low_latency() -> Self {
        Self {
            queue_capacity: 1,
            ..Default::default()
        }
    }

    /// Create config that keeps more frames in flight
    pub fn high_throughput() -> Self {
        Self {
            queue_capacity: 16,
            ..Default::default()
        }
    }
}
