//! Segmentation results and rendering

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Decoded mask for one frame
#[derive(Debug, Clone)]
pub struct SegmentationResult<A = ()> {
    /// Frame identifier assigned at submission
    pub frame_id: u64,
    /// Color-coded class mask (output resolution)
    pub mask: RgbImage,
    /// Caller payload, untouched
    pub extra: A,
}

impl<A> SegmentationResult<A> {
    pub fn new(frame_id: u64, mask: RgbImage, extra: A) -> Self {
        Self { frame_id, mask, extra }
    }

    /// Rendered mask
    pub fn mask(&self) -> &RgbImage {
        &self.mask
    }

    pub fn into_mask(self) -> RgbImage {
        self.mask
    }

    /// Blend the mask over `frame`, scaling it to the frame size.
    ///
    /// `alpha` is the mask opacity, clamped to `[0, 1]`.
    pub fn overlay(&self, frame: &RgbImage, alpha: f32) -> RgbImage {
        let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
        let (width, height) = frame.dimensions();

        let scaled;
        let mask = if self.mask.dimensions() == (width, height) {
            &self.mask
        } else {
            scaled = imageops::resize(&self.mask, width, height, FilterType::Nearest);
            &scaled
        };

        let mut blended = frame.clone();
        for (out, m) in blended.pixels_mut().zip(mask.pixels()) {
            for c in 0..3 {
                let value = out.0[c] as f32 * (1.0 - alpha) + m.0[c] as f32 * alpha;
                out.0[c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
        blended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_overlay_blends_and_scales() {
        let mask = RgbImage::from_pixel(2, 2, Rgb([200, 0, 100]));
        let frame = RgbImage::from_pixel(4, 4, Rgb([0, 100, 100]));
        let result = SegmentationResult::new(3, mask, ());

        let out = result.overlay(&frame, 0.5);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(3, 3).0, [100, 50, 100]);
    }

    #[test]
    fn test_overlay_alpha_clamped() {
        let mask = RgbImage::from_pixel(1, 1, Rgb([10, 20, 30]));
        let frame = RgbImage::from_pixel(1, 1, Rgb([90, 90, 90]));
        let result = SegmentationResult::new(0, mask, ());

        assert_eq!(result.overlay(&frame, 3.0).get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(result.overlay(&frame, -1.0).get_pixel(0, 0).0, [90, 90, 90]);
    }
}
