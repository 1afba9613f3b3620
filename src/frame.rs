//! Owned video frames.
//!
//! - `Frame`: one decoded RGB8 picture plus its position in the stream.
//!
//! Frames are produced by the ingestion layer, optionally rescaled once with a
//! uniform factor, and then shared by reference with every per-frame stage.
//! The grayscale representation used by the HOG detector and the background
//! model is derived on first use and cached with the frame.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use std::sync::OnceLock;

/// Decoded RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Zero-based position of the frame in the source stream.
    pub index: u64,
    gray: OnceLock<GrayImage>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            gray: OnceLock::new(),
        }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Luma representation (Rec. 601 weights, as `image` computes it).
    /// Converted once per frame, however many stages ask for it.
    pub fn gray(&self) -> &GrayImage {
        self.gray.get_or_init(|| imageops::grayscale(&self.image))
    }

    /// Resize by a uniform factor. A factor of exactly 1.0 is a no-op.
    pub fn scaled(self, factor: f32) -> Result<Self> {
        if factor == 1.0 {
            return Ok(self);
        }
        if !factor.is_finite() || factor <= 0.0 {
            return Err(anyhow!("scale factor must be positive, got {}", factor));
        }
        let width = ((self.width() as f32 * factor).round() as u32).max(1);
        let height = ((self.height() as f32 * factor).round() as u32).max(1);
        let image = imageops::resize(&self.image, width, height, FilterType::Triangle);
        Ok(Self::new(image, self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 0).is_err());
        let frame = Frame::from_rgb(vec![7u8; 12], 2, 2, 3).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index, 3);
    }

    #[test]
    fn scaled_resizes_uniformly() -> Result<()> {
        let frame = Frame::new(RgbImage::new(640, 480), 0);
        let half = frame.scaled(0.5)?;
        assert_eq!((half.width(), half.height()), (320, 240));

        let same = half.scaled(1.0)?;
        assert_eq!((same.width(), same.height()), (320, 240));
        Ok(())
    }

    #[test]
    fn scaled_rejects_non_positive_factor() {
        let frame = Frame::new(RgbImage::new(4, 4), 0);
        assert!(frame.scaled(0.0).is_err());
    }

    #[test]
    fn gray_has_same_dimensions() {
        let frame = Frame::new(RgbImage::from_pixel(3, 5, image::Rgb([255, 255, 255])), 0);
        let gray = frame.gray();
        assert_eq!(gray.dimensions(), (3, 5));
        assert_eq!(gray.get_pixel(1, 1)[0], 255);
        assert!(std::ptr::eq(gray, frame.gray()));
    }
}
