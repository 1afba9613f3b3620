//! Live camera source.
//!
//! This module provides `CameraSource` for local capture devices. A source
//! string made only of digits names a camera index (`0` is `/dev/video0`);
//! `/dev/video*` paths are used as given. Capture is backed by V4L2 and only
//! available with the `ingest-v4l2` feature; without it, opening a camera
//! fails before the processing loop starts.
//!
//! A live camera never reports end-of-stream.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

#[cfg(feature = "ingest-v4l2")]
use super::camera_v4l2::V4l2Capture;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a capture device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0").
    pub device: String,
    /// Requested frame rate; 0 keeps the device default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    /// Camera named by a `--source` value, or `None` when it is not one.
    pub fn from_source(source: &str) -> Option<Self> {
        let source = source.trim();
        let device = if !source.is_empty() && source.bytes().all(|b| b.is_ascii_digit()) {
            format!("/dev/video{}", source.parse::<u32>().ok()?)
        } else if source.starts_with("/dev/video") {
            source.to_string()
        } else {
            return None;
        };
        Some(Self {
            device,
            ..Self::default()
        })
    }
}

/// Local camera source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Capture),
    Released(SourceStats),
}

impl CameraSource {
    pub fn open(config: CameraConfig) -> Result<Self> {
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::V4l2(V4l2Capture::open(config)?),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "camera {} requires the ingest-v4l2 feature",
                config.device
            ))
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        self.stats().source
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(capture) => capture.next_frame().map(Some),
            CameraBackend::Released(_) => Ok(None),
        }
    }

    fn release(&mut self) {
        let stats = self.stats();
        log::info!(
            "CameraSource: released {} after {} frame(s)",
            stats.source,
            stats.frames_captured
        );
        self.backend = CameraBackend::Released(stats);
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(capture) => capture.stats(),
            CameraBackend::Released(stats) => stats.clone(),
        }
    }
}

/// Convert one captured buffer to RGB. Supports packed RGB (`RGB3`),
/// `YUYV` 4:2:2 and motion JPEG (`MJPG`).
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
pub(crate) fn capture_to_rgb(
    fourcc: [u8; 4],
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<RgbImage> {
    let pixels = width as usize * height as usize;
    match &fourcc {
        b"RGB3" => {
            let data = buf
                .get(..pixels * 3)
                .ok_or_else(|| short_buffer(&fourcc, buf.len(), pixels * 3))?;
            RgbImage::from_raw(width, height, data.to_vec())
                .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))
        }
        b"YUYV" => {
            let data = buf
                .get(..pixels * 2)
                .ok_or_else(|| short_buffer(&fourcc, buf.len(), pixels * 2))?;
            let mut rgb = Vec::with_capacity(pixels * 3);
            for quad in data.chunks_exact(4) {
                let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
                rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
            RgbImage::from_raw(width, height, rgb)
                .ok_or_else(|| anyhow!("YUYV buffer does not fit {}x{}", width, height))
        }
        b"MJPG" => {
            let image = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                .context("failed to decode MJPG frame")?;
            Ok(image.to_rgb8())
        }
        other => Err(anyhow!(
            "unsupported capture format {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn short_buffer(fourcc: &[u8; 4], got: usize, expected: usize) -> anyhow::Error {
    anyhow!(
        "{} buffer too short: {} bytes, expected {}",
        String::from_utf8_lossy(fourcc),
        got,
        expected
    )
}

/// Full-range BT.601.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ]
}
