//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic scenes (`stub://` URIs) for demos and tests
//! - Live cameras by index or `/dev/video*` path (feature: ingest-v4l2)
//! - Directories of still images, replayed in file-name order
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! All sources produce owned `Frame` instances. `open_source` picks the source
//! for a URI and wraps it so the configured uniform scale factor is applied
//! before any frame reaches the pipeline.
//!
//! A source signals end-of-stream by returning `Ok(None)`. Opening a source
//! is the only ingestion failure that aborts a run.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
pub(crate) mod camera_v4l2;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, VideoFileSource};
pub use images::ImageDirSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Ordered stream of color frames.
pub trait FrameSource {
    /// Human-readable description (URI or path).
    fn describe(&self) -> String;

    /// Block until the next frame is ready. `Ok(None)` means end-of-stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device or file. Called once on shutdown.
    fn release(&mut self) {}

    /// Frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Applies a uniform scale factor to every frame of the wrapped source.
pub struct ScaledSource<S> {
    inner: S,
    scale: f32,
}

impl<S: FrameSource> ScaledSource<S> {
    pub fn new(inner: S, scale: f32) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(anyhow!("scale factor must be positive, got {}", scale));
        }
        Ok(Self { inner, scale })
    }
}

impl<S: FrameSource> FrameSource for ScaledSource<S> {
    fn describe(&self) -> String {
        if self.scale == 1.0 {
            self.inner.describe()
        } else {
            format!("{} (x{})", self.inner.describe(), self.scale)
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.inner.next_frame()? {
            Some(frame) => Ok(Some(frame.scaled(self.scale)?)),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.inner.release()
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}

/// Open the source named by `uri`.
///
/// - `stub://name[?frames=N&width=W&height=H]`: synthetic scene
/// - a camera index such as `0`, or a `/dev/video*` path: live capture
/// - an existing directory: still images in file-name order
/// - anything else: a local video file
pub fn open_source(uri: &str, scale: f32) -> Result<Box<dyn FrameSource>> {
    if uri.trim().is_empty() {
        return Err(anyhow!("frame source must not be empty"));
    }
    let source: Box<dyn FrameSource> = if uri.starts_with("stub://") {
        Box::new(SyntheticSource::new(SyntheticConfig::from_uri(uri)?))
    } else if let Some(camera) = CameraConfig::from_source(uri) {
        Box::new(CameraSource::open(camera)?)
    } else if Path::new(uri).is_dir() {
        Box::new(ImageDirSource::open(uri)?)
    } else {
        Box::new(VideoFileSource::open(FileConfig {
            path: uri.to_string(),
        })?)
    };
    log::info!("opened frame source {}", source.describe());
    Ok(Box::new(ScaledSource::new(source, scale)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_source_applies_scale() -> Result<()> {
        let mut source = open_source("stub://test?frames=2&width=200&height=100", 0.5)?;
        let frame = source.next_frame()?.expect("frame");
        assert_eq!((frame.width(), frame.height()), (100, 50));
        Ok(())
    }

    #[test]
    fn open_source_rejects_empty_uri() {
        assert!(open_source("  ", 1.0).is_err());
    }

    #[test]
    fn open_source_rejects_bad_scale() {
        assert!(open_source("stub://x", 0.0).is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn camera_index_is_opened_as_a_camera() {
        let err = open_source("0", 1.0).err().expect("error");
        assert!(err.to_string().contains("/dev/video0"));
    }

    #[test]
    fn missing_video_file_fails_to_open() {
        assert!(open_source("/definitely/not/here.mp4", 1.0).is_err());
    }
}
