//! Local video file source.
//!
//! This module provides `VideoFileSource` for recorded footage. Decoding is
//! backed by FFmpeg and only available with the `ingest-file-ffmpeg` feature;
//! without it, opening a video file fails, which aborts the run before the
//! processing loop starts.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "recordings/lobby.mp4").
    pub path: String,
}

/// Local video file source.
pub struct VideoFileSource {
    backend: FileBackend,
}

enum FileBackend {
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    Released(SourceStats),
}

impl VideoFileSource {
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): {}",
                config.path
            ));
        }
        if !std::path::Path::new(&config.path).is_file() {
            return Err(anyhow!("video file {} does not exist", config.path));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "video file {} requires the ingest-file-ffmpeg feature",
                config.path
            ))
        }
    }
}

impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        self.stats().source
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
            FileBackend::Released(_) => Ok(None),
        }
    }

    fn release(&mut self) {
        let stats = self.stats();
        log::info!(
            "FileSource: released {} after {} frame(s)",
            stats.source,
            stats.frames_captured
        );
        self.backend = FileBackend::Released(stats);
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
            FileBackend::Released(stats) => stats.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_url_schemes() {
        let result = VideoFileSource::open(FileConfig {
            path: "rtsp://camera/stream".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_files() {
        let result = VideoFileSource::open(FileConfig {
            path: "missing-recording.mp4".to_string(),
        });
        assert!(result.is_err());
    }
}
