//! Still-image directory source.
//!
//! Replays every PNG/JPEG file of a directory in file-name order, one frame
//! per file. Files that fail to decode are skipped with a warning; the
//! stream ends after the last file.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no PNG/JPEG images in {}", dir.display()));
        }
        files.sort();
        Ok(Self {
            dir,
            files,
            cursor: 0,
            frame_count: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.files.get(self.cursor) {
            self.cursor += 1;
            match image::open(path) {
                Ok(decoded) => {
                    let frame = Frame::new(decoded.to_rgb8(), self.frame_count);
                    self.frame_count += 1;
                    return Ok(Some(frame));
                }
                Err(e) => log::warn!("skipping undecodable image {}: {}", path.display(), e),
            }
        }
        Ok(None)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn replays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 2, Rgb([10, 10, 10])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(6, 3, Rgb([20, 20, 20])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;
        std::fs::write(dir.path().join("broken.png"), "not a png")?;

        let mut source = ImageDirSource::open(dir.path())?;
        assert_eq!(source.len(), 3);

        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.width(), first.height(), first.index), (6, 3, 0));
        let second = source.next_frame()?.expect("second frame");
        assert_eq!((second.width(), second.height(), second.index), (4, 2, 1));
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ImageDirSource::open(dir.path()).is_err());
        Ok(())
    }
}
