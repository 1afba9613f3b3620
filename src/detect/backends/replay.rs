//! Replay detector.
//!
//! Plays back detections recorded in a JSON Lines file, one record per frame:
//!
//! ```text
//! {"frame": 0, "detections": [[12, 40, 32, 80, 0.91], [150, 38, 30, 78, 0.66]]}
//! ```
//!
//! Each detection is `[x, y, width, height, confidence]`. Frames without a
//! record yield no detections. Useful for offline re-runs of a recorded
//! session, deterministic demos and regression tests.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::detect::backend::PeopleDetector;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One line of a replay file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<(i32, i32, i32, i32, f32)>,
}

impl ReplayRecord {
    pub fn new(frame: u64, detections: &[Detection]) -> Self {
        Self {
            frame,
            detections: detections
                .iter()
                .map(|d| (d.bbox.x, d.bbox.y, d.bbox.width, d.bbox.height, d.confidence))
                .collect(),
        }
    }
}

pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn from_records(records: impl IntoIterator<Item = ReplayRecord>) -> Self {
        let mut frames: HashMap<u64, Vec<Detection>> = HashMap::new();
        for record in records {
            frames.entry(record.frame).or_default().extend(
                record
                    .detections
                    .into_iter()
                    .map(|(x, y, w, h, conf)| Detection::new(x, y, w, h, conf)),
            );
        }
        Self { frames }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(&line).with_context(|| {
                format!("invalid replay record at {}:{}", path.display(), lineno + 1)
            })?;
            records.push(record);
        }
        log::info!(
            "replay detector loaded {} record(s) from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(records))
    }

    /// Number of frames with at least one record.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl PeopleDetector for ReplayDetector {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}

/// Write records as JSON Lines.
pub fn write_replay<P: AsRef<Path>>(path: P, records: &[ReplayRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create replay file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn replays_recorded_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dets.jsonl");
        std::fs::write(
            &path,
            "{\"frame\": 1, \"detections\": [[0, 0, 10, 10, 0.9]]}\n\n{\"frame\": 3}\n",
        )?;

        let mut detector = ReplayDetector::from_path(&path)?;
        assert_eq!(detector.len(), 2);

        let frame0 = Frame::new(RgbImage::new(4, 4), 0);
        assert!(detector.detect(&frame0)?.is_empty());

        let frame1 = Frame::new(RgbImage::new(4, 4), 1);
        assert_eq!(detector.detect(&frame1)?, vec![Detection::new(0, 0, 10, 10, 0.9)]);
        Ok(())
    }

    #[test]
    fn reports_line_of_malformed_record() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"frame\": 0}\n{\"frame\": \"x\"}\n")?;
        let err = ReplayDetector::from_path(&path).err().expect("malformed record");
        assert!(format!("{:#}", err).contains(":2"));
        Ok(())
    }

    #[test]
    fn written_records_load_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.jsonl");
        let dets = [Detection::new(5, 6, 7, 8, 0.5)];
        write_replay(&path, &[ReplayRecord::new(4, &dets)])?;

        let mut detector = ReplayDetector::from_path(&path)?;
        let frame = Frame::new(RgbImage::new(4, 4), 4);
        assert_eq!(detector.detect(&frame)?, dets.to_vec());
        Ok(())
    }
}
