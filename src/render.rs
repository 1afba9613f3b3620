//! Presentation of processed frames.
//!
//! The pipeline calls a `Renderer` once per loop iteration with the latest
//! processed frame. While paused the same frame is passed again so an
//! in-progress zone stays visible. Renderers never mutate pipeline state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::frame::Frame;
use crate::input::HELP_TEXT;
use crate::pipeline::{FrameReport, PipelineState};
use crate::Point;

const DETECTION_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const ZONE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const ACTIVE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const VERTEX_RADIUS: i32 = 3;

pub trait Renderer {
    fn render(
        &mut self,
        frame: &Frame,
        report: Option<&FrameReport>,
        state: &PipelineState,
    ) -> Result<()>;
}

/// Text-only renderer: per-frame summaries at debug, help and edit
/// progress at info.
#[derive(Debug, Default)]
pub struct LogRenderer {
    help_shown: bool,
    last_frame: Option<u64>,
    last_active: usize,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for LogRenderer {
    fn render(
        &mut self,
        frame: &Frame,
        report: Option<&FrameReport>,
        state: &PipelineState,
    ) -> Result<()> {
        if state.help_visible && !self.help_shown {
            log::info!("\n{}", HELP_TEXT);
        }
        self.help_shown = state.help_visible;

        let active = state.editor.active().len();
        if active != self.last_active {
            log::info!("drawing zone: {} point(s) {:?}", active, state.editor.active());
            self.last_active = active;
        }

        if let Some(report) = report {
            if self.last_frame != Some(frame.index) {
                self.last_frame = Some(frame.index);
                let counts: Vec<String> = report
                    .tally
                    .iter()
                    .map(|(name, count)| format!("{}={}", name, count))
                    .collect();
                log::debug!(
                    "frame {}: {} people, avg motion {:.1}%, zones [{}]",
                    report.frame_index,
                    report.detections.len(),
                    report.motion.avg_motion,
                    counts.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Draws detections, zones and the zone being edited onto a copy of the
/// frame and writes every `every`-th new frame as a PNG snapshot.
pub struct OverlayRenderer {
    dir: PathBuf,
    every: u64,
    last_saved: Option<u64>,
    written: u64,
}

impl OverlayRenderer {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        Ok(Self {
            dir,
            every: every.max(1),
            last_saved: None,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn draw(frame: &Frame, report: Option<&FrameReport>, state: &PipelineState) -> RgbImage {
        let mut canvas = frame.image().clone();
        if let Some(report) = report {
            for detection in &report.detections {
                let bbox = detection.bbox;
                if bbox.width <= 0 || bbox.height <= 0 {
                    continue;
                }
                let rect = Rect::at(bbox.x, bbox.y).of_size(bbox.width as u32, bbox.height as u32);
                draw_hollow_rect_mut(&mut canvas, rect, DETECTION_COLOR);
            }
        }
        for zone in &state.zones {
            draw_path(&mut canvas, &zone.points, true, ZONE_COLOR);
        }
        draw_path(&mut canvas, state.editor.active(), false, ACTIVE_COLOR);
        canvas
    }
}

fn draw_path(canvas: &mut RgbImage, points: &[Point], closed: bool, color: Rgb<u8>) {
    for pair in points.windows(2) {
        draw_segment(canvas, pair[0], pair[1], color);
    }
    if closed && points.len() >= 3 {
        draw_segment(canvas, points[points.len() - 1], points[0], color);
    }
    for p in points {
        draw_filled_circle_mut(canvas, (p.x, p.y), VERTEX_RADIUS, color);
    }
}

fn draw_segment(canvas: &mut RgbImage, a: Point, b: Point, color: Rgb<u8>) {
    draw_line_segment_mut(
        canvas,
        (a.x as f32, a.y as f32),
        (b.x as f32, b.y as f32),
        color,
    );
}

impl Renderer for OverlayRenderer {
    fn render(
        &mut self,
        frame: &Frame,
        report: Option<&FrameReport>,
        state: &PipelineState,
    ) -> Result<()> {
        if self.last_saved == Some(frame.index) || frame.index % self.every != 0 {
            return Ok(());
        }
        self.last_saved = Some(frame.index);
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        Self::draw(frame, report, state)
            .save(&path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}

/// Runs several renderers in order; the first error is returned after all
/// of them have run.
pub struct FanoutRenderer {
    renderers: Vec<Box<dyn Renderer>>,
}

impl FanoutRenderer {
    pub fn new(renderers: Vec<Box<dyn Renderer>>) -> Self {
        Self { renderers }
    }
}

impl Renderer for FanoutRenderer {
    fn render(
        &mut self,
        frame: &Frame,
        report: Option<&FrameReport>,
        state: &PipelineState,
    ) -> Result<()> {
        let mut first_err = None;
        for renderer in &mut self.renderers {
            if let Err(e) = renderer.render(frame, report, state) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::{Zone, ZoneStore};

    fn state_with_zone(dir: &Path) -> PipelineState {
        let mut state = PipelineState::new(ZoneStore::new(dir.join("zones.json")));
        state.zones.push(Zone::new(
            "A",
            [Point::new(2, 2), Point::new(20, 2), Point::new(20, 20)],
        ));
        state
    }

    #[test]
    fn overlay_draws_zone_vertices() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_zone(dir.path());
        let frame = Frame::new(RgbImage::new(32, 32), 0);
        let canvas = OverlayRenderer::draw(&frame, None, &state);
        assert_eq!(*canvas.get_pixel(20, 2), ZONE_COLOR);
        assert_eq!(*canvas.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn overlay_writes_snapshots_once_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_zone(dir.path());
        let mut renderer = OverlayRenderer::new(dir.path().join("snaps"), 2).unwrap();
        for index in 0..4 {
            let frame = Frame::new(RgbImage::new(16, 16), index);
            renderer.render(&frame, None, &state).unwrap();
            renderer.render(&frame, None, &state).unwrap();
        }
        assert_eq!(renderer.written(), 2);
        assert!(renderer.dir().join("frame_000000.png").exists());
        assert!(renderer.dir().join("frame_000002.png").exists());
    }
}
