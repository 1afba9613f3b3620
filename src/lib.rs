//! People Motion + Zone Counter
//!
//! This crate implements a real-time occupancy-analytics pipeline for video streams.
//!
//! # Architecture
//!
//! Each processed frame flows through the same fixed sequence:
//!
//! 1. **Ingest**: a `FrameSource` yields the next RGB frame (optionally rescaled).
//! 2. **Detect**: a `PeopleDetector` strategy, chosen once at startup, returns bounding boxes.
//! 3. **Motion**: the `MotionEstimator` updates its background model and scores each box.
//! 4. **Occupancy**: the `OccupancyEngine` tallies box centroids inside each zone.
//! 5. **Telemetry**: the `TelemetryEmitter` appends a CSV row and sends OSC messages.
//! 6. **Render**: a `Renderer` presents the frame, zones and the zone being edited.
//!
//! Zones are authored interactively through the `ZoneEditor` state machine and
//! persisted with `ZoneStore`. All mutable run state lives in `PipelineState`,
//! owned by the `Pipeline` controller.
//!
//! # Module Structure
//!
//! - `frame`: Owned RGB frames, grayscale conversion, uniform scaling
//! - `ingest`: Frame sources (synthetic, image directories, video files)
//! - `detect`: Detector strategies (HOG sliding window, ONNX model, replay)
//! - `motion`: Background model and per-detection motion percentages
//! - `zones`: Zone model, persistence, and the authoring state machine
//! - `occupancy`: Point-in-polygon tallies
//! - `telemetry`: CSV row log and OSC/UDP sinks
//! - `input`, `render`, `pipeline`: the control loop and its collaborators

use serde::{Deserialize, Serialize};

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod input;
pub mod motion;
pub mod occupancy;
pub mod pipeline;
pub mod render;
pub mod telemetry;
pub mod zones;

pub use config::PipelineConfig;
pub use detect::{select_detector, Detection, DetectorError, DetectorSettings, PeopleDetector};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource};
pub use input::{Command, CommandSource};
pub use motion::{MotionEstimator, MotionReport, MotionSettings};
pub use occupancy::{centroid, point_in_polygon, OccupancyEngine, OccupancyTally};
pub use pipeline::{FrameReport, Pipeline, PipelineState, RunSummary, StopReason};
pub use render::Renderer;
pub use telemetry::{FrameMetrics, TelemetryEmitter};
pub use zones::{EditorState, Polygon, Zone, ZoneEditor, ZoneStore, ZoneStoreError};

// -------------------- Geometry --------------------

/// Integer pixel coordinate. Serialized as a `[x, y]` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned box in frame pixels: top-left corner plus width and height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersection with the `[0, width) x [0, height)` frame rectangle as
    /// `(x1, y1, x2, y2)`, or `None` when nothing of the box is inside.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x.max(0) as i64;
        let y1 = self.y.max(0) as i64;
        let x2 = (self.x as i64 + self.width as i64).min(frame_width as i64);
        let y2 = (self.y as i64 + self.height as i64).min(frame_height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1 as u32, y1 as u32, x2 as u32, y2 as u32))
    }
}
